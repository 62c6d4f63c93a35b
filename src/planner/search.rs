//! A* over world states.
//!
//! Nodes live in a per-search arena; each node refers to its parent by index,
//! so path reconstruction walks indices and the arena is dropped with the
//! search. States are shared between the arena and the best-g table through
//! `Arc`, never mutated.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::knowledge::KnowledgeBase;
use crate::state::{Condition, Parameters, State};

use super::{Expansion, PlanError, SearchObserver, SearchStats};

/// Ceilings on one search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Maximum node expansions before giving up.
    pub max_expansions: usize,
    /// Wall-clock ceiling.
    pub timeout: Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_expansions: 10_000,
            timeout: Duration::from_millis(2_000),
        }
    }
}

/// Admissible, consistent estimate of the remaining cost.
///
/// Each unsatisfied goal variable needs at least one effect, one action
/// writes at most `max_effects` variables and costs at least `min_cost`, so
/// `u` unsatisfied variables need at least `ceil(u / max_effects)` more
/// actions. Several conditions on one variable count once.
pub(crate) fn heuristic(state: &State, goal: &[Condition], kb: &KnowledgeBase) -> f64 {
    let unsatisfied = state.unsatisfied_vars(goal);
    if unsatisfied == 0 {
        return 0.0;
    }
    unsatisfied.div_ceil(kb.max_effects()) as f64 * kb.min_action_cost()
}

/// Actions that can contribute to `goal`, in declaration order.
///
/// An action is relevant when one of its effects touches a goal variable or a
/// variable some relevant action's precondition reads. Dropping an irrelevant
/// action from any plan leaves the plan valid and no more expensive, so the
/// optimum is always found among relevant actions.
pub(crate) fn relevant_actions(kb: &KnowledgeBase, goal: &[Condition]) -> Vec<usize> {
    let mut wanted: HashSet<&str> = goal.iter().map(|c| c.var.as_str()).collect();
    let mut relevant = vec![false; kb.len()];
    loop {
        let mut grew = false;
        for (index, action) in kb.actions().iter().enumerate() {
            if relevant[index] || !action.effects.iter().any(|e| wanted.contains(e.var())) {
                continue;
            }
            relevant[index] = true;
            grew = true;
            wanted.extend(action.preconditions.iter().map(|c| c.var.as_str()));
        }
        if !grew {
            break;
        }
    }
    relevant
        .iter()
        .enumerate()
        .filter_map(|(i, &r)| r.then_some(i))
        .collect()
}

/// Result of a successful search: action indices in execution order.
#[derive(Debug, Clone)]
pub(crate) struct SearchOutcome {
    pub actions: Vec<usize>,
    pub cost: f64,
    pub stats: SearchStats,
}

struct SearchNode {
    state: Arc<State>,
    g: f64,
    h: f64,
    action: Option<usize>,
    parent: Option<usize>,
    depth: usize,
}

/// Open-set entry. `BinaryHeap` is a max-heap, so `Ord` is reversed: the
/// "greatest" entry has the lowest f, then lowest h, then earliest-declared
/// action, then earliest insertion.
struct OpenEntry {
    f: f64,
    h: f64,
    action_rank: usize,
    seq: u64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.action_rank.cmp(&self.action_rank))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Run A* from `start` until a state satisfies every condition of `goal`.
pub(crate) fn astar(
    kb: &KnowledgeBase,
    start: &State,
    goal: &[Condition],
    params: &Parameters,
    limits: &SearchLimits,
    group: usize,
    observer: Option<&dyn SearchObserver>,
) -> Result<SearchOutcome, PlanError> {
    let started = Instant::now();
    let mut stats = SearchStats::default();
    let relevant = relevant_actions(kb, goal);

    let start = Arc::new(start.clone());
    let h0 = heuristic(&start, goal, kb);
    let mut arena = vec![SearchNode {
        state: Arc::clone(&start),
        g: 0.0,
        h: h0,
        action: None,
        parent: None,
        depth: 0,
    }];
    let mut best_g: HashMap<Arc<State>, f64> = HashMap::from([(start, 0.0)]);
    let mut closed: HashSet<Arc<State>> = HashSet::new();
    let mut open = BinaryHeap::from([OpenEntry {
        f: h0,
        h: h0,
        action_rank: 0,
        seq: 0,
        node: 0,
    }]);
    let mut seq = 1u64;

    while let Some(entry) = open.pop() {
        let current = &arena[entry.node];
        if closed.contains(&current.state) {
            continue;
        }
        if best_g.get(&current.state).is_some_and(|&g| current.g > g) {
            continue;
        }

        if current.state.satisfies_all(goal) {
            let cost = current.g;
            let actions = reconstruct(&arena, entry.node);
            tracing::debug!(
                group,
                expanded = stats.expanded,
                generated = stats.generated,
                steps = actions.len(),
                cost,
                "search reached goal"
            );
            return Ok(SearchOutcome {
                actions,
                cost,
                stats,
            });
        }

        if stats.expanded >= limits.max_expansions {
            return Err(PlanError::SearchBudgetExceeded {
                expanded: stats.expanded,
                reason: format!("expansion limit of {} reached", limits.max_expansions),
            });
        }
        if started.elapsed() >= limits.timeout {
            return Err(PlanError::SearchBudgetExceeded {
                expanded: stats.expanded,
                reason: format!("time limit of {:?} reached", limits.timeout),
            });
        }

        stats.expanded += 1;
        closed.insert(Arc::clone(&current.state));
        if let Some(observer) = observer {
            observer.expanded(&Expansion {
                group,
                depth: current.depth,
                action: current.action.map(|i| kb.actions()[i].id.as_str()),
                g: current.g,
                h: current.h,
                state: &current.state,
            });
        }

        let (state, g, depth) = (Arc::clone(&current.state), current.g, current.depth);
        for &index in &relevant {
            let action = &kb.actions()[index];
            if !action.is_applicable(&state) {
                continue;
            }
            let next = state.apply(&action.effects, params);
            if next == *state || closed.contains(&next) {
                continue;
            }
            let next_g = g + action.cost;
            let next = Arc::new(next);
            match best_g.entry(Arc::clone(&next)) {
                Entry::Occupied(mut known) => {
                    if *known.get() <= next_g {
                        continue;
                    }
                    known.insert(next_g);
                }
                Entry::Vacant(slot) => {
                    slot.insert(next_g);
                }
            }

            let h = heuristic(&next, goal, kb);
            stats.generated += 1;
            arena.push(SearchNode {
                state: next,
                g: next_g,
                h,
                action: Some(index),
                parent: Some(entry.node),
                depth: depth + 1,
            });
            open.push(OpenEntry {
                f: next_g + h,
                h,
                action_rank: index,
                seq,
                node: arena.len() - 1,
            });
            seq += 1;
        }
    }

    Err(PlanError::NoPlanFound {
        goal: goal
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" and "),
        expanded: stats.expanded,
    })
}

/// Walk parent indices back to the root.
fn reconstruct(arena: &[SearchNode], mut node: usize) -> Vec<usize> {
    let mut actions = Vec::new();
    while let Some(parent) = arena[node].parent {
        if let Some(action) = arena[node].action {
            actions.push(action);
        }
        node = parent;
    }
    actions.reverse();
    actions
}
