//! Append-only audit trail of every planning and execution decision.
//!
//! Recording never blocks the caller: entries go onto an unbounded channel
//! and a background task appends them to an [`AuditSink`]. Sink failures are
//! logged and dropped; they never fail a request. [`AuditRecorder::explain`]
//! drains the channel before reading, so it sees everything recorded before
//! the call.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::planner::{Expansion, SearchObserver};

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum AuditError {
    #[error("audit sink failure: {message}")]
    #[diagnostic(
        code(talky::audit::sink),
        help("The audit sink rejected an entry. The request itself is unaffected.")
    )]
    Sink { message: String },

    #[error("audit recorder is shut down")]
    #[diagnostic(
        code(talky::audit::closed),
        help("The background writer task has stopped; entries can no longer be recorded.")
    )]
    Closed,
}

/// Convenience alias.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

// ── Entries ─────────────────────────────────────────────────────────────

/// Identifies one handled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// What kind of decision an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    IntentResolution,
    NodeExpansion,
    PlanSelection,
    ActionOutcome,
    RequestRejected,
    ExecutionSummary,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::IntentResolution => "intent-resolution",
            Self::NodeExpansion => "node-expansion",
            Self::PlanSelection => "plan-selection",
            Self::ActionOutcome => "action-outcome",
            Self::RequestRejected => "request-rejected",
            Self::ExecutionSummary => "execution-summary",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Recorder-wide sequence number.
    pub seq: u64,
    pub request: RequestId,
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    pub kind: DecisionKind,
    pub payload: Value,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Sinks ───────────────────────────────────────────────────────────────

/// Storage behind the recorder.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> AuditResult<()>;

    /// Entries for `request` in recording order.
    fn entries(&self, request: RequestId) -> AuditResult<Vec<AuditEntry>>;
}

/// In-memory sink keyed by request.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: DashMap<RequestId, Vec<AuditEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.entries.len()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        self.entries.entry(entry.request).or_default().push(entry);
        Ok(())
    }

    fn entries(&self, request: RequestId) -> AuditResult<Vec<AuditEntry>> {
        let mut out = self
            .entries
            .get(&request)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }
}

// ── Recorder ────────────────────────────────────────────────────────────

enum Command {
    Record(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget audit recorder. Cheap to clone; clones share one writer.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::UnboundedSender<Command>,
    sink: Arc<dyn AuditSink>,
    seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("recorded", &self.seq.load(Ordering::Relaxed))
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl AuditRecorder {
    /// Start a recorder writing to `sink`. Must be called inside a tokio runtime.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let writer = Arc::clone(&sink);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Record(entry) => {
                        let (seq, kind) = (entry.seq, entry.kind);
                        if let Err(e) = writer.append(entry) {
                            tracing::warn!(seq, kind = %kind, error = %e, "audit entry dropped");
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("audit writer stopped");
        });
        Self {
            tx,
            sink,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a decision. Never blocks and never fails the caller.
    pub fn record(&self, request: RequestId, kind: DecisionKind, payload: Value) {
        let entry = AuditEntry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            request,
            timestamp_ms: now_ms(),
            kind,
            payload,
        };
        if self.tx.send(Command::Record(entry)).is_err() {
            tracing::warn!(request = %request, kind = %kind, "audit recorder closed; entry dropped");
        }
    }

    /// Every entry recorded for `request` so far, in recording order.
    pub async fn explain(&self, request: RequestId) -> Vec<AuditEntry> {
        if let Err(e) = self.flush().await {
            tracing::warn!(request = %request, error = %e, "audit flush failed");
        }
        self.sink.entries(request).unwrap_or_else(|e| {
            tracing::warn!(request = %request, error = %e, "audit read failed");
            Vec::new()
        })
    }

    /// Wait until everything queued before this call reached the sink.
    pub async fn flush(&self) -> AuditResult<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Flush(done))
            .map_err(|_| AuditError::Closed)?;
        wait.await.map_err(|_| AuditError::Closed)
    }

    /// A search observer that records every expansion under `request`.
    pub fn observer(&self, request: RequestId) -> Arc<dyn SearchObserver> {
        Arc::new(ExpansionAuditor {
            recorder: self.clone(),
            request,
        })
    }
}

struct ExpansionAuditor {
    recorder: AuditRecorder,
    request: RequestId,
}

impl SearchObserver for ExpansionAuditor {
    fn expanded(&self, expansion: &Expansion<'_>) {
        self.recorder.record(
            self.request,
            DecisionKind::NodeExpansion,
            json!({
                "group": expansion.group,
                "depth": expansion.depth,
                "action": expansion.action,
                "g": expansion.g,
                "h": expansion.h,
                "f": expansion.f(),
                "state_size": expansion.state.len(),
            }),
        );
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

/// Render an audit trail as prose: what was understood, what was planned
/// and why, and how each action went.
pub fn render_explanation(entries: &[AuditEntry]) -> String {
    let mut out = String::new();
    let expansions = entries
        .iter()
        .filter(|e| e.kind == DecisionKind::NodeExpansion)
        .count();

    for entry in entries {
        let p = &entry.payload;
        match entry.kind {
            DecisionKind::IntentResolution => {
                let _ = write!(
                    out,
                    "Understood \"{}\" (confidence {:.2})",
                    text(p, "intent"),
                    p["confidence"].as_f64().unwrap_or(0.0)
                );
                match p["route"].as_str() {
                    Some("direct") => {
                        let _ = writeln!(out, ", handled directly by {}.", text(p, "action"));
                    }
                    _ => {
                        let _ = writeln!(out, ", aiming for {}.", joined(&p["goal"], " and "));
                    }
                }
            }
            DecisionKind::NodeExpansion => {}
            DecisionKind::PlanSelection => {
                let steps = p["steps"].as_array().cloned().unwrap_or_default();
                if steps.is_empty() {
                    let _ = writeln!(out, "Nothing needed doing: the goal already held.");
                    continue;
                }
                let how = if p["fast_path"].as_bool().unwrap_or(false) {
                    "a single direct action".to_string()
                } else {
                    format!("{expansions} states considered")
                };
                let _ = writeln!(
                    out,
                    "Chose a {}-step plan costing {:.2} ({how}):",
                    steps.len(),
                    p["cost"].as_f64().unwrap_or(0.0)
                );
                for (i, step) in steps.iter().enumerate() {
                    let _ = writeln!(out, "  {}. {}", i + 1, text(step, "action"));
                }
            }
            DecisionKind::ActionOutcome => {
                let _ = write!(
                    out,
                    "Step {} {}: {}",
                    p["step"].as_u64().unwrap_or(0) + 1,
                    text(p, "action"),
                    text(p, "status")
                );
                let attempts = p["attempts"].as_u64().unwrap_or(0);
                if attempts > 1 {
                    let _ = write!(out, " after {attempts} attempts");
                }
                if let Some(error) = p["error"].as_str() {
                    let _ = write!(out, " ({error})");
                }
                if let Some(reason) = p["skipped"].as_str() {
                    let _ = write!(out, " ({reason})");
                }
                out.push_str(".\n");
            }
            DecisionKind::RequestRejected => {
                let _ = writeln!(out, "Request rejected: {}.", text(p, "error"));
            }
            DecisionKind::ExecutionSummary => {
                let _ = write!(out, "Overall: {}", text(p, "status"));
                let unmet = joined(&p["unmet_goals"], ", ");
                if !unmet.is_empty() {
                    let _ = write!(out, "; not achieved: {unmet}");
                }
                if p["timed_out"].as_bool().unwrap_or(false) {
                    out.push_str("; the plan deadline passed");
                }
                out.push_str(".\n");
            }
        }
    }
    out
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("?")
}

fn joined(value: &Value, sep: &str) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(sep)
        })
        .unwrap_or_default()
}
