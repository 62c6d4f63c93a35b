// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # talky
//!
//! The planning and execution core of a conversational assistant: classified
//! intents become cost-optimal action plans, plans become dependency graphs,
//! and graphs run concurrently against an external action invoker, with every
//! decision recorded for later explanation.
//!
//! ## Architecture
//!
//! - **State model** (`state`): immutable fact maps, conditions and effects
//! - **Knowledge base** (`knowledge`): action schemas, intent goal templates, ordering constraints
//! - **Planner** (`planner`): A* search with an admissible heuristic, multi-intent grouping, parameter binding
//! - **Scheduler** (`schedule`): petgraph DAG of data and ordering dependencies
//! - **Execution engine** (`execute`): bounded tokio fan-out with retries, skips and a plan deadline
//! - **Audit** (`audit`): fire-and-forget decision trail with prose explanations
//! - **Pipeline** (`assistant`): ties the above together per request
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use talky::assistant::Assistant;
//! use talky::audit::{AuditRecorder, MemorySink};
//! use talky::config::TalkyConfig;
//! use talky::execute::EchoInvoker;
//! use talky::intent::Intent;
//! use talky::knowledge::catalog;
//!
//! # async fn demo() -> talky::error::TalkyResult<()> {
//! let kb = Arc::new(catalog::builtin()?);
//! let assistant = Assistant::new(
//!     Arc::clone(&kb),
//!     TalkyConfig::default(),
//!     Arc::new(EchoInvoker::new(kb)),
//!     AuditRecorder::new(Arc::new(MemorySink::new())),
//! );
//! let request = assistant.request(vec![
//!     Intent::new("CheckWeather", 0.92).with_param("location", "Pune"),
//! ]);
//! let outcome = assistant.handle(request).await?;
//! println!("{:?}", outcome.report.status);
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod audit;
pub mod config;
pub mod error;
pub mod execute;
pub mod intent;
pub mod knowledge;
pub mod planner;
pub mod schedule;
pub mod state;
