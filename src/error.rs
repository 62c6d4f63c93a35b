//! Top-level error type for talky.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives
//! (codes under `talky::<module>`, help text, source chains). [`TalkyError`]
//! wraps them transparently so the full diagnostic reaches the user.

use miette::Diagnostic;
use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::execute::ExecError;
use crate::knowledge::KnowledgeError;
use crate::planner::PlanError;
use crate::schedule::ScheduleError;

#[derive(Debug, Error, Diagnostic)]
pub enum TalkyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl TalkyError {
    /// The diagnostic code, e.g. `talky::planner::no_plan`.
    pub fn code_str(&self) -> Option<String> {
        self.code().map(|c| c.to_string())
    }
}

/// Convenience alias.
pub type TalkyResult<T> = std::result::Result<T, TalkyError>;
