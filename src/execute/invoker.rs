//! The boundary to external integrations: one named action, bound parameters in,
//! a JSON result out.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::knowledge::KnowledgeBase;
use crate::state::Parameters;

/// Whether retrying an invocation can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// An action invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic, Serialize, Deserialize)]
#[error("{kind} invocation error: {message}")]
#[diagnostic(
    code(talky::execute::invocation),
    help("Transient errors are retried with backoff; permanent errors fail the node immediately.")
)]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InvocationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Executes one named action. Implementations must be safe to call
/// concurrently from several tasks.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, action_id: &str, params: &Parameters) -> Result<Value, InvocationError>;
}

/// Invoker backed by an async closure.
pub struct FnInvoker<F> {
    f: F,
}

impl<F, Fut> FnInvoker<F>
where
    F: Fn(String, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, InvocationError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ActionInvoker for FnInvoker<F>
where
    F: Fn(String, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, InvocationError>> + Send,
{
    async fn invoke(&self, action_id: &str, params: &Parameters) -> Result<Value, InvocationError> {
        (self.f)(action_id.to_string(), params.clone()).await
    }
}

/// Dry-run invoker: succeeds with its parameters and a placeholder for each
/// slot the action produces.
pub struct EchoInvoker {
    kb: Arc<KnowledgeBase>,
}

impl EchoInvoker {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl ActionInvoker for EchoInvoker {
    async fn invoke(&self, action_id: &str, params: &Parameters) -> Result<Value, InvocationError> {
        let action = self
            .kb
            .action(action_id)
            .map_err(|e| InvocationError::permanent(e.to_string()))?;
        let mut out = Parameters::new();
        out.insert("action".into(), json!(action_id));
        out.insert("params".into(), Value::Object(params.clone()));
        for slot in &action.produces {
            out.insert(slot.clone(), json!(format!("{action_id}:{slot}")));
        }
        Ok(Value::Object(out))
    }
}
