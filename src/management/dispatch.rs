//! Broadcast of management calls to every handler bound under a capability.

use crate::context::Context;
use crate::errors::MgmtError;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// A component able to execute management calls for one context.
pub trait CallHandler: Send + Sync {
    fn call(&self, method: &str, args: &[String]) -> Result<Value, MgmtError>;
}

impl<F> CallHandler for F
where
    F: Fn(&str, &[String]) -> Result<Value, MgmtError> + Send + Sync,
{
    fn call(&self, method: &str, args: &[String]) -> Result<Value, MgmtError> {
        self(method, args)
    }
}

/// Outcome of one handler invocation.
#[derive(Debug)]
pub struct ContextualReturn {
    pub context: Context,
    pub result: Result<Value, MgmtError>,
}

impl ContextualReturn {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// True when the handler ran and returned nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self.result, Ok(Value::Null))
    }
}

#[derive(Debug, Default)]
pub struct CallResult {
    /// At least one handler was invoked, whether or not it succeeded.
    pub executed: bool,
    pub returns: Vec<ContextualReturn>,
}

impl CallResult {
    pub fn not_executed() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ContextualReturn> {
        self.returns.iter().filter(|r| !r.is_success())
    }

    pub fn successes(&self) -> impl Iterator<Item = &ContextualReturn> {
        self.returns.iter().filter(|r| r.is_success())
    }
}

struct Bound {
    capability: String,
    context: Context,
    handler: Arc<dyn CallHandler>,
}

#[derive(Default)]
pub struct CallDispatcher {
    bound: RwLock<Vec<Bound>>,
}

impl CallDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` under `capability` for `context`, replacing any previous binding of the pair.
    pub fn bind(&self, capability: &str, context: Context, handler: Arc<dyn CallHandler>) {
        let mut bound = self.bound.write();
        bound.retain(|b| !(b.capability == capability && b.context == context));
        bound.push(Bound { capability: capability.to_string(), context, handler });
    }

    pub fn unbind(&self, capability: &str, context: &Context) -> bool {
        let mut bound = self.bound.write();
        let before = bound.len();
        bound.retain(|b| !(b.capability == capability && &b.context == context));
        bound.len() != before
    }

    /// Drop every binding whose context contains all of `context`'s entries.
    pub fn unbind_all(&self, context: &Context) -> usize {
        let mut bound = self.bound.write();
        let before = bound.len();
        bound.retain(|b| !b.context.contains_all(context));
        before - bound.len()
    }

    pub fn bound_count(&self, capability: &str) -> usize {
        self.bound.read().iter().filter(|b| b.capability == capability).count()
    }

    /// Invoke `method` on every handler under `capability` whose context matches `filter`.
    ///
    /// Handlers run outside the binding lock; an error or panic in one is recorded in its
    /// return slot and the others still run.
    pub fn call(
        &self,
        capability: &str,
        method: &str,
        args: &[String],
        filter: &Context,
    ) -> CallResult {
        let targets: Vec<(Context, Arc<dyn CallHandler>)> = self
            .bound
            .read()
            .iter()
            .filter(|b| b.capability == capability && b.context.contains_all(filter))
            .map(|b| (b.context.clone(), b.handler.clone()))
            .collect();
        if targets.is_empty() {
            log::debug!("{capability}.{method}: no handler bound for {filter}");
            return CallResult::not_executed();
        }
        let mut returns = Vec::with_capacity(targets.len());
        for (context, handler) in targets {
            let result = match catch_unwind(AssertUnwindSafe(|| handler.call(method, args))) {
                Ok(r) => r,
                Err(_) => Err(MgmtError::CallFailed(format!("{method} panicked"))),
            };
            if let Err(e) = &result {
                log::warn!("{capability}.{method} failed for {context}: {e}");
            }
            returns.push(ContextualReturn { context, result });
        }
        CallResult { executed: true, returns }
    }
}
