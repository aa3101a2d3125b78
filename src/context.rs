//! Explicit, immutable request-scoped context.
//!
//! An [`InvocationContext`] is threaded through every call instead of relying
//! on thread-local state. Deriving a child with [`InvocationContext::with_value`]
//! never mutates the parent.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Key under which the distributed trace id is stored.
pub const TRACE_ID_KEY: &str = "x-amzn-trace-id";

/// Key under which the inbound event is attached to a built request's context.
pub const EVENT_KEY: &str = "lambda-gateway.inbound-event";

/// Key under which the Lambda runtime context is stored.
pub const LAMBDA_CONTEXT_KEY: &str = "lambda-gateway.lambda-context";

type Value = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct InvocationContext {
    values: Arc<HashMap<&'static str, Value>>,
    deadline: Option<SystemTime>,
}

impl InvocationContext {
    /// An empty context with no values and no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a child context carrying `value` under `key`.
    pub fn with_value<T: Any + Send + Sync>(&self, key: &'static str, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key, Arc::new(value));
        Self {
            values: Arc::new(values),
            deadline: self.deadline,
        }
    }

    /// Looks up `key`, returning `None` if absent or stored with another type.
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn with_deadline(&self, deadline: SystemTime) -> Self {
        Self {
            values: self.values.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        self.with_value(TRACE_ID_KEY, trace_id.into())
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.value::<String>(TRACE_ID_KEY).map(String::as_str)
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| {
            d.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }

    pub fn is_expired(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }

    /// The Lambda runtime context, when running inside Lambda.
    pub fn lambda_context(&self) -> Option<&lambda_runtime::Context> {
        self.value::<lambda_runtime::Context>(LAMBDA_CONTEXT_KEY)
    }
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(lc: &lambda_runtime::Context) -> Self {
        let mut ctx = InvocationContext::background()
            .with_value(LAMBDA_CONTEXT_KEY, lc.clone());
        if lc.deadline > 0 {
            ctx = ctx.with_deadline(UNIX_EPOCH + Duration::from_millis(lc.deadline));
        }
        if let Some(trace_id) = lc.xray_trace_id.as_deref().filter(|t| !t.is_empty()) {
            ctx = ctx.with_trace_id(trace_id);
        }
        ctx
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("InvocationContext")
            .field("keys", &keys)
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_scoped_to_children() {
        let parent = InvocationContext::background();
        let child = parent.with_value("key", "value");
        assert_eq!(child.value::<&str>("key"), Some(&"value"));
        assert!(parent.value::<&str>("key").is_none());
    }

    #[test]
    fn wrong_type_is_none() {
        let ctx = InvocationContext::background().with_value("n", 7u32);
        assert!(ctx.value::<String>("n").is_none());
        assert_eq!(ctx.value::<u32>("n"), Some(&7));
    }

    #[test]
    fn deadline_in_the_past_is_expired() {
        let ctx = InvocationContext::background().with_deadline(UNIX_EPOCH);
        assert!(ctx.is_expired());
        assert!(!InvocationContext::background().is_expired());
    }

    #[test]
    fn from_lambda_context() {
        let mut lc = lambda_runtime::Context::default();
        lc.request_id = "req-1".to_string();
        lc.deadline = 1_700_000_000_000;
        lc.xray_trace_id = Some("Root=1-abc".to_string());

        let ctx = InvocationContext::from(&lc);
        assert_eq!(ctx.trace_id(), Some("Root=1-abc"));
        assert_eq!(
            ctx.deadline(),
            Some(UNIX_EPOCH + Duration::from_millis(1_700_000_000_000))
        );
        assert_eq!(ctx.lambda_context().map(|c| c.request_id.as_str()), Some("req-1"));
    }
}
