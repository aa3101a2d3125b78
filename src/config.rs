//! Environment-driven configuration.

use std::net::SocketAddr;

use crate::error::{GatewayError, Result};
use crate::response::BinaryPolicy;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Run the Lambda loop instead of the local server.
    pub lambda: bool,
    /// Local server bind address.
    pub addr: SocketAddr,
    pub binary_policy: BinaryPolicy,
    /// Maximum handlers running at once in server mode.
    pub workers: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lambda = lookup("AWS_LAMBDA_FUNCTION_NAME")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        let addr = match lookup("GATEWAY_ADDR") {
            Some(v) => v
                .parse::<SocketAddr>()
                .map_err(|e| GatewayError::Config(format!("GATEWAY_ADDR {v:?}: {e}")))?,
            None => DEFAULT_ADDR
                .parse::<SocketAddr>()
                .map_err(|e| GatewayError::Config(format!("default address: {e}")))?,
        };

        let binary_policy = match lookup("GATEWAY_BINARY_POLICY") {
            Some(v) => v.parse()?,
            None => BinaryPolicy::default(),
        };

        Ok(Self {
            lambda,
            addr,
            binary_policy,
            workers: worker_count(lookup("GATEWAY_WORKERS")),
        })
    }
}

// Explicit count if it parses, otherwise detected CPUs; clamped to 1..=64
fn worker_count(value: Option<String>) -> usize {
    if let Some(count) = value.and_then(|v| v.trim().parse::<usize>().ok()) {
        return count.clamp(1, MAX_WORKERS);
    }
    num_cpus::get().clamp(1, MAX_WORKERS)
}
