use async_trait::async_trait;

use crate::types::{Execution, Request};

/// Executes requests for one configured (sandbox, command) pair.
///
/// Failures never escape as a Rust error: infrastructure faults, timeouts
/// and nonzero exits of the sandboxed program are all folded into the
/// returned [`Execution`].
#[async_trait]
pub trait Engine: Send + Sync {
    async fn exec(&self, request: &Request) -> Execution;
}
