//! Backend executor abstraction.

use crate::error::GatewayResult;
use crate::request::BackendRequest;
use crate::response::BackendResponse;
use async_trait::async_trait;

/// Performs exactly one outbound call to a backend.
///
/// Implementations map backend statuses >= 400 into
/// [`GatewayError`](crate::GatewayError) variants so the retry policy can
/// classify them. Deadlines are applied by the caller.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    /// Execute a single attempt
    async fn execute(&self, service: &str, request: &BackendRequest) -> GatewayResult<BackendResponse>;
}
