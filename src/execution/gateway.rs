use crate::error::GatewayError;
use crate::models::{OrderFill, OrderRequest};
use async_trait::async_trait;

/// External order gateway. Every call may suspend; callers bound it with a timeout.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Open a position with the request's initial stop and target
    async fn open(&self, request: &OrderRequest) -> Result<OrderFill, GatewayError>;

    async fn modify_sl(&self, ticket: u64, new_sl: f64) -> Result<(), GatewayError>;

    async fn close(&self, ticket: u64) -> Result<(), GatewayError>;
}
