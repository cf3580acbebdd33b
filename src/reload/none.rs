//! No-op reload strategy for deployments that restart to pick up rule
//! changes. `start`/`stop` are both trivially idempotent.

use super::{ReloadListener, ReloadStrategy};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Default)]
pub struct NoneReloadStrategy;

#[async_trait]
impl ReloadStrategy for NoneReloadStrategy {
    async fn start(&self, _listener: Arc<dyn ReloadListener>) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}
}
