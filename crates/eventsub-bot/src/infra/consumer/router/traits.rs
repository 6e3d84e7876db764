use async_trait::async_trait;

use crate::domain::models::Event;

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}
