use async_trait::async_trait;

/// Stops a component's background work: connections, refresh loops and the
/// channels they feed.
#[async_trait]
pub trait Shutdowner: Send + Sync {
    async fn shutdown(&self) -> anyhow::Result<()>;
}
