use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    domain::models::{Event, EventKind},
    infra::{consumer::router::traits::Handler, profile::Verbosity},
};

#[non_exhaustive]
pub struct MessageHandler {
    verbosity: Verbosity,
}

impl MessageHandler {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl Default for MessageHandler {
    fn default() -> Self {
        Self::new(Verbosity::default())
    }
}

#[async_trait]
impl Handler for MessageHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let EventKind::ChatMessage { text } = &event.kind else {
            anyhow::bail!("message handler got {:?}", event.kind);
        };

        let user = event.user();
        let channel = event.ctx.channel.as_deref().unwrap_or("-");

        if self.verbosity == Verbosity::Quiet {
            debug!("[#{}] {}: {}", channel, user.display_name, text);
        } else {
            info!(
                "[#{}] {} ({}): {}",
                channel,
                user.display_name,
                user.role.label(),
                text
            );
        }

        Ok(())
    }
}
