use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    domain::models::{Event, EventKind},
    infra::{consumer::router::traits::Handler, profile::Verbosity},
};

#[non_exhaustive]
pub struct RedemptionHandler {
    verbosity: Verbosity,
}

impl RedemptionHandler {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

#[async_trait]
impl Handler for RedemptionHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let EventKind::RewardRedemption {
            reward_id,
            reward_title,
            cost,
            user_input,
        } = &event.kind
        else {
            anyhow::bail!("redemption handler got {:?}", event.kind);
        };

        let user = event.user();
        let input = user_input
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!(": {s}"))
            .unwrap_or_default();

        if self.verbosity == Verbosity::Quiet {
            debug!("{} redeemed {}", user.display_name, reward_id);
        } else {
            info!(
                "{} redeemed '{}' for {} points{}",
                user.display_name, reward_title, cost, input
            );
        }

        Ok(())
    }
}
