use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    domain::models::Event,
    infra::{consumer::router::traits::Handler, profile::Verbosity},
};

#[non_exhaustive]
pub struct LoggingMiddleware<H> {
    inner: H,
    verbosity: Verbosity,
}

impl<H> LoggingMiddleware<H> {
    pub fn new(inner: H, verbosity: Verbosity) -> Self {
        Self { inner, verbosity }
    }
}

#[async_trait]
impl<H: Handler> Handler for LoggingMiddleware<H> {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        if self.verbosity == Verbosity::Full {
            debug!("{:#?}", event);
        }

        let res = self.inner.handle(event).await;
        if let Err(e) = &res {
            error!("handler failed: {:#}", e);
        }

        res
    }
}
