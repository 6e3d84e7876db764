use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use crate::{
    domain::{consumer::EventConsumer, models::Event},
    infra::consumer::router::traits::Handler,
};

const BUFFER_SIZE: usize = 30;

/// Drains the event channel through the router. Nothing a handler does,
/// error or panic, stops the consumer.
pub struct Consumer<R: Handler> {
    router: Arc<R>,
}

impl<R: Handler> Consumer<R> {
    pub fn new(router: R) -> Self {
        Self {
            router: Arc::new(router),
        }
    }
}

#[async_trait]
impl<R: Handler> EventConsumer for Consumer<R> {
    async fn consume(&self, ch: mpsc::Receiver<Event>) {
        ReceiverStream::new(ch)
            .map(|event| {
                let router = self.router.clone();
                async move {
                    match AssertUnwindSafe(router.handle(event)).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => handle_error(e),
                        Err(panic) => handle_panic(panic),
                    }
                }
            })
            .buffer_unordered(BUFFER_SIZE)
            .collect::<()>()
            .await
    }
}

fn handle_error(e: Error) {
    error!("event dropped: {:#}", e);
}

fn handle_panic(panic: Box<dyn std::any::Any + Send>) {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!("handler panicked: {}", message);
}
