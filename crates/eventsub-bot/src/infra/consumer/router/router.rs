use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::models::{Event, EventKind},
    infra::consumer::router::traits::Handler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Message,
    ChannelPointRedemption,
    Other,
}

impl From<&Event> for Route {
    fn from(event: &Event) -> Self {
        match &event.kind {
            EventKind::ChatMessage { .. } => Route::Message,
            EventKind::RewardRedemption { .. } => Route::ChannelPointRedemption,
            EventKind::Other { .. } => Route::Other,
        }
    }
}

/// Dispatches each event to the handler registered for its route.
#[derive(Clone)]
pub struct BaseRouter {
    routes: HashMap<Route, Arc<dyn Handler>>,
}

impl BaseRouter {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn route(mut self, route: Route, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(route, handler);
        self
    }
}

impl Default for BaseRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for BaseRouter {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let route = Route::from(&event);

        match self.routes.get(&route) {
            Some(handler) => handler.handle(event).await,
            None => Err(anyhow::anyhow!("no handler for route: {:?}", route)),
        }
    }
}
