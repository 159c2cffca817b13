use std::sync::Arc;

use crate::broker::SharedBrokerPool;
use crate::config::NotifyConfig;
use crate::validator::PathValidator;

/// Application state shared across all routes and connections.
#[derive(Clone)]
pub struct AppState {
    pub broker: SharedBrokerPool,
    pub validator: Arc<PathValidator>,
    pub config: NotifyConfig,
}

impl AppState {
    pub fn new(broker: SharedBrokerPool, validator: PathValidator, config: NotifyConfig) -> Self {
        Self {
            broker,
            validator: Arc::new(validator),
            config,
        }
    }
}
