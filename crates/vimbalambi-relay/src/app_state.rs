use std::sync::Arc;

use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use crate::relay::RelayCore;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<RelayConfig>,
    pub core: Arc<RelayCore>,
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    pub fn new(cfg: RelayConfig, store: Arc<dyn MessageStore>) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        let core = Arc::new(RelayCore::new(store, Arc::clone(&metrics)));
        Self {
            cfg: Arc::new(cfg),
            core,
            metrics,
        }
    }
}
