use std::sync::Arc;

use crate::relay::RelayService;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
}

impl AppState {
    pub fn new(relay: Arc<RelayService>) -> Self {
        Self { relay }
    }
}
