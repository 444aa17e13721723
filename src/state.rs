use crate::engine::StatsEngine;
use crate::storage::JsonStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    pub engine: Arc<StatsEngine>,
}

impl AppState {
    pub fn new(store: JsonStore) -> Self {
        let store = Arc::new(store);
        let engine = StatsEngine::new(store.clone(), store.clone(), store.clone());
        Self {
            store,
            engine: Arc::new(engine),
        }
    }
}
