use std::sync::Arc;

use klaxon_engine::manager::RuleManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RuleManager>,
}
