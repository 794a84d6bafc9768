// src/state.rs
use std::sync::Arc;

use crate::services::case_store::CaseStore;
use crate::services::dispatcher::Dispatcher;
use crate::services::intent_router::IntentRouter;
use crate::services::llm::LanguageModel;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub router: IntentRouter,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn CaseStore>) -> Self {
        Self {
            router: IntentRouter::new(llm.clone()),
            dispatcher: Dispatcher::new(llm, store),
        }
    }
}
