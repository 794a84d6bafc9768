#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use case_assistant::db::{connect_in_memory, run_migrations};
use case_assistant::routes::create_router;
use case_assistant::services::case_store::SqlCaseStore;
use case_assistant::services::llm::{CompletionRequest, LanguageModel, LlmError};
use case_assistant::state::AppState;
use serde_json::Value;
use tower::util::ServiceExt;

/// Language model fake that answers by call site, keyed on the user message.
#[derive(Default)]
pub struct ScriptedModel {
    intents: HashMap<String, String>,
    entities: HashMap<String, String>,
    statements: HashMap<String, String>,
    answer: String,
    unavailable: bool,
    pub calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(mut self, message: &str, label: &str) -> Self {
        self.intents.insert(message.to_string(), label.to_string());
        self
    }

    pub fn entities(mut self, message: &str, json: &str) -> Self {
        self.entities.insert(message.to_string(), json.to_string());
        self
    }

    pub fn statement(mut self, message: &str, sql: &str) -> Self {
        self.statements.insert(message.to_string(), sql.to_string());
        self
    }

    pub fn answer(mut self, text: &str) -> Self {
        self.answer = text.to_string();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let system = request.system_prompt().to_string();
        let user = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push(request);

        if self.unavailable {
            return Err(LlmError::Api { status: 503, message: "model overloaded".to_string() });
        }

        let reply = if system.contains("intent detection") {
            self.intents.get(&user).cloned().unwrap_or_else(|| "general_question".to_string())
        } else if system.contains("entity extractor") {
            self.entities.get(&user).cloned().unwrap_or_else(|| "{}".to_string())
        } else if system.contains("query generator") {
            self.statements.get(&user).cloned().unwrap_or_default()
        } else {
            self.answer.clone()
        };
        Ok(reply)
    }
}

pub async fn app(model: Arc<ScriptedModel>) -> (Router, Arc<SqlCaseStore>) {
    let pool = connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqlCaseStore::new(pool));
    let state = Arc::new(AppState::new(model, store.clone()));
    (create_router().with_state(state), store)
}

pub async fn post_chat(app: &Router, message: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({ "message": message }).to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body_bytes).unwrap())
}

pub async fn count_cases(store: &SqlCaseStore) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM Cases")
        .fetch_one(store.pool())
        .await
        .unwrap();
    count
}
