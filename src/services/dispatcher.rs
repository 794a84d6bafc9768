// src/services/dispatcher.rs
use std::sync::Arc;

use super::case_store::{CaseStore, NewCase, StatementOutcome, StoreError};
use super::intent_router::{route, Action, Classification, Entities};
use super::llm::{CompletionRequest, LanguageModel};
use super::sql_guard::StatementKind;
use super::statement_executor::StatementExecutor;
use crate::message::ChatResponse;

const CONVERSATION_PROMPT: &str = "Answer precisely and clearly.";
const CONVERSATION_TEMPERATURE: f32 = 0.5;
const CONVERSATION_MAX_TOKENS: u32 = 300;

pub const MISSING_TITLE: &str = "No title was provided for the case.";
pub const OPERATION_FAILED: &str = "Error executing the operation.";
pub const UNKNOWN_INTENT: &str = "Could not identify the intent of the message.";

#[derive(Clone)]
pub struct Dispatcher {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn CaseStore>,
    statements: StatementExecutor,
}

impl Dispatcher {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn CaseStore>) -> Self {
        let statements = StatementExecutor::new(llm.clone(), store.clone());
        Self { llm, store, statements }
    }

    /// Performs the action for a classified message. Business failures come
    /// back as a failure envelope, never as an error.
    pub async fn dispatch(
        &self,
        classification: &Classification,
        entities: &Entities,
        raw_message: &str,
    ) -> ChatResponse {
        let action = route(classification);
        tracing::debug!(?action, intent = classification.label(), "routing message");

        match action {
            Action::CreateCase => self.create_case(entities).await,
            Action::RunStatement(kind) => self.run_statement(raw_message, kind).await,
            Action::Converse => self.converse(raw_message).await,
            Action::Reject => ChatResponse::failure(UNKNOWN_INTENT, vec!["Unknown intent".to_string()]),
        }
    }

    async fn create_case(&self, entities: &Entities) -> ChatResponse {
        let title = entities.title().trim();
        if title.is_empty() {
            return ChatResponse::failure(MISSING_TITLE, vec!["Field 'title' is required".to_string()]);
        }

        let new_case = NewCase {
            title: title.to_string(),
            status: entities.status().to_string(),
            description: entities.description().to_string(),
            attorney: entities.attorney().to_string(),
        };

        match self.store.create_case(new_case).await {
            Ok(record) => {
                tracing::info!(case_id = record.id, title = %record.title, "case created");
                ChatResponse::ok(
                    format!("New case created: {}, status {}.", record.title, record.status),
                    vec![record.to_row()],
                )
            }
            Err(StoreError::DuplicateTitle(title)) => {
                ChatResponse::failure(format!("A case titled '{title}' already exists."), Vec::new())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to create case");
                ChatResponse::failure(OPERATION_FAILED, vec![e.to_string()])
            }
        }
    }

    async fn run_statement(&self, raw_message: &str, kind: StatementKind) -> ChatResponse {
        match self.statements.execute_generated_statement(raw_message, kind).await {
            Ok(StatementOutcome::Found(rows)) if rows.is_empty() => ChatResponse::ok("No cases found.", rows),
            Ok(StatementOutcome::Found(rows)) => ChatResponse::ok("Existing cases.", rows),
            Ok(StatementOutcome::Updated(n)) => {
                ChatResponse::ok(format!("Updated {n} case(s) successfully."), Vec::new())
            }
            Ok(StatementOutcome::Deleted(n)) => {
                ChatResponse::ok(format!("Deleted {n} case(s) successfully."), Vec::new())
            }
            Err(e) => {
                tracing::error!(%kind, error = %e, "generated statement failed");
                ChatResponse::failure(OPERATION_FAILED, vec![e.to_string()])
            }
        }
    }

    async fn converse(&self, raw_message: &str) -> ChatResponse {
        let request = CompletionRequest::new(CONVERSATION_PROMPT, raw_message, CONVERSATION_TEMPERATURE)
            .with_max_tokens(CONVERSATION_MAX_TOKENS);
        match self.llm.complete(request).await {
            Ok(answer) => ChatResponse::ok(answer.trim(), Vec::new()),
            Err(e) => {
                tracing::error!(error = %e, "conversation request failed");
                ChatResponse::failure("Could not answer the question.", vec![e.to_string()])
            }
        }
    }
}
