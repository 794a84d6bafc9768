// src/services/statement_executor.rs
use std::sync::Arc;

use thiserror::Error;

use super::case_store::{CaseStore, StatementOutcome, StoreError};
use super::llm::{CompletionRequest, LanguageModel, LlmError};
use super::sql_guard::{validate_statement, StatementError, StatementKind, ValidatedStatement, CASES_TABLE};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("query generation failed: {0}")]
    Model(#[from] LlmError),
    #[error("generated statement rejected: {0}")]
    Rejected(#[from] StatementError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn generation_prompt(kind: StatementKind) -> String {
    format!(
        "You are a SQLite query generator for a legal case management system. \
         The table is called '{CASES_TABLE}' and has the following columns:\n\
         id (integer primary key), title (text, unique), status (text), description (text), \
         attorney (text), created_at (timestamp).\n\
         Generate a single SQL {kind} statement against that table only, without explanations or formatting. \
         Never modify the id or created_at columns.\n\
         Respond ONLY with the SQL statement."
    )
}

/// Turns a natural-language instruction into one checked SQL statement and runs it.
#[derive(Clone)]
pub struct StatementExecutor {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn CaseStore>,
}

impl StatementExecutor {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn CaseStore>) -> Self {
        Self { llm, store }
    }

    pub async fn generate(
        &self,
        instruction: &str,
        kind: StatementKind,
    ) -> Result<ValidatedStatement, PersistenceError> {
        let reply = self
            .llm
            .complete(CompletionRequest::new(generation_prompt(kind), instruction, 0.0))
            .await?;
        validate_statement(&reply, kind).map_err(|e| {
            tracing::warn!(%kind, statement = %reply, error = %e, "rejected generated statement");
            PersistenceError::from(e)
        })
    }

    pub async fn execute_generated_statement(
        &self,
        instruction: &str,
        kind: StatementKind,
    ) -> Result<StatementOutcome, PersistenceError> {
        let statement = self.generate(instruction, kind).await?;
        tracing::info!(%kind, statement = statement.sql(), "executing generated statement");
        Ok(self.store.run_statement(&statement).await?)
    }
}
