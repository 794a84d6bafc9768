// src/services/mod.rs
pub mod case_store;
pub mod dispatcher;
pub mod intent_router;
pub mod llm;
pub mod sql_guard;
pub mod statement_executor;
