// src/message.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of the `Cases` table as returned to the caller, column name to value.
pub type CaseRow = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Vec<CaseRow>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ChatResponse {
    pub fn ok(message: impl Into<String>, data: Vec<CaseRow>) -> Self {
        Self { success: true, message: message.into(), data, errors: Vec::new() }
    }

    pub fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self { success: false, message: message.into(), data: Vec::new(), errors }
    }
}
