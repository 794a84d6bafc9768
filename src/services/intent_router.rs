// src/services/intent_router.rs
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use super::llm::{strip_code_fence, CompletionRequest, LanguageModel, LlmError};
use super::sql_guard::StatementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateCase,
    ReadCases,
    UpdateCase,
    DeleteCase,
    GeneralQuestion,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::CreateCase,
        Intent::ReadCases,
        Intent::UpdateCase,
        Intent::DeleteCase,
        Intent::GeneralQuestion,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Intent::CreateCase => "create_case",
            Intent::ReadCases => "read_cases",
            Intent::UpdateCase => "update_case",
            Intent::DeleteCase => "delete_case",
            Intent::GeneralQuestion => "general_question",
        }
    }

    /// Normalizes raw classifier output: trims whitespace and one layer of
    /// matching quotes, then compares case-insensitively.
    pub fn from_label(raw: &str) -> Option<Intent> {
        let mut label = raw.trim();
        for quote in ['\'', '"', '`'] {
            if label.len() >= 2 && label.starts_with(quote) && label.ends_with(quote) {
                label = label[1..label.len() - 1].trim();
                break;
            }
        }
        Intent::ALL.into_iter().find(|i| i.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Recognized(Intent),
    Unrecognized(String),
}

impl Classification {
    pub fn from_reply(reply: &str) -> Self {
        match Intent::from_label(reply) {
            Some(intent) => Classification::Recognized(intent),
            None => Classification::Unrecognized(reply.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Classification::Recognized(intent) => intent.label(),
            Classification::Unrecognized(raw) => raw.as_str(),
        }
    }
}

/// What the dispatcher should do for a classified message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateCase,
    RunStatement(StatementKind),
    Converse,
    Reject,
}

pub fn route(classification: &Classification) -> Action {
    match classification {
        Classification::Recognized(Intent::CreateCase) => Action::CreateCase,
        Classification::Recognized(Intent::ReadCases) => Action::RunStatement(StatementKind::Select),
        Classification::Recognized(Intent::UpdateCase) => Action::RunStatement(StatementKind::Update),
        Classification::Recognized(Intent::DeleteCase) => Action::RunStatement(StatementKind::Delete),
        Classification::Recognized(Intent::GeneralQuestion) => Action::Converse,
        Classification::Unrecognized(_) => Action::Reject,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entities {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attorney: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

impl Entities {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn attorney(&self) -> &str {
        self.attorney.as_deref().unwrap_or_default()
    }

    pub fn criteria(&self) -> &str {
        self.criteria.as_deref().unwrap_or_default()
    }

    pub fn new_status(&self) -> &str {
        self.new_status.as_deref().unwrap_or_default()
    }

    /// Strict parse of the extractor reply. Anything that is not a JSON object
    /// with the known string fields yields `None`.
    pub fn parse(reply: &str) -> Option<Entities> {
        serde_json::from_str(strip_code_fence(reply)).ok()
    }
}

fn classification_prompt() -> String {
    let labels: Vec<String> = Intent::ALL.iter().map(|i| format!("- {}", i.label())).collect();
    format!(
        "You are an intent detection system for a legal case management chatbot.\n\
         Classify the user message into exactly one of the following intents:\n\
         {}\n\n\
         Respond ONLY with the intent string, without quotes or explanations.",
        labels.join("\n")
    )
}

fn extraction_prompt(intent_label: &str) -> String {
    format!(
        "You are an entity extractor for the '{intent_label}' intent in a legal case management chatbot.\n\
         Extract all relevant entities from the user's message.\n\
         Respond ONLY with a valid JSON object with the following structure when applicable:\n\n\
         {{\n  \"title\": string,\n  \"status\": string,\n  \"description\": string,\n  \
         \"attorney\": string,\n  \"criteria\": string,\n  \"new_status\": string\n}}\n\n\
         Leave fields blank if not mentioned explicitly."
    )
}

#[derive(Clone)]
pub struct IntentRouter {
    llm: Arc<dyn LanguageModel>,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, message: &str) -> Result<Classification, LlmError> {
        let reply = self
            .llm
            .complete(CompletionRequest::new(classification_prompt(), message, 0.0))
            .await?;
        let classification = Classification::from_reply(&reply);
        if let Classification::Unrecognized(raw) = &classification {
            tracing::warn!(reply = %raw, "classifier returned an unknown intent label");
        }
        Ok(classification)
    }

    pub async fn extract(
        &self,
        message: &str,
        classification: &Classification,
    ) -> Result<Entities, LlmError> {
        let reply = self
            .llm
            .complete(CompletionRequest::new(
                extraction_prompt(classification.label()),
                message,
                0.0,
            ))
            .await?;
        Ok(Entities::parse(&reply).unwrap_or_else(|| {
            tracing::warn!("entity extraction reply was not valid JSON; using empty entities");
            Entities::default()
        }))
    }

    /// Classify, then extract. The caller routes on the result.
    pub async fn parse_message(&self, message: &str) -> Result<(Classification, Entities), LlmError> {
        let classification = self.classify(message).await?;
        let entities = self.extract(message, &classification).await?;
        Ok((classification, entities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Replies(Mutex<Vec<String>>);

    #[async_trait]
    impl LanguageModel for Replies {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok(self.0.lock().unwrap().remove(0))
        }
    }

    fn router(replies: &[&str]) -> IntentRouter {
        let replies = replies.iter().map(|r| r.to_string()).collect();
        IntentRouter::new(Arc::new(Replies(Mutex::new(replies))))
    }

    #[test]
    fn labels_normalize_whitespace_quotes_and_case() {
        assert_eq!(Intent::from_label("create_case"), Some(Intent::CreateCase));
        assert_eq!(Intent::from_label("  read_cases\n"), Some(Intent::ReadCases));
        assert_eq!(Intent::from_label("'update_case'"), Some(Intent::UpdateCase));
        assert_eq!(Intent::from_label("\"delete_case\""), Some(Intent::DeleteCase));
        assert_eq!(Intent::from_label("`GENERAL_QUESTION`"), Some(Intent::GeneralQuestion));
    }

    #[test]
    fn unexpected_labels_are_not_passed_through() {
        assert_eq!(Intent::from_label("create case"), None);
        assert_eq!(Intent::from_label("'create_case"), None);
        assert_eq!(Intent::from_label("The intent is create_case"), None);
        assert_eq!(Intent::from_label(""), None);
        assert_eq!(
            Classification::from_reply(" archive_case "),
            Classification::Unrecognized("archive_case".to_string())
        );
    }

    #[test]
    fn routing_is_a_pure_table() {
        use Classification::*;
        assert_eq!(route(&Recognized(Intent::CreateCase)), Action::CreateCase);
        assert_eq!(route(&Recognized(Intent::ReadCases)), Action::RunStatement(StatementKind::Select));
        assert_eq!(route(&Recognized(Intent::UpdateCase)), Action::RunStatement(StatementKind::Update));
        assert_eq!(route(&Recognized(Intent::DeleteCase)), Action::RunStatement(StatementKind::Delete));
        assert_eq!(route(&Recognized(Intent::GeneralQuestion)), Action::Converse);
        assert_eq!(route(&Unrecognized("help".into())), Action::Reject);
    }

    #[test]
    fn entities_parse_strictly() {
        let parsed = Entities::parse(r#"{"title": "Smith v. Jones", "status": "open"}"#).unwrap();
        assert_eq!(parsed.title(), "Smith v. Jones");
        assert_eq!(parsed.status(), "open");
        assert_eq!(parsed.attorney(), "");
        assert_eq!(parsed.criteria(), "");
        assert_eq!(parsed.new_status(), "");

        let fenced = "```json\n{\"title\": \"Doe\", \"new_status\": null}\n```";
        assert_eq!(Entities::parse(fenced).unwrap().title(), "Doe");

        assert!(Entities::parse("{'title': 'Doe'}").is_none());
        assert!(Entities::parse(r#"{"title": 5}"#).is_none());
        assert!(Entities::parse(r#"{"title": "Doe", "judge": "Roe"}"#).is_none());
        assert!(Entities::parse("__import__('os').system('rm -rf /')").is_none());
        assert!(Entities::parse("").is_none());
    }

    #[tokio::test]
    async fn parse_message_classifies_then_extracts() {
        let router = router(&["create_case", r#"{"title": "Smith v. Jones", "status": "open"}"#]);
        let (classification, entities) = router
            .parse_message("Create a new case titled 'Smith v. Jones' with status open")
            .await
            .unwrap();
        assert_eq!(classification, Classification::Recognized(Intent::CreateCase));
        assert_eq!(entities.title(), "Smith v. Jones");
    }

    #[tokio::test]
    async fn malformed_extraction_degrades_to_empty_entities() {
        let router = router(&["read_cases", "Sure! Here are the entities: title=Foo"]);
        let (classification, entities) = router.parse_message("show me Foo").await.unwrap();
        assert_eq!(classification, Classification::Recognized(Intent::ReadCases));
        assert_eq!(entities, Entities::default());
    }
}
