// src/services/sql_guard.rs
//! Shape checks for model-generated SQL before it reaches the database.
//!
//! A statement passes only if it parses as a single statement of the requested
//! kind, every table it names is `Cases`, it calls no extension or `sqlite_*`
//! functions, it carries no comments, and an `UPDATE` does not assign `id` or
//! `created_at`. Identifiers are compared by value, so quoting a name with
//! `"…"`, `` `…` `` or `[…]` does not get it past the checks.

use std::fmt;
use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, visit_relations, AssignmentTarget, Expr, Ident, ObjectName, Statement,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use thiserror::Error;

use super::llm::strip_code_fence;

pub const CASES_TABLE: &str = "Cases";

const IMMUTABLE_COLUMNS: [&str; 2] = ["id", "created_at"];
const FORBIDDEN_FUNCTIONS: [&str; 3] = ["load_extension", "readfile", "writefile"];
const FORBIDDEN_PREFIXES: [&str; 2] = ["sqlite_", "pragma_"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Update,
    Delete,
}

impl StatementKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    #[error("generated statement is empty")]
    Empty,
    #[error("generated statement contains a comment")]
    Comment,
    #[error("generated statement has an unterminated literal or identifier")]
    Unterminated,
    #[error("generated text contains more than one statement")]
    MultipleStatements,
    #[error("expected a {expected} statement, got `{found}`")]
    KindMismatch { expected: StatementKind, found: String },
    #[error("statement references table `{0}`; only Cases is allowed")]
    ForeignTable(String),
    #[error("statement does not reference the Cases table")]
    MissingTable,
    #[error("statement uses forbidden name `{0}`")]
    Forbidden(String),
    #[error("statement may not assign immutable column `{0}`")]
    ImmutableColumn(String),
    #[error("generated statement is not valid SQL: {0}")]
    Parse(String),
}

/// A statement that passed [`validate_statement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatement {
    sql: String,
    kind: StatementKind,
}

impl ValidatedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

pub fn validate_statement(sql: &str, kind: StatementKind) -> Result<ValidatedStatement, StatementError> {
    let body = strip_code_fence(sql).trim();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();
    if body.is_empty() {
        return Err(StatementError::Empty);
    }

    let dialect = SQLiteDialect {};
    check_tokens(&dialect, body, kind)?;

    let mut statements = Parser::parse_sql(&dialect, body).map_err(|e| StatementError::Parse(e.to_string()))?;
    let statement = match statements.len() {
        0 => return Err(StatementError::Empty),
        1 => statements.remove(0),
        _ => return Err(StatementError::MultipleStatements),
    };

    let assignments = match (&statement, kind) {
        (Statement::Query(_), StatementKind::Select) | (Statement::Delete(_), StatementKind::Delete) => &[][..],
        (Statement::Update { assignments, .. }, StatementKind::Update) => assignments.as_slice(),
        _ => {
            return Err(StatementError::KindMismatch {
                expected: kind,
                found: leading_keyword(&statement),
            });
        }
    };

    check_functions(&statement)?;
    check_tables(&statement)?;
    for assignment in assignments {
        match &assignment.target {
            AssignmentTarget::ColumnName(column) => reject_immutable(column)?,
            AssignmentTarget::Tuple(columns) => columns.iter().try_for_each(reject_immutable)?,
        }
    }

    Ok(ValidatedStatement { sql: body.to_string(), kind })
}

/// Lexical pass: comments and unterminated literals are rejected outright, and
/// the first keyword must name the requested kind.
fn check_tokens(dialect: &SQLiteDialect, body: &str, kind: StatementKind) -> Result<(), StatementError> {
    let tokens = Tokenizer::new(dialect, body).tokenize().map_err(|e| {
        if e.message.starts_with("Unterminated") || e.message.contains("before EOF") {
            StatementError::Unterminated
        } else {
            StatementError::Parse(e.to_string())
        }
    })?;

    let is_comment = |t: &Token| {
        matches!(
            t,
            Token::Whitespace(Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_))
        )
    };
    if tokens.iter().any(is_comment) {
        return Err(StatementError::Comment);
    }

    match tokens.iter().find(|t| !matches!(t, Token::Whitespace(_))) {
        Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kind.keyword()) => Ok(()),
        Some(Token::Word(w)) => Err(StatementError::KindMismatch { expected: kind, found: w.value.clone() }),
        Some(other) => Err(StatementError::KindMismatch { expected: kind, found: other.to_string() }),
        None => Err(StatementError::Empty),
    }
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn last_part(name: &ObjectName) -> Option<&Ident> {
    name.0.last()
}

fn is_reserved(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    FORBIDDEN_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn check_functions(statement: &Statement) -> Result<(), StatementError> {
    let flow = visit_expressions(statement, |expr| {
        if let Expr::Function(function) = expr {
            if let Some(ident) = last_part(&function.name) {
                let lower = ident.value.to_ascii_lowercase();
                if FORBIDDEN_FUNCTIONS.contains(&lower.as_str()) || is_reserved(&lower) {
                    return ControlFlow::Break(StatementError::Forbidden(ident.value.clone()));
                }
            }
        }
        ControlFlow::Continue(())
    });
    match flow {
        ControlFlow::Break(e) => Err(e),
        ControlFlow::Continue(()) => Ok(()),
    }
}

fn check_tables(statement: &Statement) -> Result<(), StatementError> {
    let mut references = 0usize;
    let flow = visit_relations(statement, |relation| {
        match relation.0.as_slice() {
            [table] if table.value.eq_ignore_ascii_case(CASES_TABLE) => {
                references += 1;
                ControlFlow::Continue(())
            }
            [.., table] if is_reserved(&table.value) => {
                ControlFlow::Break(StatementError::Forbidden(table.value.clone()))
            }
            [table] => ControlFlow::Break(StatementError::ForeignTable(table.value.clone())),
            _ => ControlFlow::Break(StatementError::ForeignTable(relation.to_string())),
        }
    });
    if let ControlFlow::Break(e) = flow {
        return Err(e);
    }
    if references == 0 {
        return Err(StatementError::MissingTable);
    }
    Ok(())
}

fn reject_immutable(column: &ObjectName) -> Result<(), StatementError> {
    match last_part(column) {
        Some(ident) if IMMUTABLE_COLUMNS.iter().any(|c| ident.value.eq_ignore_ascii_case(c)) => {
            Err(StatementError::ImmutableColumn(ident.value.clone()))
        }
        _ => Ok(()),
    }
}
