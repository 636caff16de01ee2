//! Error Classifier
//!
//! Classifies SQLite diagnostics into a small taxonomy and, for the repairable ones,
//! builds the hint that goes back to the synthesizer.

use crate::schema::SchemaDocument;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref NO_SUCH_COLUMN: Regex = Regex::new(r"(?i)no such column:\s*([^\s]+)").unwrap();
    static ref NO_SUCH_TABLE: Regex = Regex::new(r"(?i)no such table:\s*([^\s]+)").unwrap();
    static ref AMBIGUOUS_COLUMN: Regex =
        Regex::new(r"(?i)ambiguous column name:\s*([^\s]+)").unwrap();
}

/// How many similar schema names to offer per hint
const MAX_SUGGESTIONS: usize = 3;
const MIN_SIMILARITY: f64 = 0.7;

/// SQL error classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlErrorClass {
    ColumnNotFound(String),
    TableNotFound(String),
    AmbiguousColumn(String),
    Syntax,
    TypeMismatch,
    Other(String),
}

impl SqlErrorClass {
    /// Whether another synthesis round has a realistic chance of fixing it
    pub fn is_repairable(&self) -> bool {
        !matches!(self, SqlErrorClass::Other(_))
    }
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorClass::ColumnNotFound(name) => write!(f, "ColumnNotFound({})", name),
            SqlErrorClass::TableNotFound(name) => write!(f, "TableNotFound({})", name),
            SqlErrorClass::AmbiguousColumn(name) => write!(f, "AmbiguousColumn({})", name),
            SqlErrorClass::Syntax => write!(f, "Syntax"),
            SqlErrorClass::TypeMismatch => write!(f, "TypeMismatch"),
            SqlErrorClass::Other(msg) => write!(f, "Other({})", msg),
        }
    }
}

/// What the synthesizer gets told after a failed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairHint {
    pub previous_sql: String,
    /// Store diagnostic, verbatim
    pub diagnostic: String,
    pub class: SqlErrorClass,
    /// Schema names close to the offending identifier
    pub suggestions: Vec<String>,
}

/// Error classifier
#[derive(Debug, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a store diagnostic into the taxonomy
    pub fn classify(&self, diagnostic: &str) -> SqlErrorClass {
        if let Some(caps) = NO_SUCH_COLUMN.captures(diagnostic) {
            return SqlErrorClass::ColumnNotFound(clean_identifier(&caps[1]));
        }
        if let Some(caps) = NO_SUCH_TABLE.captures(diagnostic) {
            return SqlErrorClass::TableNotFound(clean_identifier(&caps[1]));
        }
        if let Some(caps) = AMBIGUOUS_COLUMN.captures(diagnostic) {
            return SqlErrorClass::AmbiguousColumn(clean_identifier(&caps[1]));
        }

        let lowered = diagnostic.to_lowercase();
        if lowered.contains("syntax error")
            || lowered.contains("incomplete input")
            || lowered.contains("unrecognized token")
        {
            return SqlErrorClass::Syntax;
        }
        if lowered.contains("datatype mismatch")
            || lowered.contains("misuse of aggregate")
            || lowered.contains("wrong number of arguments")
        {
            return SqlErrorClass::TypeMismatch;
        }

        SqlErrorClass::Other(diagnostic.to_string())
    }

    /// Schema names resembling the identifier the store complained about
    pub fn suggest(&self, class: &SqlErrorClass, schema: &SchemaDocument) -> Vec<String> {
        match class {
            SqlErrorClass::ColumnNotFound(name) => {
                let bare = name.rsplit('.').next().unwrap_or(name);
                closest(bare, schema.column_names())
            }
            SqlErrorClass::TableNotFound(name) => closest(name, schema.table_names()),
            SqlErrorClass::AmbiguousColumn(name) => schema
                .tables()
                .iter()
                .filter(|t| t.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
                .map(|t| format!("{}.{}", t.name, name))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Repair hint for a failed statement, or `None` when the failure is not repairable
    pub fn repair_hint(
        &self,
        previous_sql: &str,
        diagnostic: &str,
        schema: &SchemaDocument,
    ) -> Option<RepairHint> {
        let class = self.classify(diagnostic);
        if !class.is_repairable() {
            return None;
        }
        let suggestions = self.suggest(&class, schema);
        Some(RepairHint {
            previous_sql: previous_sql.to_string(),
            diagnostic: diagnostic.to_string(),
            class,
            suggestions,
        })
    }
}

fn clean_identifier(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == ',')
        .to_string()
}

fn closest<'a>(target: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let target = target.to_lowercase();
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(&target, &candidate.to_lowercase()), candidate))
        .filter(|(score, _)| *score >= MIN_SIMILARITY)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}
