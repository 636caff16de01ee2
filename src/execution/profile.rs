//! Query Profile - structural facts about a candidate statement
//!
//! The guard decides what to rewrite from this profile rather than from substring
//! matches. Statements sqlparser cannot read get a case-insensitive, word-boundary
//! heuristic profile instead.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::{Parser, ParserError};
use std::ops::Range;

lazy_static! {
    static ref LEADING_WORD: Regex = Regex::new(r"^\s*\(*\s*([A-Za-z]+)").unwrap();
    static ref LIMIT_CLAUSE: Regex = Regex::new(r"(?i)\bLIMIT\s+(\d+)").unwrap();
    static ref SELECT_KEYWORD: Regex = Regex::new(r"(?i)\bSELECT\b").unwrap();
    static ref DISTINCT_PREFIX: Regex = Regex::new(r"(?i)^\s+(DISTINCT|ALL)\b").unwrap();
}

/// What a statement does, coarsely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Row-selection (SELECT, WITH ... SELECT, VALUES)
    Query,
    Mutation,
    Ddl,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProfile {
    /// Whether sqlparser understood the statement
    pub parsed: bool,
    pub statement_count: usize,
    /// Kind of the first statement
    pub kind: StatementKind,
    /// A LIMIT (or FETCH FIRST) clause bounds the outer query
    pub has_limit: bool,
    /// The leading selection already carries a DISTINCT / ALL quantifier
    pub has_distinct: bool,
}

impl QueryProfile {
    pub fn from_statements(statements: &[Statement]) -> Self {
        let mut profile = Self {
            parsed: true,
            statement_count: statements.len(),
            kind: StatementKind::Other,
            has_limit: false,
            has_distinct: false,
        };

        if let Some(first) = statements.first() {
            profile.kind = statement_kind(first);
            if let Statement::Query(query) = first {
                profile.has_limit = query.limit.is_some() || query.fetch.is_some();
                profile.has_distinct = leading_select_distinct(&query.body);
            }
        }
        profile
    }

    /// Best-effort profile for statements the parser rejects
    pub fn from_sql_heuristic(sql: &str) -> Self {
        let kind = LEADING_WORD
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|word| keyword_kind(word.as_str()))
            .unwrap_or(StatementKind::Other);

        let statement_count = sql
            .split(';')
            .filter(|segment| !segment.trim().is_empty())
            .count();

        let has_distinct = SELECT_KEYWORD
            .find(sql)
            .map(|m| DISTINCT_PREFIX.is_match(&sql[m.end()..]))
            .unwrap_or(false);

        Self {
            parsed: false,
            statement_count,
            kind,
            has_limit: LIMIT_CLAUSE.is_match(sql),
            has_distinct,
        }
    }
}

pub fn parse_statements(sql: &str) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(&SQLiteDialect {}, sql)
}

/// Byte range and value of the last literal LIMIT, for the textual rewrite. Values too
/// large for `u64` report `u64::MAX`.
pub(crate) fn last_limit_literal(sql: &str) -> Option<(Range<usize>, u64)> {
    LIMIT_CLAUSE
        .captures_iter(sql)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|digits| (digits.range(), digits.as_str().parse().unwrap_or(u64::MAX)))
}

/// Byte offset just past the first SELECT keyword, for the textual rewrite
pub(crate) fn first_select_end(sql: &str) -> Option<usize> {
    SELECT_KEYWORD.find(sql).map(|m| m.end())
}

fn keyword_kind(word: &str) -> StatementKind {
    match word.to_ascii_uppercase().as_str() {
        "SELECT" | "WITH" | "VALUES" => StatementKind::Query,
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "UPSERT" | "MERGE" => StatementKind::Mutation,
        "CREATE" | "DROP" | "ALTER" | "TRUNCATE" => StatementKind::Ddl,
        _ => StatementKind::Other,
    }
}

fn statement_kind(statement: &Statement) -> StatementKind {
    match statement {
        Statement::Query(_) => StatementKind::Query,
        Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
            StatementKind::Mutation
        }
        Statement::CreateTable { .. } | Statement::Drop { .. } | Statement::AlterTable { .. } => {
            StatementKind::Ddl
        }
        _ => StatementKind::Other,
    }
}

fn leading_select_distinct(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.distinct.is_some(),
        SetExpr::Query(query) => leading_select_distinct(&query.body),
        SetExpr::SetOperation { left, .. } => leading_select_distinct(left),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(sql: &str) -> QueryProfile {
        QueryProfile::from_statements(&parse_statements(sql).unwrap())
    }

    #[test]
    fn test_profile_plain_select() {
        let profile = profile("SELECT * FROM departments");
        assert!(profile.parsed);
        assert_eq!(profile.statement_count, 1);
        assert_eq!(profile.kind, StatementKind::Query);
        assert!(!profile.has_limit);
        assert!(!profile.has_distinct);
    }

    #[test]
    fn test_profile_detects_limit_and_distinct_case_insensitively() {
        let profile = profile("select distinct dept_name from departments limit 5");
        assert!(profile.has_limit);
        assert!(profile.has_distinct);
    }

    #[test]
    fn test_limit_inside_subquery_does_not_bound_outer_query() {
        let profile = profile(
            "SELECT * FROM employees WHERE emp_no IN (SELECT emp_no FROM salaries LIMIT 3)",
        );
        assert!(!profile.has_limit);
    }

    #[test]
    fn test_profile_mutations() {
        assert_eq!(profile("DELETE FROM employees").kind, StatementKind::Mutation);
        assert_eq!(profile("DROP TABLE employees").kind, StatementKind::Ddl);
    }

    #[test]
    fn test_profile_counts_statements() {
        let profile = profile("SELECT 1; DELETE FROM employees");
        assert_eq!(profile.statement_count, 2);
        assert_eq!(profile.kind, StatementKind::Query);
    }

    #[test]
    fn test_heuristic_profile() {
        let profile = QueryProfile::from_sql_heuristic("select  Distinct name from `dept` limit 10 ???");
        assert!(!profile.parsed);
        assert_eq!(profile.kind, StatementKind::Query);
        assert!(profile.has_limit);
        assert!(profile.has_distinct);

        let update = QueryProfile::from_sql_heuristic("update employees set salary = 0 ???");
        assert_eq!(update.kind, StatementKind::Mutation);
    }

    #[test]
    fn test_last_limit_literal() {
        let sql = "select * from (select 1 limit 3) limit 100000";
        let (range, value) = last_limit_literal(sql).unwrap();
        assert_eq!(&sql[range], "100000");
        assert_eq!(value, 100000);

        let (_, huge) = last_limit_literal("select 1 LIMIT 99999999999999999999999").unwrap();
        assert_eq!(huge, u64::MAX);
        assert!(last_limit_literal("select 1").is_none());
    }
}
