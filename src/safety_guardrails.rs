//! Safety & Size Guardrails
//!
//! Every generated statement passes through [`QueryGuard`] before it reaches the store:
//! - the outer query is bounded to `row_limit` rows (appended, or clamped when larger)
//! - the leading selection asks for distinct rows
//! - in read-only mode, anything but a single query is rejected
//!
//! Rewrites happen on the sqlparser tree when the statement parses, and on the text
//! otherwise. Both paths are idempotent.

use crate::error::{AskError, Result};
use crate::execution::profile::{
    first_select_end, last_limit_literal, parse_statements, QueryProfile, StatementKind,
};
use crate::synthesizer::CandidateQuery;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Distinct, Expr, SetExpr, Statement, Value};
use tracing::{debug, info};

/// A rewrite the guard applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuardAction {
    LimitAppended { limit: u64 },
    LimitClamped { from: u64, to: u64 },
    DistinctApplied,
}

/// Candidate after guarding; `sql` is what gets executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardedQuery {
    pub sql: String,
    pub candidate: CandidateQuery,
    pub actions: Vec<GuardAction>,
    /// Rewritten on the syntax tree rather than on text
    pub structural: bool,
    pub profile: QueryProfile,
}

#[derive(Debug, Clone)]
pub struct QueryGuard {
    row_limit: u64,
    read_only: bool,
}

impl QueryGuard {
    pub fn new(row_limit: u64, read_only: bool) -> Self {
        Self { row_limit, read_only }
    }

    pub fn guard(&self, candidate: &CandidateQuery) -> Result<GuardedQuery> {
        let sql = candidate.sql.trim().trim_end_matches(';').trim_end();
        if sql.is_empty() {
            return Err(AskError::GuardRejected("empty statement".to_string()));
        }

        let (sql, actions, structural, profile) = match parse_statements(sql) {
            Ok(mut statements) => {
                let profile = QueryProfile::from_statements(&statements);
                self.check_statement_shape(&profile)?;
                let actions = match statements.first_mut() {
                    Some(statement) => self.rewrite_tree(statement),
                    None => Vec::new(),
                };
                let rendered = statements
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                (rendered, actions, true, profile)
            }
            Err(e) => {
                debug!("Guard falling back to textual rewrite: {}", e);
                let profile = QueryProfile::from_sql_heuristic(sql);
                self.check_statement_shape(&profile)?;
                let (rewritten, actions) = self.rewrite_text(sql, &profile);
                (rewritten, actions, false, profile)
            }
        };

        if !actions.is_empty() {
            info!("🛡️ Guard applied {:?}", actions);
        }

        Ok(GuardedQuery {
            sql,
            candidate: candidate.clone(),
            actions,
            structural,
            profile,
        })
    }

    fn check_statement_shape(&self, profile: &QueryProfile) -> Result<()> {
        if !self.read_only {
            return Ok(());
        }
        if profile.statement_count != 1 {
            return Err(AskError::GuardRejected(format!(
                "expected a single statement, found {}",
                profile.statement_count
            )));
        }
        if profile.kind != StatementKind::Query {
            return Err(AskError::GuardRejected(format!(
                "only read queries are allowed, got a {:?} statement",
                profile.kind
            )));
        }
        Ok(())
    }

    fn rewrite_tree(&self, statement: &mut Statement) -> Vec<GuardAction> {
        let mut actions = Vec::new();
        let Statement::Query(query) = statement else {
            return actions;
        };

        if query.limit.is_none() && query.fetch.is_none() {
            query.limit = Some(limit_expr(self.row_limit));
            actions.push(GuardAction::LimitAppended { limit: self.row_limit });
        } else if let Some(requested) = literal_limit(query.limit.as_ref()) {
            if requested > self.row_limit {
                query.limit = Some(limit_expr(self.row_limit));
                actions.push(GuardAction::LimitClamped {
                    from: requested,
                    to: self.row_limit,
                });
            }
        }

        if let Some(select) = leading_select_mut(&mut query.body) {
            if select.distinct.is_none() {
                select.distinct = Some(Distinct::Distinct);
                actions.push(GuardAction::DistinctApplied);
            }
        }
        actions
    }

    fn rewrite_text(&self, sql: &str, profile: &QueryProfile) -> (String, Vec<GuardAction>) {
        let mut actions = Vec::new();
        let mut rewritten = sql.to_string();

        if profile.kind == StatementKind::Query && !profile.has_distinct {
            if let Some(end) = first_select_end(&rewritten) {
                rewritten.insert_str(end, " DISTINCT");
                actions.push(GuardAction::DistinctApplied);
            }
        }

        if profile.kind == StatementKind::Query {
            match last_limit_literal(&rewritten) {
                Some((digits, requested)) if requested > self.row_limit => {
                    rewritten.replace_range(digits, &self.row_limit.to_string());
                    actions.push(GuardAction::LimitClamped {
                        from: requested,
                        to: self.row_limit,
                    });
                }
                Some(_) => {}
                None if !profile.has_limit => {
                    rewritten.push_str(&format!(" LIMIT {}", self.row_limit));
                    actions.push(GuardAction::LimitAppended { limit: self.row_limit });
                }
                None => {}
            }
        }

        (rewritten, actions)
    }
}

fn limit_expr(limit: u64) -> Expr {
    Expr::Value(Value::Number(limit.to_string(), false))
}

fn literal_limit(expr: Option<&Expr>) -> Option<u64> {
    match expr {
        Some(Expr::Value(Value::Number(n, _))) => n.parse().ok(),
        _ => None,
    }
}

fn leading_select_mut(body: &mut SetExpr) -> Option<&mut sqlparser::ast::Select> {
    match body {
        SetExpr::Select(select) => Some(select.as_mut()),
        SetExpr::Query(query) => leading_select_mut(query.body.as_mut()),
        SetExpr::SetOperation { left, .. } => leading_select_mut(left.as_mut()),
        _ => None,
    }
}
