//! # Filter Grammar
//!
//! A filter value is either a plain scalar or a string `<op>.<value>`
//! where `<op>` is a run of word characters. Anything else is an equality
//! test on the raw value.
//!
//! Recognized operators are `eq`, `neq`, `lte`, `gte` and their negated
//! forms `not_<op>`. A predicate carrying any other operator is dropped
//! when the request is planned: it never reaches SQL and never narrows
//! the result.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static FILTER_RE: OnceLock<Regex> = OnceLock::new();

fn filter_pattern() -> &'static Regex {
    FILTER_RE.get_or_init(|| Regex::new(r"(?s)^(\w+)\.(.*)$").expect("valid regex"))
}

/// Parsed form of one raw filter value
#[derive(Debug, Clone, PartialEq)]
pub struct FilterToken {
    pub op: String,
    pub value: Value,
}

/// Split a raw filter value into operator and operand.
///
/// `"eq.ativo"` gives `(eq, "ativo")`; `"5"`, `5` and `"no-dot"` give
/// `(eq, <input>)`. The operand keeps everything after the first dot,
/// line breaks included, so `"eq.1.5"` compares against `"1.5"`.
pub fn parse_filter(raw: &Value) -> FilterToken {
    if let Value::String(text) = raw {
        if let Some(caps) = filter_pattern().captures(text) {
            return FilterToken {
                op: caps[1].to_string(),
                value: Value::String(caps[2].to_string()),
            };
        }
    }
    FilterToken {
        op: Comparison::Eq.as_str().to_string(),
        value: raw.clone(),
    }
}

/// Base comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Neq,
    Lte,
    Gte,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Neq => "neq",
            Comparison::Lte => "lte",
            Comparison::Gte => "gte",
        }
    }

    /// SQL operator text
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "!=",
            Comparison::Lte => "<=",
            Comparison::Gte => ">=",
        }
    }

    fn from_str(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(Comparison::Eq),
            "neq" => Some(Comparison::Neq),
            "lte" => Some(Comparison::Lte),
            "gte" => Some(Comparison::Gte),
            _ => None,
        }
    }
}

/// A recognized operator: a comparison, optionally negated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub comparison: Comparison,
    pub negated: bool,
}

impl Operator {
    pub fn new(comparison: Comparison) -> Self {
        Self {
            comparison,
            negated: false,
        }
    }

    pub fn negate(comparison: Comparison) -> Self {
        Self {
            comparison,
            negated: true,
        }
    }

    /// Parse an operator token; `None` for anything unrecognized
    pub fn from_token(token: &str) -> Option<Self> {
        match token.strip_prefix("not_") {
            Some(inner) => Comparison::from_str(inner).map(Operator::negate),
            None => Comparison::from_str(token).map(Operator::new),
        }
    }

    /// Token form (`gte`, `not_eq`)
    pub fn as_token(&self) -> String {
        if self.negated {
            format!("not_{}", self.comparison.as_str())
        } else {
            self.comparison.as_str().to_string()
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_token())
    }
}

/// An unvalidated filter condition as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub operator: String,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
        }
    }

    /// Build from a query-string pair `column=[<op>.]<value>`
    pub fn from_query(column: impl Into<String>, raw: &str) -> Self {
        let token = parse_filter(&Value::String(raw.to_string()));
        Self::new(column, token.op, token.value)
    }

    /// The recognized operator, if any
    pub fn operator(&self) -> Option<Operator> {
        Operator::from_token(&self.operator)
    }
}
