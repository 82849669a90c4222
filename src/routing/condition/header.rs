//! Header (option) condition.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::MappingError;
use crate::message::Request;
use crate::routing::condition::RequestCondition;

/// `name`, `!name`, `name=value` or `name!=value`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeaderExpr {
    name: String,
    value: Option<String>,
    negated: bool,
}

impl HeaderExpr {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn matches(&self, request: &Request) -> bool {
        let values = request.headers().get_all(&self.name);
        let found = match &self.value {
            Some(expected) => values.iter().any(|v| v == expected),
            None => !values.is_empty(),
        };
        found != self.negated
    }
}

impl FromStr for HeaderExpr {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim();
        let invalid = || MappingError::InvalidHeaderExpression(s.to_string());

        let (name, value, negated) = if let Some((name, value)) = expr.split_once("!=") {
            (name, Some(value), true)
        } else if let Some((name, value)) = expr.split_once('=') {
            (name, Some(value), false)
        } else if let Some(name) = expr.strip_prefix('!') {
            (name, None, true)
        } else {
            (expr, None, false)
        };

        let name = name.trim();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '!' || c == '=') {
            return Err(invalid());
        }
        let value = value.map(str::trim);
        if value == Some("") {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_ascii_lowercase(),
            value: value.map(str::to_string),
            negated,
        })
    }
}

impl fmt::Display for HeaderExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.negated) {
            (Some(v), true) => write!(f, "{}!={}", self.name, v),
            (Some(v), false) => write!(f, "{}={}", self.name, v),
            (None, true) => write!(f, "!{}", self.name),
            (None, false) => f.write_str(&self.name),
        }
    }
}

/// Matches when every expression holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HeaderCondition {
    expressions: BTreeSet<HeaderExpr>,
}

impl HeaderCondition {
    pub fn new(expressions: impl IntoIterator<Item = HeaderExpr>) -> Self {
        Self {
            expressions: expressions.into_iter().collect(),
        }
    }

    pub fn expressions(&self) -> &BTreeSet<HeaderExpr> {
        &self.expressions
    }

    fn value_match_count(&self) -> usize {
        self.expressions
            .iter()
            .filter(|e| e.value.is_some() && !e.negated)
            .count()
    }
}

impl RequestCondition for HeaderCondition {
    fn combine(&self, other: &Self) -> Self {
        if other.expressions.is_empty() {
            self.clone()
        } else {
            other.clone()
        }
    }

    fn matching_condition(&self, request: &Request) -> Option<Self> {
        self.expressions
            .iter()
            .all(|e| e.matches(request))
            .then(|| self.clone())
    }

    /// More expressions first, then more value-matching expressions.
    fn compare_to(&self, other: &Self, _request: &Request) -> Ordering {
        other
            .expressions
            .len()
            .cmp(&self.expressions.len())
            .then_with(|| other.value_match_count().cmp(&self.value_match_count()))
    }

    fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

impl fmt::Display for HeaderCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.expressions.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", joined.join(" && "))
    }
}
