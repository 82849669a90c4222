//! Path pattern condition.

use std::cmp::Ordering;
use std::fmt;

use crate::message::Request;
use crate::routing::condition::RequestCondition;
use crate::routing::pattern::PathPattern;

/// Matches when any contained pattern matches the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathCondition {
    patterns: Vec<PathPattern>,
}

impl PathCondition {
    pub fn new(patterns: impl IntoIterator<Item = PathPattern>) -> Self {
        let mut patterns: Vec<PathPattern> = patterns.into_iter().collect();
        patterns.sort();
        patterns.dedup();
        Self { patterns }
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    /// Most specific pattern after narrowing.
    pub fn best_pattern(&self) -> Option<&PathPattern> {
        self.patterns.first()
    }

    /// Patterns without variables or wildcards.
    pub fn literal_patterns(&self) -> impl Iterator<Item = &PathPattern> {
        self.patterns.iter().filter(|p| p.is_literal())
    }
}

impl RequestCondition for PathCondition {
    /// Cross-joins the prefix patterns with the suffix patterns.
    fn combine(&self, other: &Self) -> Self {
        match (self.patterns.is_empty(), other.patterns.is_empty()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => PathCondition::new(
                self.patterns
                    .iter()
                    .flat_map(|prefix| other.patterns.iter().map(move |suffix| prefix.combine(suffix))),
            ),
        }
    }

    fn matching_condition(&self, request: &Request) -> Option<Self> {
        if self.patterns.is_empty() {
            return Some(self.clone());
        }
        let segments = request.segments();
        let mut matched: Vec<PathPattern> = self
            .patterns
            .iter()
            .filter(|p| p.matches(&segments))
            .cloned()
            .collect();
        if matched.is_empty() {
            return None;
        }
        // narrowed order is by specificity, not lexical
        matched.sort_by(|a, b| a.compare_for(b, &segments));
        Some(Self { patterns: matched })
    }

    fn compare_to(&self, other: &Self, request: &Request) -> Ordering {
        let segments = request.segments();
        for (a, b) in self.patterns.iter().zip(&other.patterns) {
            let result = a.compare_for(b, &segments);
            if result != Ordering::Equal {
                return result;
            }
        }
        other.patterns.len().cmp(&self.patterns.len())
    }

    fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Display for PathCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.patterns.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", joined.join(" || "))
    }
}
