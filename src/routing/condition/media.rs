//! Consumes (content-format) and produces (accept) conditions.
//!
//! # Design Decisions
//! - Both share `MediaExpr` and the same disjunctive shape: a request
//!   matches when a non-negated expression accepts it, or when there are
//!   negated expressions and every one of them holds
//! - A request accepting `*/*` still matches a produces condition that
//!   nothing else matched, narrowed to the empty condition

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::MappingError;
use crate::message::{ContentFormat, MediaType, Request};
use crate::routing::condition::RequestCondition;

/// A media type, optionally negated with a leading `!`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaExpr {
    media: MediaType,
    negated: bool,
}

impl MediaExpr {
    pub fn new(media: MediaType, negated: bool) -> Self {
        Self { media, negated }
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    fn sort_key(&self) -> (MediaType, bool) {
        (self.media.clone(), self.negated)
    }
}

impl FromStr for MediaExpr {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negated, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        Ok(Self::new(body.parse()?, negated))
    }
}

impl fmt::Display for MediaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "{}", self.media)
    }
}

fn normalise(expressions: impl IntoIterator<Item = MediaExpr>) -> Vec<MediaExpr> {
    let mut exprs: Vec<MediaExpr> = expressions.into_iter().collect();
    exprs.sort_by(|a, b| {
        a.media
            .compare_specificity(&b.media)
            .then_with(|| a.sort_key().cmp(&b.sort_key()))
    });
    exprs.dedup();
    exprs
}

/// Keeps the expressions that let the request through, or `None` if none do.
fn filter_matching(exprs: &[MediaExpr], holds: impl Fn(&MediaExpr) -> bool) -> Option<Vec<MediaExpr>> {
    let mut matched: Vec<MediaExpr> = exprs
        .iter()
        .filter(|e| !e.negated && holds(*e))
        .cloned()
        .collect();

    let negated: Vec<&MediaExpr> = exprs.iter().filter(|e| e.negated).collect();
    if !negated.is_empty() && negated.iter().all(|e| holds(*e)) {
        matched.extend(negated.into_iter().cloned());
    }

    (!matched.is_empty()).then_some(matched)
}

fn compare_first(a: &[MediaExpr], b: &[MediaExpr]) -> Ordering {
    match (a.first(), b.first()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.media.compare_specificity(&y.media),
    }
}

/// Matches the request content-format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConsumesCondition {
    expressions: Vec<MediaExpr>,
}

impl ConsumesCondition {
    pub fn new(expressions: impl IntoIterator<Item = MediaExpr>) -> Self {
        Self {
            expressions: normalise(expressions),
        }
    }

    pub fn expressions(&self) -> &[MediaExpr] {
        &self.expressions
    }
}

impl RequestCondition for ConsumesCondition {
    fn combine(&self, other: &Self) -> Self {
        if other.expressions.is_empty() {
            self.clone()
        } else {
            other.clone()
        }
    }

    fn matching_condition(&self, request: &Request) -> Option<Self> {
        if self.expressions.is_empty() {
            return Some(self.clone());
        }
        let content = request.content_media_type();
        let holds = |e: &MediaExpr| {
            let included = match &content {
                Some(media) => e.media.includes(media),
                None => e.media.is_wildcard_type(),
            };
            included != e.negated
        };
        filter_matching(&self.expressions, holds).map(|expressions| Self { expressions })
    }

    fn compare_to(&self, other: &Self, _request: &Request) -> Ordering {
        compare_first(&self.expressions, &other.expressions)
    }

    fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

impl fmt::Display for ConsumesCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.expressions.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", joined.join(" || "))
    }
}

/// Matches the request accept list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProducesCondition {
    expressions: Vec<MediaExpr>,
}

impl ProducesCondition {
    pub fn new(expressions: impl IntoIterator<Item = MediaExpr>) -> Self {
        Self {
            expressions: normalise(expressions),
        }
    }

    pub fn expressions(&self) -> &[MediaExpr] {
        &self.expressions
    }

    /// The content-format to default responses to, when exactly one concrete type is produced.
    pub fn single_content_format(&self) -> Option<ContentFormat> {
        match self.expressions.as_slice() {
            [only] if !only.negated && only.media.is_concrete() => only.media.content_format(),
            _ => None,
        }
    }
}

impl RequestCondition for ProducesCondition {
    fn combine(&self, other: &Self) -> Self {
        if other.expressions.is_empty() {
            self.clone()
        } else {
            other.clone()
        }
    }

    fn matching_condition(&self, request: &Request) -> Option<Self> {
        if self.expressions.is_empty() {
            return Some(self.clone());
        }
        let accepted = request.accepted_media_types();
        let holds = |e: &MediaExpr| {
            let compatible = accepted.iter().any(|a| e.media.is_compatible_with(a));
            compatible != e.negated
        };
        match filter_matching(&self.expressions, holds) {
            Some(expressions) => Some(Self { expressions }),
            None if accepted.contains(&MediaType::all()) => Some(Self::default()),
            None => None,
        }
    }

    /// Walks the accept list in order; the condition offering a more specific
    /// match for an earlier accepted type wins.
    fn compare_to(&self, other: &Self, request: &Request) -> Ordering {
        for accepted in request.accepted_media_types() {
            let first_for = |c: &Self| {
                c.expressions
                    .iter()
                    .find(|e| !e.negated && e.media.is_compatible_with(&accepted))
                    .cloned()
            };
            let result = match (first_for(self), first_for(other)) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.media.compare_specificity(&b.media),
            };
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    }

    fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

impl fmt::Display for ProducesCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.expressions.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", joined.join(" || "))
    }
}
