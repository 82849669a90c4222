//! Path patterns and variable extraction.
//!
//! # Responsibilities
//! - Parse slash-delimited templates: literals, `{name}`, `*`, trailing `**`
//!   and trailing `{*name}`
//! - Match request path segments and extract variables
//! - Rank two patterns by specificity for a given path
//!
//! # Design Decisions
//! - Segment-wise matching only, no regex in the hot path
//! - Empty segments are ignored on both sides (`/a//b` == `/a/b`)
//! - Multi-segment wildcards are only allowed as the last segment

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MappingError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Literal(String),
    Variable(String),
    Wildcard,
    MultiWildcard,
    CaptureRest(String),
}

impl Segment {
    fn is_multi(&self) -> bool {
        matches!(self, Segment::MultiWildcard | Segment::CaptureRest(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Variable(name) => write!(f, "{{{}}}", name),
            Segment::Wildcard => f.write_str("*"),
            Segment::MultiWildcard => f.write_str("**"),
            Segment::CaptureRest(name) => write!(f, "{{*{}}}", name),
        }
    }
}

/// A compiled path template such as `/led/{id}` or `/files/**`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

fn valid_variable_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, MappingError> {
        let invalid = |reason| MappingError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in raw.iter().enumerate() {
            let last = i + 1 == raw.len();
            let segment = if *part == "**" {
                Segment::MultiWildcard
            } else if *part == "*" {
                Segment::Wildcard
            } else if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                let (rest, name) = match inner.strip_prefix('*') {
                    Some(name) => (true, name),
                    None => (false, inner),
                };
                if !valid_variable_name(name) {
                    return Err(invalid("variable names must be alphanumeric"));
                }
                if names.contains(&name) {
                    return Err(invalid("duplicate variable name"));
                }
                names.push(name);
                if rest {
                    Segment::CaptureRest(name.to_string())
                } else {
                    Segment::Variable(name.to_string())
                }
            } else if part.contains('{') || part.contains('}') || part.contains('*') {
                return Err(invalid("variables and wildcards must span a whole segment"));
            } else {
                Segment::Literal((*part).to_string())
            };
            if segment.is_multi() && !last {
                return Err(invalid("multi-segment wildcards must be the last segment"));
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Pattern matching only the root path.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// `/**` or `/{*name}`.
    pub fn is_catch_all(&self) -> bool {
        self.segments.len() == 1 && self.segments[0].is_multi()
    }

    fn ends_with_multi(&self) -> bool {
        self.segments.last().map(Segment::is_multi).unwrap_or(false)
    }

    fn variable_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Variable(_) | Segment::CaptureRest(_)))
            .count()
    }

    fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Wildcard | Segment::MultiWildcard))
            .count()
    }

    fn literal_length(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.len() + 1,
                _ => 1,
            })
            .sum()
    }

    pub fn matches(&self, segments: &[&str]) -> bool {
        self.capture(segments, None)
    }

    /// Variables bound by matching `segments`, or `None` if the pattern does not match.
    pub fn extract(&self, segments: &[&str]) -> Option<PathVariables> {
        let mut vars = PathVariables::default();
        self.capture(segments, Some(&mut vars)).then_some(vars)
    }

    fn capture(&self, segments: &[&str], mut vars: Option<&mut PathVariables>) -> bool {
        let mut i = 0;
        for segment in &self.segments {
            match segment {
                Segment::MultiWildcard => return true,
                Segment::CaptureRest(name) => {
                    if let Some(vars) = vars.as_deref_mut() {
                        vars.insert(name.clone(), segments.get(i..).unwrap_or_default().join("/"));
                    }
                    return true;
                }
                _ => {}
            }
            let Some(actual) = segments.get(i) else {
                return false;
            };
            match segment {
                Segment::Literal(l) if l != actual => return false,
                Segment::Variable(name) => {
                    if let Some(vars) = vars.as_deref_mut() {
                        vars.insert(name.clone(), (*actual).to_string());
                    }
                }
                _ => {}
            }
            i += 1;
        }
        i == segments.len()
    }

    /// Concatenates `self` as a prefix with `other`. A trailing `**` on the prefix is dropped.
    pub fn combine(&self, other: &PathPattern) -> PathPattern {
        let mut segments = self.segments.clone();
        if segments.last().map(Segment::is_multi).unwrap_or(false) && !other.segments.is_empty() {
            segments.pop();
        }
        segments.extend(other.segments.iter().cloned());
        PathPattern { segments }
    }

    fn is_exact_match(&self, segments: &[&str]) -> bool {
        self.is_literal()
            && self.segments.len() == segments.len()
            && self
                .segments
                .iter()
                .zip(segments)
                .all(|(s, p)| matches!(s, Segment::Literal(l) if l == p))
    }

    /// Specificity ordering for a request path; `Less` means `self` is more specific.
    pub fn compare_for(&self, other: &PathPattern, segments: &[&str]) -> Ordering {
        let exact = (self.is_exact_match(segments), other.is_exact_match(segments));
        match exact {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        // catch-alls and trailing multi-wildcards rank last, in that order
        let rank = |p: &PathPattern| (p.is_catch_all(), p.ends_with_multi());
        let by_rank = rank(self).cmp(&rank(other));
        if by_rank != Ordering::Equal {
            return by_rank;
        }

        let total = |p: &PathPattern| p.variable_count() + p.wildcard_count();
        total(self)
            .cmp(&total(other))
            .then_with(|| other.literal_length().cmp(&self.literal_length()))
            .then_with(|| self.wildcard_count().cmp(&other.wildcard_count()))
            .then_with(|| self.variable_count().cmp(&other.variable_count()))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Variables bound from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVariables {
    values: BTreeMap<String, String>,
}

impl PathVariables {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: String, value: String) {
        self.values.insert(name, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
