//! Request method condition.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::message::{Method, Request};
use crate::routing::condition::RequestCondition;

/// Matches when the request method is in the set; an empty set matches any method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MethodCondition {
    methods: BTreeSet<Method>,
}

impl MethodCondition {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn methods(&self) -> &BTreeSet<Method> {
        &self.methods
    }
}

impl RequestCondition for MethodCondition {
    /// A non-empty method-level set replaces the type-level set.
    fn combine(&self, other: &Self) -> Self {
        if other.methods.is_empty() {
            self.clone()
        } else {
            other.clone()
        }
    }

    /// Narrows to the single matched method.
    fn matching_condition(&self, request: &Request) -> Option<Self> {
        if self.methods.is_empty() {
            return Some(self.clone());
        }
        let method = request.method();
        self.methods
            .contains(&method)
            .then(|| MethodCondition::new([method]))
    }

    /// A narrowed single-method condition beats an open one.
    fn compare_to(&self, other: &Self, _request: &Request) -> Ordering {
        other.methods.len().cmp(&self.methods.len())
    }

    fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Display for MethodCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.methods.iter().map(|m| m.as_str()).collect();
        write!(f, "[{}]", joined.join(" || "))
    }
}
