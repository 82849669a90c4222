//! Routes: the combined condition set bound to one handler.
//!
//! # Responsibilities
//! - Hold the five conditions of a route, immutably
//! - Combine a type-level route with a method-level one
//! - Match a request, short-circuiting on the first failing condition
//! - Rank two matched routes
//! - Build routes from the plain `RouteSpec` record handed over by handler
//!   discovery
//!
//! # Design Decisions
//! - Evaluation order: consumes, headers, produces, methods, patterns
//! - Ranking order: patterns, headers, consumes, produces, methods
//! - Header expressions on `content-format`/`accept` fold into
//!   consumes/produces

use std::cmp::Ordering;
use std::fmt;

use crate::error::MappingError;
use crate::message::{Method, Request};
use crate::routing::condition::{
    ConsumesCondition, HeaderCondition, HeaderExpr, MediaExpr, MethodCondition, PathCondition,
    ProducesCondition, RequestCondition,
};
use crate::routing::pattern::PathPattern;

const CONTENT_FORMAT_OPTION: &str = "content-format";
const ACCEPT_OPTION: &str = "accept";

/// Immutable set of matching conditions.
///
/// `Route::default()` has every condition empty and matches any request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route {
    paths: PathCondition,
    methods: MethodCondition,
    headers: HeaderCondition,
    consumes: ConsumesCondition,
    produces: ProducesCondition,
}

impl Route {
    pub fn new(
        paths: PathCondition,
        methods: MethodCondition,
        headers: HeaderCondition,
        consumes: ConsumesCondition,
        produces: ProducesCondition,
    ) -> Self {
        Self {
            paths,
            methods,
            headers,
            consumes,
            produces,
        }
    }

    pub fn paths(&self) -> &PathCondition {
        &self.paths
    }

    pub fn methods(&self) -> &MethodCondition {
        &self.methods
    }

    pub fn headers(&self) -> &HeaderCondition {
        &self.headers
    }

    pub fn consumes(&self) -> &ConsumesCondition {
        &self.consumes
    }

    pub fn produces(&self) -> &ProducesCondition {
        &self.produces
    }

    /// Patterns are cross-joined; the other conditions are replaced by
    /// `other`'s when those are non-empty.
    pub fn combine(&self, other: &Route) -> Route {
        Route {
            paths: self.paths.combine(&other.paths),
            methods: self.methods.combine(&other.methods),
            headers: self.headers.combine(&other.headers),
            consumes: self.consumes.combine(&other.consumes),
            produces: self.produces.combine(&other.produces),
        }
    }

    /// The narrowed route if every condition matches.
    pub fn matching_condition(&self, request: &Request) -> Option<Route> {
        let consumes = self.consumes.matching_condition(request)?;
        let headers = self.headers.matching_condition(request)?;
        let produces = self.produces.matching_condition(request)?;
        let methods = self.methods.matching_condition(request)?;
        let paths = self.paths.matching_condition(request)?;
        Some(Route {
            paths,
            methods,
            headers,
            consumes,
            produces,
        })
    }

    /// Ranks two routes already narrowed for `request`.
    pub fn compare_to(&self, other: &Route, request: &Request) -> Ordering {
        self.paths
            .compare_to(&other.paths, request)
            .then_with(|| self.headers.compare_to(&other.headers, request))
            .then_with(|| self.consumes.compare_to(&other.consumes, request))
            .then_with(|| self.produces.compare_to(&other.produces, request))
            .then_with(|| self.methods.compare_to(&other.methods, request))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.paths)?;
        if !self.methods.is_empty() {
            write!(f, ", methods={}", self.methods)?;
        }
        if !self.headers.is_empty() {
            write!(f, ", headers={}", self.headers)?;
        }
        if !self.consumes.is_empty() {
            write!(f, ", consumes={}", self.consumes)?;
        }
        if !self.produces.is_empty() {
            write!(f, ", produces={}", self.produces)?;
        }
        f.write_str("}")
    }
}

/// Plain route record, as supplied by handler discovery or configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSpec {
    pub paths: Vec<String>,
    pub methods: Vec<Method>,
    pub headers: Vec<String>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
}

impl RouteSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, pattern: impl Into<String>) -> Self {
        self.paths.push(pattern.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn header(mut self, expr: impl Into<String>) -> Self {
        self.headers.push(expr.into());
        self
    }

    pub fn consumes(mut self, expr: impl Into<String>) -> Self {
        self.consumes.push(expr.into());
        self
    }

    pub fn produces(mut self, expr: impl Into<String>) -> Self {
        self.produces.push(expr.into());
        self
    }

    pub fn build(&self) -> Result<Route, MappingError> {
        let patterns = self
            .paths
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut consumes = self
            .consumes
            .iter()
            .map(|e| e.parse::<MediaExpr>())
            .collect::<Result<Vec<_>, _>>()?;
        let mut produces = self
            .produces
            .iter()
            .map(|e| e.parse::<MediaExpr>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut headers = Vec::with_capacity(self.headers.len());
        for raw in &self.headers {
            let expr: HeaderExpr = raw.parse()?;
            let folded = match (expr.name(), expr.value()) {
                (CONTENT_FORMAT_OPTION, Some(value)) => {
                    consumes.push(MediaExpr::new(value.parse()?, expr.is_negated()));
                    true
                }
                (ACCEPT_OPTION, Some(value)) => {
                    produces.push(MediaExpr::new(value.parse()?, expr.is_negated()));
                    true
                }
                _ => false,
            };
            if !folded {
                headers.push(expr);
            }
        }

        Ok(Route::new(
            PathCondition::new(patterns),
            MethodCondition::new(self.methods.iter().copied()),
            HeaderCondition::new(headers),
            ConsumesCondition::new(consumes),
            ProducesCondition::new(produces),
        ))
    }
}
