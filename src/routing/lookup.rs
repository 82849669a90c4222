//! Handler lookup.
//!
//! # Responsibilities
//! - Collect every route matching a request (direct index first)
//! - Rank the matches and reject ties as ambiguous
//! - Extract path variables from the winner's best pattern
//! - Explain a miss (wrong method, content-format, accept, or no route)
//!
//! # Design Decisions
//! - Read-only over the registry; safe for concurrent lookups without locks
//! - A route matched through the direct index has a pattern equal to the
//!   request path, which outranks every other pattern, so the full scan is
//!   only needed when no indexed route matches
//! - Ambiguity is an error, never resolved by registration order

use std::collections::BTreeSet;
use std::fmt;

use crate::error::DispatchError;
use crate::handler::HandlerRef;
use crate::message::{Method, Request, ResponseCode};
use crate::routing::condition::RequestCondition;
use crate::routing::pattern::PathVariables;
use crate::routing::registry::{MappingRegistry, RegistryEntry};
use crate::routing::route::Route;

/// Why no handler matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoMatchReason {
    NoRoute,
    MethodNotAllowed(Vec<Method>),
    UnsupportedContentFormat,
    NotAcceptable,
}

impl NoMatchReason {
    pub fn response_code(&self) -> ResponseCode {
        match self {
            NoMatchReason::NoRoute => ResponseCode::NotFound,
            NoMatchReason::MethodNotAllowed(_) => ResponseCode::MethodNotAllowed,
            NoMatchReason::UnsupportedContentFormat => ResponseCode::UnsupportedContentFormat,
            NoMatchReason::NotAcceptable => ResponseCode::NotAcceptable,
        }
    }
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchReason::NoRoute => f.write_str("no matching route"),
            NoMatchReason::MethodNotAllowed(allowed) => {
                let names: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
                write!(f, "method not allowed, supported: {}", names.join(", "))
            }
            NoMatchReason::UnsupportedContentFormat => f.write_str("unsupported content-format"),
            NoMatchReason::NotAcceptable => f.write_str("no acceptable content-format"),
        }
    }
}

/// The winning route for a request.
#[derive(Debug, Clone)]
pub struct HandlerMatch {
    /// Route narrowed to the sub-conditions that matched.
    pub route: Route,
    pub handler: HandlerRef,
    pub path_variables: PathVariables,
}

#[derive(Debug, Default)]
pub struct HandlerMapping {
    registry: MappingRegistry,
}

impl HandlerMapping {
    pub fn new(registry: MappingRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Best handler for `request`, `None` if nothing matches.
    pub fn lookup(&self, request: &Request) -> Result<Option<HandlerMatch>, DispatchError> {
        let segments = request.segments();
        let direct_key = format!("/{}", segments.join("/"));

        let mut matches = collect_matches(self.registry.direct_entries(&direct_key), request);
        if matches.is_empty() {
            matches = collect_matches(self.registry.entries().iter(), request);
        }
        if matches.is_empty() {
            tracing::debug!(method = %request.method(), path = request.path(), "No route matched");
            return Ok(None);
        }

        matches.sort_by(|a, b| a.0.compare_to(&b.0, request));

        if let [first, second, ..] = matches.as_slice() {
            if first.0.compare_to(&second.0, request).is_eq() {
                tracing::error!(
                    path = request.path(),
                    first = first.1.handler().name(),
                    second = second.1.handler().name(),
                    "Ambiguous handler methods"
                );
                return Err(DispatchError::AmbiguousRoute {
                    path: request.path().to_string(),
                    first: first.1.handler().name().to_string(),
                    second: second.1.handler().name().to_string(),
                });
            }
        }

        let (route, entry) = matches.swap_remove(0);
        let path_variables = route
            .paths()
            .best_pattern()
            .and_then(|p| p.extract(&segments))
            .unwrap_or_default();

        tracing::debug!(route = %route, handler = entry.handler().name(), "Route matched");
        Ok(Some(HandlerMatch {
            route,
            handler: entry.handler().clone(),
            path_variables,
        }))
    }

    /// Explains why `lookup` found nothing, from routes that matched partially.
    pub fn diagnose(&self, request: &Request) -> NoMatchReason {
        let mut allowed = BTreeSet::new();
        let mut method_matched = false;
        let mut consumes_failed = false;
        let mut produces_failed = false;

        for entry in self.registry.entries() {
            let route = entry.route();
            if route.paths().matching_condition(request).is_none() {
                continue;
            }
            if route.methods().matching_condition(request).is_none() {
                allowed.extend(route.methods().methods().iter().copied());
                continue;
            }
            method_matched = true;
            if route.consumes().matching_condition(request).is_none() {
                consumes_failed = true;
            } else if route.produces().matching_condition(request).is_none() {
                produces_failed = true;
            }
        }

        if !method_matched && !allowed.is_empty() {
            NoMatchReason::MethodNotAllowed(allowed.into_iter().collect())
        } else if consumes_failed {
            NoMatchReason::UnsupportedContentFormat
        } else if produces_failed {
            NoMatchReason::NotAcceptable
        } else {
            NoMatchReason::NoRoute
        }
    }
}

fn collect_matches<'a>(
    entries: impl Iterator<Item = &'a RegistryEntry>,
    request: &Request,
) -> Vec<(Route, &'a RegistryEntry)> {
    entries
        .filter_map(|entry| entry.route().matching_condition(request).map(|route| (route, entry)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{BoxError, HandlerError};
    use crate::handler::{HandlerMethod, Target, TargetProvider};
    use crate::message::ContentFormat;
    use crate::routing::route::RouteSpec;

    fn handler(name: &str) -> HandlerRef {
        let target: TargetProvider = Arc::new(|| -> Result<Target, BoxError> { Ok(Arc::new(())) });
        let method = HandlerMethod::value(name, [], |_: Arc<()>, _| async { Ok::<_, HandlerError>(()) });
        HandlerRef::new("c", target, method)
    }

    fn mapping(routes: Vec<(RouteSpec, &str)>) -> HandlerMapping {
        let mut registry = MappingRegistry::new();
        for (spec, name) in routes {
            registry.register(spec.build().unwrap(), handler(name)).unwrap();
        }
        HandlerMapping::new(registry)
    }

    fn winner(mapping: &HandlerMapping, request: &Request) -> Option<String> {
        mapping
            .lookup(request)
            .unwrap()
            .map(|m| m.handler.name().to_string())
    }

    /// Ranking over every entry, bypassing the direct index.
    fn full_scan_winner(mapping: &HandlerMapping, request: &Request) -> Option<String> {
        let mut matches = collect_matches(mapping.registry().entries().iter(), request);
        matches.sort_by(|a, b| a.0.compare_to(&b.0, request));
        matches.first().map(|(_, e)| e.handler().name().to_string())
    }

    #[test]
    fn mixed_route_competes_with_literal_route() {
        let mapping = mapping(vec![
            (RouteSpec::new().path("/temp"), "open"),
            (RouteSpec::new().path("/temp").path("/t/{x}").method(Method::Get), "get_only"),
        ]);
        let get = Request::get("/temp").build();
        assert_eq!(winner(&mapping, &get).as_deref(), Some("c#get_only"));

        let put = Request::builder(Method::Put, "/temp").build();
        assert_eq!(winner(&mapping, &put).as_deref(), Some("c#open"));

        let templated = Request::get("/t/9").build();
        let matched = mapping.lookup(&templated).unwrap().unwrap();
        assert_eq!(matched.handler.name(), "c#get_only");
        assert_eq!(matched.path_variables.get("x"), Some("9"));
    }

    #[test]
    fn direct_index_agrees_with_full_scan() {
        let mapping = mapping(vec![
            (RouteSpec::new().path("/res/{id}").method(Method::Get), "by_id"),
            (RouteSpec::new().path("/res/latest").method(Method::Get), "latest"),
            (RouteSpec::new().path("/res/**"), "rest"),
            (RouteSpec::new().path("/temp"), "open"),
            (RouteSpec::new().path("/temp").path("/t/{x}").method(Method::Get), "get_only"),
            (RouteSpec::new().path("/{*all}").method(Method::Delete), "catch_all"),
        ]);
        let requests = [
            Request::get("/res/latest").build(),
            Request::get("/res/7").build(),
            Request::get("/res/7/log").build(),
            Request::get("/temp").build(),
            Request::builder(Method::Post, "/temp").build(),
            Request::get("/t/1").build(),
            Request::builder(Method::Delete, "/res/latest").build(),
            Request::builder(Method::Delete, "/elsewhere").build(),
            Request::get("/elsewhere").build(),
        ];
        for request in &requests {
            assert_eq!(
                winner(&mapping, request),
                full_scan_winner(&mapping, request),
                "{} {}",
                request.method(),
                request.path()
            );
        }
        assert_eq!(
            winner(&mapping, &Request::get("/res/latest").build()).as_deref(),
            Some("c#latest")
        );
    }

    #[test]
    fn literal_and_mixed_tie_is_ambiguous() {
        let mapping = mapping(vec![
            (RouteSpec::new().path("/temp").method(Method::Get), "literal"),
            (RouteSpec::new().path("/temp").path("/t/{x}").method(Method::Get), "mixed"),
        ]);
        match mapping.lookup(&Request::get("/temp").build()) {
            Err(DispatchError::AmbiguousRoute { first, second, .. }) => {
                let mut names = [first, second];
                names.sort();
                assert_eq!(names, ["c#literal".to_string(), "c#mixed".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn diagnose_reports_method_before_content_format() {
        let put_only = mapping(vec![(
            RouteSpec::new().path("/led").method(Method::Put).consumes("text/plain"),
            "set",
        )]);
        let request = Request::get("/led").content_format(ContentFormat::JSON).build();
        assert_eq!(
            put_only.diagnose(&request),
            NoMatchReason::MethodNotAllowed(vec![Method::Put])
        );

        // a route accepting the method narrows the reason to the content-format
        let both = mapping(vec![
            (RouteSpec::new().path("/led").method(Method::Put), "set"),
            (RouteSpec::new().path("/led").method(Method::Get).consumes("text/plain"), "get"),
        ]);
        assert_eq!(both.diagnose(&request), NoMatchReason::UnsupportedContentFormat);
    }

    #[test]
    fn diagnose_not_acceptable_and_no_route() {
        let mapping = mapping(vec![(
            RouteSpec::new().path("/temp").method(Method::Get).produces("application/json"),
            "read",
        )]);
        let cbor_only = Request::get("/temp").accept(ContentFormat::CBOR).build();
        assert!(mapping.lookup(&cbor_only).unwrap().is_none());
        assert_eq!(mapping.diagnose(&cbor_only), NoMatchReason::NotAcceptable);

        // only unregistered codes: treated like an absent accept list
        let unknown = Request::get("/temp").accept(ContentFormat(9999)).build();
        assert_eq!(winner(&mapping, &unknown).as_deref(), Some("c#read"));
        assert_eq!(
            mapping.diagnose(&Request::get("/nothing").build()),
            NoMatchReason::NoRoute
        );
    }
}
