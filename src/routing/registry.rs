//! Mapping registry: routes bound to handler references.
//!
//! # Responsibilities
//! - Store `(Route, HandlerRef)` entries registered at startup
//! - Reject a route already mapped to another handler
//! - Index routes by each literal pattern they carry for the direct lookup
//!
//! # Design Decisions
//! - Built single-threaded, then frozen behind the dispatcher; no locks at
//!   request time
//! - Handler references resolve their target on demand; the registry never
//!   holds a handler instance

use std::collections::HashMap;

use crate::error::MappingError;
use crate::handler::HandlerRef;
use crate::routing::route::Route;

/// One registered route.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    route: Route,
    handler: HandlerRef,
}

impl RegistryEntry {
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

#[derive(Debug, Default)]
pub struct MappingRegistry {
    entries: Vec<RegistryEntry>,
    /// Literal path → indices into `entries`.
    direct: HashMap<String, Vec<usize>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: Route, handler: HandlerRef) -> Result<(), MappingError> {
        if let Some(existing) = self.entries.iter().find(|e| e.route == route) {
            tracing::error!(
                route = %route,
                existing = existing.handler.name(),
                handler = handler.name(),
                "Duplicate route mapping"
            );
            return Err(MappingError::DuplicateRoute {
                route: route.to_string(),
                existing: existing.handler.name().to_string(),
                handler: handler.name().to_string(),
            });
        }

        let index = self.entries.len();
        for pattern in route.paths().literal_patterns() {
            let indices = self.direct.entry(pattern.to_string()).or_default();
            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        tracing::info!(route = %route, handler = handler.name(), "Mapped route");
        self.entries.push(RegistryEntry { route, handler });
        Ok(())
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Entries with a literal pattern equal to `path` (normalised, e.g. `/led/3`).
    pub fn direct_entries(&self, path: &str) -> impl Iterator<Item = &RegistryEntry> {
        self.direct
            .get(path)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{BoxError, HandlerError};
    use crate::handler::{HandlerMethod, Target, TargetProvider};
    use crate::message::Method;
    use crate::routing::route::RouteSpec;

    fn handler(name: &str) -> HandlerRef {
        let target: TargetProvider = Arc::new(|| -> Result<Target, BoxError> { Ok(Arc::new(())) });
        let method = HandlerMethod::value(name, [], |_: Arc<()>, _| async { Ok::<_, HandlerError>(()) });
        HandlerRef::new("c", target, method)
    }

    fn names<'a>(entries: impl Iterator<Item = &'a RegistryEntry>) -> Vec<&'a str> {
        entries.map(|e| e.handler().name()).collect()
    }

    #[test]
    fn indexes_every_literal_pattern() {
        let mut registry = MappingRegistry::new();
        registry
            .register(RouteSpec::new().path("/temp").build().unwrap(), handler("open"))
            .unwrap();
        registry
            .register(
                RouteSpec::new().path("/temp").path("/t/{x}").method(Method::Get).build().unwrap(),
                handler("mixed"),
            )
            .unwrap();
        registry
            .register(RouteSpec::new().path("/t/{x}").build().unwrap(), handler("templated"))
            .unwrap();

        assert_eq!(names(registry.direct_entries("/temp")), ["c#open", "c#mixed"]);
        assert!(registry.direct_entries("/t/{x}").next().is_none());
        assert!(registry.direct_entries("/t/1").next().is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn rejects_route_mapped_twice() {
        let mut registry = MappingRegistry::new();
        let route = RouteSpec::new().path("/led/{id}").method(Method::Put).build().unwrap();
        registry.register(route.clone(), handler("set")).unwrap();

        match registry.register(route, handler("other")) {
            Err(MappingError::DuplicateRoute { existing, handler, .. }) => {
                assert_eq!(existing, "c#set");
                assert_eq!(handler, "c#other");
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }
}
