//! Per-request exchange state.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::message::Request;
use crate::observe::ObservationHandle;
use crate::routing::{HandlerMatch, PathVariables, Route};

/// Everything known about one dispatch once a handler was chosen.
pub struct Exchange {
    id: Uuid,
    request: Arc<Request>,
    route: Route,
    handler: String,
    path_variables: PathVariables,
    observation: Option<ObservationHandle>,
}

impl Exchange {
    pub fn new(
        id: Uuid,
        request: Arc<Request>,
        matched: &HandlerMatch,
        observation: Option<ObservationHandle>,
    ) -> Self {
        Self {
            id,
            request,
            route: matched.route.clone(),
            handler: matched.handler.name().to_string(),
            path_variables: matched.path_variables.clone(),
            observation,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// The matched route, narrowed to the conditions that held.
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn path_variables(&self) -> &PathVariables {
        &self.path_variables
    }

    /// Present when this request subscribes to the resource.
    pub fn observation(&self) -> Option<&ObservationHandle> {
        self.observation.as_ref()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.request.method())
            .field("path", &self.request.path())
            .field("handler", &self.handler)
            .field("observation", &self.observation.as_ref().map(|o| o.key().clone()))
            .finish()
    }
}
