//! The dispatcher: lookup, invocation and result handling for one request.
//!
//! # Responsibilities
//! - Find the handler for a request, or explain why there is none
//! - Route observe requests through the relation registry
//! - Invoke the handler and pick the result handler
//! - Apply default response code and content-format
//! - Translate every error into a terminal response
//!
//! # Design Decisions
//! - The mapping is frozen at `build()`; dispatch takes `&self` and needs no
//!   locks on the routing path
//! - Result handlers form a fixed list built here, never a dynamic scan

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::dispatch::exchange::Exchange;
use crate::dispatch::result::{
    ObservableResultHandler, PayloadResultHandler, ResultHandler, StreamResultHandler,
};
use crate::error::{DispatchError, HandlerError, MappingError};
use crate::handler::{
    standard_resolvers, ArgumentResolver, Controller, HandlerRef, InvocableHandler,
};
use crate::message::{Observe, Payload, RelationId, Request, Response, ResponseCode};
use crate::observability::metrics;
use crate::observability::tracing::{dispatch_span, new_exchange_id};
use crate::observe::{
    Claim, CloseReason, NoopNotifier, Notifier, ObservationContext, ObservationHandle,
    ObservationState, RelationKey, RelationRegistry,
};
use crate::routing::{HandlerMapping, HandlerMatch, MappingRegistry, Route};

pub struct DispatcherBuilder {
    registry: MappingRegistry,
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
    notifier: Arc<dyn Notifier>,
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            registry: MappingRegistry::new(),
            resolvers: Vec::new(),
            notifier: Arc::new(NoopNotifier),
            config: DispatcherConfig::default(),
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport callbacks for observe notifications.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Appends an argument resolver; resolvers are consulted in order.
    pub fn resolver(mut self, resolver: Arc<dyn ArgumentResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn standard_resolvers(mut self) -> Self {
        self.resolvers.extend(standard_resolvers());
        self
    }

    pub fn route(mut self, route: Route, handler: HandlerRef) -> Result<Self, MappingError> {
        self.registry.register(route, handler)?;
        Ok(self)
    }

    pub fn controller(mut self, controller: Controller) -> Result<Self, MappingError> {
        for (route, handler) in controller.into_routes()? {
            self.registry.register(route, handler)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Dispatcher {
        let relations = Arc::new(
            RelationRegistry::new(self.notifier, self.config.observe.max_relations)
                .expose_errors(self.config.errors.expose_messages),
        );
        let result_handlers: Vec<Box<dyn ResultHandler>> = vec![
            Box::new(ObservableResultHandler::new(Arc::clone(&relations))),
            Box::new(StreamResultHandler),
            Box::new(PayloadResultHandler),
        ];
        tracing::info!(
            routes = self.registry.len(),
            resolvers = self.resolvers.len(),
            observe = self.config.observe.enabled,
            "Dispatcher ready"
        );
        Dispatcher {
            mapping: HandlerMapping::new(self.registry),
            invoker: InvocableHandler::new(self.resolvers),
            result_handlers,
            relations,
            config: self.config,
        }
    }
}

pub struct Dispatcher {
    mapping: HandlerMapping,
    invoker: InvocableHandler,
    result_handlers: Vec<Box<dyn ResultHandler>>,
    relations: Arc<RelationRegistry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn mapping(&self) -> &HandlerMapping {
        &self.mapping
    }

    pub fn relations(&self) -> &Arc<RelationRegistry> {
        &self.relations
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatches `request`; errors are answered with their wire code.
    pub async fn dispatch(&self, request: Request) -> Response {
        let exchange_id = new_exchange_id();
        let span = dispatch_span(exchange_id, &request);
        let method = request.method();
        let started = Instant::now();

        async move {
            let response = match self.process(exchange_id, Arc::new(request)).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::debug!(
                        kind = %error.kind(),
                        code = %error.response_code(),
                        error = %error,
                        "Dispatch failed"
                    );
                    error.to_response(self.config.errors.expose_messages)
                }
            };
            metrics::record_dispatch(method, response.code, started);
            response
        }
        .instrument(span)
        .await
    }

    /// Like [`dispatch`](Self::dispatch) but returns the error itself.
    pub async fn handle(&self, request: Request) -> Result<Response, DispatchError> {
        let exchange_id = new_exchange_id();
        let span = dispatch_span(exchange_id, &request);
        self.process(exchange_id, Arc::new(request))
            .instrument(span)
            .await
    }

    /// Transport announced a relation on `resource` (the request path).
    pub fn on_relation_added(&self, resource: &str, relation: RelationId) {
        self.relations
            .on_relation_added(RelationKey::new(resource, relation));
    }

    /// Transport dropped a relation; its stream is cancelled.
    pub fn on_relation_removed(&self, resource: &str, relation: &RelationId) -> bool {
        self.relations
            .on_relation_removed(&RelationKey::new(resource, relation.clone()))
    }

    /// Cancels every live relation.
    pub fn shutdown(&self) {
        self.relations.shutdown();
    }

    async fn process(&self, id: Uuid, request: Arc<Request>) -> Result<Response, DispatchError> {
        let Some(matched) = self.mapping.lookup(&request)? else {
            metrics::record_lookup_miss();
            return Err(DispatchError::NoHandler {
                method: request.method(),
                path: request.path().to_string(),
                reason: self.mapping.diagnose(&request),
            });
        };

        match self.serve(id, &request, &matched).await {
            Ok(response) => Ok(response),
            Err(error) => match matched.handler.method().map_error(&error) {
                Some(mut response) => {
                    tracing::debug!(
                        handler = matched.handler.name(),
                        error = %error,
                        "Error mapped by handler"
                    );
                    finalize(&mut response, &request, &matched.route);
                    Ok(response)
                }
                None => Err(error),
            },
        }
    }

    async fn serve(
        &self,
        id: Uuid,
        request: &Arc<Request>,
        matched: &HandlerMatch,
    ) -> Result<Response, DispatchError> {
        let relation = request
            .relation()
            .map(|r| RelationKey::new(request.path(), r.clone()));

        // observe flags without a relation are served one-shot
        let observation = match (request.observe(), relation) {
            (Some(Observe::Deregister), Some(key)) => {
                self.relations.on_relation_removed(&key);
                None
            }
            (Some(Observe::Register), Some(key)) if self.config.observe.enabled => {
                match self.relations.claim(key) {
                    Claim::Owner(ctx) => Some(ctx),
                    Claim::Joined(ctx) => return self.join(&ctx, request, matched).await,
                    Claim::Full => None,
                }
            }
            _ => None,
        };

        let exchange = Arc::new(Exchange::new(
            id,
            Arc::clone(request),
            matched,
            observation.clone().map(ObservationHandle::new),
        ));
        let result = self.run(matched, &exchange).await;
        if let Some(ctx) = &observation {
            self.settle(ctx, &result);
        }

        let mut response = result?;
        finalize(&mut response, request, &matched.route);
        Ok(response)
    }

    async fn run(
        &self,
        matched: &HandlerMatch,
        exchange: &Arc<Exchange>,
    ) -> Result<Response, DispatchError> {
        let outcome = self.invoker.invoke(&matched.handler, exchange).await?;

        let Some(result_handler) = self
            .result_handlers
            .iter()
            .find(|h| h.supports(&outcome, exchange))
        else {
            return Err(DispatchError::HandlerInvocationFailed {
                handler: matched.handler.name().to_string(),
                source: HandlerError::new("no result handler supports the outcome"),
            });
        };

        let mut response = Response::new();
        result_handler
            .handle_result(outcome, exchange, &mut response)
            .await?;
        Ok(response)
    }

    /// Serves a request joining a relation another request subscribed.
    async fn join(
        &self,
        ctx: &Arc<ObservationContext>,
        request: &Request,
        matched: &HandlerMatch,
    ) -> Result<Response, DispatchError> {
        tracing::debug!(relation = %ctx.key(), "Serving cached observation");
        let emission = ctx
            .latest_result()
            .await
            .map_err(|reason| reason.into_error(ctx.key(), matched.handler.name()))?;

        let mut response = Response::new();
        if let Some(emission) = emission {
            response.set_payload(emission.payload.clone());
            if ctx.is_active() {
                response.observe = Some(emission.sequence);
            }
        }
        finalize(&mut response, request, &matched.route);
        Ok(response)
    }

    /// Ends a subscription the handler did not turn into a live relation.
    fn settle(&self, ctx: &Arc<ObservationContext>, result: &Result<Response, DispatchError>) {
        match result {
            // a stream is attached; the driver owns the relation now
            Ok(_) if ctx.state() != ObservationState::Subscribing => {}
            Ok(response) => {
                // value handler: no relation is kept, joiners share the value
                ctx.record(Payload::new(response.payload.clone(), response.content_format));
                self.relations.discard(ctx, CloseReason::Completed);
            }
            Err(error) => {
                self.relations.discard(ctx, CloseReason::failed(error));
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.mapping.registry().len())
            .field("relations", &self.relations)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Default success code for the method and the produced content-format.
fn finalize(response: &mut Response, request: &Request, route: &Route) {
    if response.code.is_none() {
        response.code = Some(ResponseCode::default_for(request.method()));
    }
    if response.content_format.is_none() && !response.payload.is_empty() {
        response.content_format = route.produces().single_content_format();
    }
}
