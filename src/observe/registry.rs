//! Relation registry.
//!
//! # Responsibilities
//! - Own the live observation contexts keyed by (resource, relation)
//! - Decide which request runs the handler for a relation and which ones
//!   join it
//! - Drive attached streams in background tasks and forward emissions to the
//!   notifier
//! - Cancel and remove relations on transport request or shutdown
//!
//! # Data Flow
//! ```text
//! subscribe request → claim()
//!     Owner  → handler runs → attach(stream) → driver task
//!     Joined → wait for / serve the cached emission
//!     Full   → served one-shot
//!
//! driver task:
//!     emission 0      → answers the subscribe request
//!     emission n > 0  → Notifier::notify(key, notification n)
//!     stream end      → Notifier::terminate(key, None)
//!     stream error    → Notifier::terminate(key, error response)
//!
//! transport removal → on_relation_removed() → close + abort driver
//! ```
//!
//! # Design Decisions
//! - DashMap entry locks serialise membership changes per key
//! - Contexts are removed only if they are still the registered instance,
//!   so a late driver never evicts a newer relation for the same key

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;

use crate::error::{DispatchError, HandlerError};
use crate::handler::PayloadStream;
use crate::message::Response;
use crate::observability::metrics;
use crate::observe::context::{CloseReason, ObservationContext, RelationKey};
use crate::observe::notifier::Notifier;

/// Result of claiming a relation for a subscribe request.
#[derive(Debug)]
pub enum Claim {
    /// This request runs the handler.
    Owner(Arc<ObservationContext>),
    /// Another request already runs, or ran, the handler.
    Joined(Arc<ObservationContext>),
    /// The registry is at capacity.
    Full,
}

pub struct RelationRegistry {
    contexts: DashMap<RelationKey, Arc<ObservationContext>>,
    notifier: Arc<dyn Notifier>,
    max_relations: usize,
    expose_errors: bool,
}

impl RelationRegistry {
    pub fn new(notifier: Arc<dyn Notifier>, max_relations: usize) -> Self {
        Self {
            contexts: DashMap::new(),
            notifier,
            max_relations,
            expose_errors: false,
        }
    }

    /// Include diagnostic text in the error response sent when a stream fails.
    pub fn expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, key: &RelationKey) -> Option<Arc<ObservationContext>> {
        self.contexts.get(key).map(|ctx| Arc::clone(ctx.value()))
    }

    /// Transport announced a relation; creates an idle context if none is live.
    pub fn on_relation_added(&self, key: RelationKey) -> Arc<ObservationContext> {
        let ctx = match self.contexts.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(ObservationContext::new(key.clone()));
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                let ctx = ObservationContext::new(key.clone());
                entry.insert(Arc::clone(&ctx));
                ctx
            }
        };
        tracing::debug!(relation = %key, "Relation added");
        metrics::record_active_relations(self.contexts.len());
        ctx
    }

    /// Transport dropped a relation; cancels and removes it.
    pub fn on_relation_removed(&self, key: &RelationKey) -> bool {
        let Some((_, ctx)) = self.contexts.remove(key) else {
            return false;
        };
        let closed = ctx.close(CloseReason::Unsubscribed);
        tracing::debug!(relation = %key, was_live = closed, "Relation removed");
        metrics::record_active_relations(self.contexts.len());
        true
    }

    pub fn claim(&self, key: RelationKey) -> Claim {
        if !self.contexts.contains_key(&key) && self.contexts.len() >= self.max_relations {
            tracing::warn!(
                relation = %key,
                max_relations = self.max_relations,
                "Relation limit reached, serving one-shot"
            );
            return Claim::Full;
        }

        let claim = match self.contexts.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let current = Arc::clone(entry.get());
                if current.is_closed() {
                    let ctx = ObservationContext::new(key.clone());
                    ctx.begin_subscribe();
                    entry.insert(Arc::clone(&ctx));
                    Claim::Owner(ctx)
                } else if current.begin_subscribe() {
                    Claim::Owner(current)
                } else {
                    Claim::Joined(current)
                }
            }
            Entry::Vacant(entry) => {
                let ctx = ObservationContext::new(key.clone());
                ctx.begin_subscribe();
                entry.insert(Arc::clone(&ctx));
                Claim::Owner(ctx)
            }
        };

        match &claim {
            Claim::Owner(_) => tracing::debug!(relation = %key, "Subscribing"),
            Claim::Joined(ctx) => tracing::debug!(relation = %key, state = ?ctx.state(), "Joining relation"),
            Claim::Full => {}
        }
        metrics::record_active_relations(self.contexts.len());
        claim
    }

    /// Attaches the handler's stream and starts driving it.
    ///
    /// Fails if the relation was cancelled while the handler ran; the stream
    /// is dropped unpolled.
    pub fn attach(
        self: &Arc<Self>,
        ctx: &Arc<ObservationContext>,
        stream: PayloadStream,
    ) -> Result<(), DispatchError> {
        if !ctx.activate() {
            tracing::debug!(relation = %ctx.key(), "Relation cancelled while subscribing");
            return Err(DispatchError::ObservationCancelled {
                relation: ctx.key().clone(),
            });
        }
        tracing::debug!(relation = %ctx.key(), "Observation active");

        let registry = Arc::clone(self);
        let driven = Arc::clone(ctx);
        let task = tokio::spawn(async move { registry.drive(driven, stream).await });
        ctx.set_cancel_handle(task.abort_handle());
        Ok(())
    }

    async fn drive(self: Arc<Self>, ctx: Arc<ObservationContext>, mut stream: PayloadStream) {
        let key = ctx.key().clone();
        while let Some(item) = stream.next().await {
            match item {
                Ok(payload) => match ctx.emit(payload.clone()) {
                    // answers the subscribe request itself
                    Some(0) => {}
                    Some(sequence) => {
                        metrics::record_notification();
                        self.notifier
                            .notify(&key, Response::notification(payload, sequence));
                    }
                    None => {
                        tracing::debug!(relation = %key, "Dropping emission for closed relation");
                        return;
                    }
                },
                Err(source) => {
                    self.fail(&ctx, source);
                    return;
                }
            }
        }

        let delivered = ctx.last_result().is_some();
        if self.discard(&ctx, CloseReason::Completed) {
            tracing::debug!(relation = %key, "Observed stream completed");
            if delivered {
                self.notifier.terminate(&key, None);
            }
        }
    }

    fn fail(&self, ctx: &Arc<ObservationContext>, source: HandlerError) {
        let key = ctx.key().clone();
        let delivered = ctx.last_result().is_some();
        let error = DispatchError::StreamFailed {
            relation: key.clone(),
            source,
        };
        if self.discard(ctx, CloseReason::failed(&error)) {
            tracing::warn!(relation = %key, error = %error, "Observed stream failed");
            metrics::record_stream_failure();
            // before the first value the subscribe request reports the failure
            if delivered {
                self.notifier
                    .terminate(&key, Some(error.to_response(self.expose_errors)));
            }
        }
    }

    /// Removes `ctx` if it is still registered and closes it. True if this
    /// call closed it.
    pub(crate) fn discard(&self, ctx: &Arc<ObservationContext>, reason: CloseReason) -> bool {
        self.contexts
            .remove_if(ctx.key(), |_, current| Arc::ptr_eq(current, ctx));
        metrics::record_active_relations(self.contexts.len());
        ctx.close(reason)
    }

    /// Cancels every relation.
    pub fn shutdown(&self) {
        let keys: Vec<RelationKey> = self.contexts.iter().map(|e| e.key().clone()).collect();
        let count = keys.len();
        for key in keys {
            self.on_relation_removed(&key);
        }
        tracing::info!(relations = count, "Relation registry shut down");
    }
}

impl std::fmt::Debug for RelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationRegistry")
            .field("relations", &self.contexts.len())
            .field("max_relations", &self.max_relations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, RelationId};
    use crate::observe::context::ObservationState;
    use crate::observe::notifier::{ChannelNotifier, NoopNotifier, RelationEvent};
    use futures_util::stream;
    use std::time::Duration;

    fn key(relation: &str) -> RelationKey {
        RelationKey::new("/temp", RelationId::new(relation))
    }

    #[test]
    fn second_claim_joins() {
        let registry = RelationRegistry::new(Arc::new(NoopNotifier), 8);
        assert!(matches!(registry.claim(key("a")), Claim::Owner(_)));
        assert!(matches!(registry.claim(key("a")), Claim::Joined(_)));
        assert!(matches!(registry.claim(key("b")), Claim::Owner(_)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn announced_relation_is_claimed_by_first_request() {
        let registry = RelationRegistry::new(Arc::new(NoopNotifier), 8);
        let ctx = registry.on_relation_added(key("a"));
        assert_eq!(ctx.state(), ObservationState::Idle);
        match registry.claim(key("a")) {
            Claim::Owner(owner) => assert!(Arc::ptr_eq(&owner, &ctx)),
            other => panic!("unexpected claim {other:?}"),
        }
    }

    #[test]
    fn full_registry_refuses_new_relations() {
        let registry = RelationRegistry::new(Arc::new(NoopNotifier), 1);
        assert!(matches!(registry.claim(key("a")), Claim::Owner(_)));
        assert!(matches!(registry.claim(key("b")), Claim::Full));
        assert!(matches!(registry.claim(key("a")), Claim::Joined(_)));
    }

    #[test]
    fn removal_cancels() {
        let registry = RelationRegistry::new(Arc::new(NoopNotifier), 8);
        let Claim::Owner(ctx) = registry.claim(key("a")) else {
            panic!("expected owner");
        };
        assert!(registry.on_relation_removed(&key("a")));
        assert!(!registry.on_relation_removed(&key("a")));
        assert_eq!(ctx.state(), ObservationState::Closed(CloseReason::Unsubscribed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn attach_after_cancel_fails() {
        let registry = Arc::new(RelationRegistry::new(Arc::new(NoopNotifier), 8));
        let Claim::Owner(ctx) = registry.claim(key("a")) else {
            panic!("expected owner");
        };
        registry.on_relation_removed(&key("a"));
        let result = registry.attach(&ctx, stream::iter(vec![Ok(Payload::text("x"))]).boxed());
        assert!(matches!(result, Err(DispatchError::ObservationCancelled { .. })));
    }

    #[tokio::test]
    async fn driver_notifies_then_terminates() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let registry = Arc::new(RelationRegistry::new(Arc::new(notifier), 8));
        let Claim::Owner(ctx) = registry.claim(key("a")) else {
            panic!("expected owner");
        };
        let values = vec![Ok(Payload::text("1")), Ok(Payload::text("2")), Ok(Payload::text("3"))];
        registry.attach(&ctx, stream::iter(values).boxed()).unwrap();

        let first = ctx.first_result().await.unwrap().unwrap();
        assert_eq!(first.sequence, 0);

        let mut notified = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                RelationEvent::Notification { response, .. } => notified.push(response.observe),
                RelationEvent::Terminated { response, .. } => {
                    assert!(response.is_none());
                    break;
                }
            }
        }
        assert_eq!(notified, vec![Some(1), Some(2)]);
        assert!(registry.is_empty());
    }
}
