//! Per-relation observation state.
//!
//! # Responsibilities
//! - Track one relation through Idle → Subscribing → Active → Closed
//! - Cache the most recent emission for lock-free reads
//! - Hold the cancel handle of the background stream, set at most once
//! - Let concurrent requests wait for the first emission
//!
//! # Design Decisions
//! - Every transition goes through `watch::Sender::send_if_modified`, which
//!   serialises writers for this relation; readers of `last_result` never lock
//! - An emission is stored and numbered under the same transition, so a
//!   cancelled relation can never record a late value
//! - Aborting the stream is guarded by a flag so it happens exactly once no
//!   matter whether cancellation or the handle arrives first

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{DispatchError, HandlerError};
use crate::message::{Payload, RelationId, ResponseCode};

/// Relation registry key: resource path plus subscriber relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKey {
    resource: String,
    relation: RelationId,
}

impl RelationKey {
    pub fn new(resource: impl Into<String>, relation: RelationId) -> Self {
        Self {
            resource: resource.into(),
            relation,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn relation(&self) -> &RelationId {
        &self.relation
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.relation, self.resource)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationState {
    /// Announced by the transport, no subscribe request served yet.
    Idle,
    /// The handler is running for the first subscribe request.
    Subscribing,
    /// The stream is attached; `emitted` values were recorded so far.
    Active { emitted: u32 },
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscriber deregistered or the transport dropped the relation.
    Unsubscribed,
    /// The stream ended, or a value handler answered once.
    Completed,
    /// The handler or the stream failed.
    Failed {
        code: ResponseCode,
        message: String,
        stream: bool,
    },
}

impl CloseReason {
    pub fn failed(error: &DispatchError) -> Self {
        let message = match error {
            DispatchError::HandlerInvocationFailed { source, .. }
            | DispatchError::StreamFailed { source, .. } => source.message().to_string(),
            other => other.to_string(),
        };
        CloseReason::Failed {
            code: error.response_code(),
            message,
            stream: matches!(error, DispatchError::StreamFailed { .. }),
        }
    }

    /// The error a request waiting on this relation is answered with.
    pub fn into_error(self, key: &RelationKey, handler: &str) -> DispatchError {
        match self {
            CloseReason::Failed {
                code,
                message,
                stream: true,
            } => DispatchError::StreamFailed {
                relation: key.clone(),
                source: HandlerError::with_code(code, message),
            },
            CloseReason::Failed { code, message, .. } => DispatchError::HandlerInvocationFailed {
                handler: handler.to_string(),
                source: HandlerError::with_code(code, message),
            },
            CloseReason::Unsubscribed | CloseReason::Completed => {
                DispatchError::ObservationCancelled {
                    relation: key.clone(),
                }
            }
        }
    }
}

/// One recorded stream value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub payload: Payload,
    pub sequence: u32,
}

pub struct ObservationContext {
    key: RelationKey,
    state: watch::Sender<ObservationState>,
    last_result: ArcSwapOption<Emission>,
    first: OnceLock<Arc<Emission>>,
    cancel_handle: OnceLock<AbortHandle>,
    aborted: AtomicBool,
}

impl ObservationContext {
    pub fn new(key: RelationKey) -> Arc<Self> {
        let (state, _) = watch::channel(ObservationState::Idle);
        Arc::new(Self {
            key,
            state,
            last_result: ArcSwapOption::empty(),
            first: OnceLock::new(),
            cancel_handle: OnceLock::new(),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &RelationKey {
        &self.key
    }

    pub fn state(&self) -> ObservationState {
        self.state.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), ObservationState::Closed(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.borrow(), ObservationState::Active { .. })
    }

    /// Most recent emission, without locking.
    pub fn last_result(&self) -> Option<Arc<Emission>> {
        self.last_result.load_full()
    }

    /// Idle → Subscribing. False if another request already claimed the relation.
    pub(crate) fn begin_subscribe(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            ObservationState::Idle => {
                *state = ObservationState::Subscribing;
                true
            }
            _ => false,
        })
    }

    /// Subscribing → Active. False if the relation was closed meanwhile.
    pub(crate) fn activate(&self) -> bool {
        self.state.send_if_modified(|state| match state {
            ObservationState::Subscribing => {
                *state = ObservationState::Active { emitted: 0 };
                true
            }
            _ => false,
        })
    }

    pub(crate) fn set_cancel_handle(&self, handle: AbortHandle) {
        if self.cancel_handle.set(handle).is_err() {
            tracing::warn!(relation = %self.key, "Cancel handle already set");
            return;
        }
        // closed before the handle arrived
        if self.is_closed() {
            self.abort();
        }
    }

    /// Records an emission and returns its sequence number; `None` once closed.
    pub(crate) fn emit(&self, payload: Payload) -> Option<u32> {
        let mut sequence = None;
        self.state.send_if_modified(|state| match state {
            ObservationState::Active { emitted } => {
                let seq = *emitted;
                self.store(Emission {
                    payload,
                    sequence: seq,
                });
                *emitted = seq.wrapping_add(1);
                sequence = Some(seq);
                true
            }
            _ => false,
        });
        sequence
    }

    /// Records the single value of a value handler so joiners can share it.
    pub(crate) fn record(&self, payload: Payload) {
        self.state.send_if_modified(|state| {
            if !matches!(state, ObservationState::Closed(_)) {
                self.store(Emission {
                    payload,
                    sequence: 0,
                });
            }
            false
        });
    }

    fn store(&self, emission: Emission) {
        let emission = Arc::new(emission);
        if emission.sequence == 0 {
            let _ = self.first.set(Arc::clone(&emission));
        }
        self.last_result.store(Some(emission));
    }

    /// Moves to Closed and stops the stream. True if this call closed it.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        let closed = self.state.send_if_modified(|state| match state {
            ObservationState::Closed(_) => false,
            _ => {
                *state = ObservationState::Closed(reason);
                true
            }
        });
        if closed {
            tracing::debug!(relation = %self.key, state = ?self.state(), "Observation closed");
            self.abort();
        }
        closed
    }

    fn abort(&self) {
        if let Some(handle) = self.cancel_handle.get() {
            if !self.aborted.swap(true, Ordering::AcqRel) {
                handle.abort();
            }
        }
    }

    /// Waits until a first value exists or the relation closes.
    async fn settled(&self) -> ObservationState {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|state| match state {
                ObservationState::Active { emitted } => *emitted > 0,
                ObservationState::Closed(_) => true,
                _ => false,
            })
            .await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => ObservationState::Closed(CloseReason::Unsubscribed),
        }
    }

    /// The first emission, for the request that subscribed.
    ///
    /// `Ok(None)` means the relation completed without a value. A relation
    /// cancelled before this call returns fails even if a value had arrived.
    pub async fn first_result(&self) -> Result<Option<Arc<Emission>>, CloseReason> {
        match self.settled().await {
            ObservationState::Closed(reason @ CloseReason::Unsubscribed)
            | ObservationState::Closed(reason @ CloseReason::Failed { .. }) => Err(reason),
            _ => Ok(self.first.get().cloned()),
        }
    }

    /// The most recent emission, for requests joining a relation.
    pub async fn latest_result(&self) -> Result<Option<Arc<Emission>>, CloseReason> {
        if let Some(emission) = self.last_result() {
            return Ok(Some(emission));
        }
        match self.settled().await {
            ObservationState::Closed(reason @ CloseReason::Failed { .. }) => Err(reason),
            ObservationState::Closed(CloseReason::Completed) => Ok(self.last_result()),
            ObservationState::Closed(reason) => self.last_result().map(Some).ok_or(reason),
            _ => Ok(self.last_result()),
        }
    }
}

impl fmt::Debug for ObservationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationContext")
            .field("key", &self.key)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Read-only view of an observation, handed to handlers.
#[derive(Debug, Clone)]
pub struct ObservationHandle {
    context: Arc<ObservationContext>,
}

impl ObservationHandle {
    pub(crate) fn new(context: Arc<ObservationContext>) -> Self {
        Self { context }
    }

    pub(crate) fn context(&self) -> &Arc<ObservationContext> {
        &self.context
    }

    pub fn key(&self) -> &RelationKey {
        self.context.key()
    }

    pub fn state(&self) -> ObservationState {
        self.context.state()
    }

    pub fn last_result(&self) -> Option<Arc<Emission>> {
        self.context.last_result()
    }
}
