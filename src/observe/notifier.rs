//! Transport callbacks for observe relations.

use tokio::sync::mpsc;

use crate::message::Response;
use crate::observe::context::RelationKey;

/// Implemented by the transport adapter to push notifications.
///
/// Calls for one relation arrive in emission order. Implementations must not
/// block; queue the response and return.
pub trait Notifier: Send + Sync + 'static {
    /// A new value on an active relation.
    fn notify(&self, key: &RelationKey, notification: Response);

    /// The relation ended on the server side; `last` is the final response to
    /// send, if any (an error response when the stream failed).
    fn terminate(&self, key: &RelationKey, last: Option<Response>);
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _key: &RelationKey, _notification: Response) {}

    fn terminate(&self, _key: &RelationKey, _last: Option<Response>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEvent {
    Notification {
        key: RelationKey,
        response: Response,
    },
    Terminated {
        key: RelationKey,
        response: Option<Response>,
    },
}

impl RelationEvent {
    pub fn key(&self) -> &RelationKey {
        match self {
            RelationEvent::Notification { key, .. } | RelationEvent::Terminated { key, .. } => key,
        }
    }
}

/// Forwards relation events to a channel drained by the transport task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<RelationEvent>,
}

impl ChannelNotifier {
    /// Returns the notifier and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: RelationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Relation event receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, key: &RelationKey, notification: Response) {
        self.send(RelationEvent::Notification {
            key: key.clone(),
            response: notification,
        });
    }

    fn terminate(&self, key: &RelationKey, last: Option<Response>) {
        self.send(RelationEvent::Terminated {
            key: key.clone(),
            response: last,
        });
    }
}
