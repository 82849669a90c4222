//! Request dispatcher for a constrained-device RPC protocol.
//!
//! Routes requests to registered handler methods by path, method, option,
//! content-format and accept conditions, invokes them asynchronously, and
//! keeps observe relations that stream successive results to subscribers.
//!
//! ```text
//! transport adapter → Dispatcher → HandlerMapping → InvocableHandler
//!                                                   → ResultHandler → Response
//!                                                   → RelationRegistry → Notifier
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod observability;
pub mod observe;
pub mod routing;

pub use config::DispatcherConfig;
pub use dispatch::{Dispatcher, DispatcherBuilder, Exchange};
pub use error::{DispatchError, HandlerError, MappingError};
pub use handler::{Arguments, Controller, HandlerMethod, HandlerRef, ParameterType};
pub use message::{ContentFormat, Method, Observe, Payload, RelationId, Request, Response, ResponseCode};
pub use observe::{ChannelNotifier, NoopNotifier, Notifier, RelationEvent, RelationKey};
pub use routing::{Route, RouteSpec};
