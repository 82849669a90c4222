//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request (from the transport adapter)
//!     → dispatcher.rs: HandlerMapping::lookup
//!         none → NoHandler (4.04 / 4.05 / 4.06 / 4.15)
//!     → observe flag? claim relation (owner / joiner / one-shot)
//!     → InvocableHandler::invoke → Outcome
//!     → result.rs: first supporting result handler writes the Response
//!     → default code + content-format
//!     → Response (to the transport adapter)
//! ```

pub mod dispatcher;
pub mod exchange;
pub mod result;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use exchange::Exchange;
pub use result::{
    ObservableResultHandler, PayloadResultHandler, ResultHandler, StreamResultHandler,
};
