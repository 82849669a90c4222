//! Result handlers.
//!
//! The dispatcher hands a handler's outcome to the first result handler, in a
//! fixed priority list, whose `supports` returns true:
//!
//! 1. [`ObservableResultHandler`]: stream outcome of a subscribing request
//! 2. [`StreamResultHandler`]: stream outcome of any other request
//! 3. [`PayloadResultHandler`]: single value

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::dispatch::exchange::Exchange;
use crate::error::{DispatchError, HandlerError};
use crate::handler::Outcome;
use crate::message::Response;
use crate::observe::RelationRegistry;

#[async_trait]
pub trait ResultHandler: Send + Sync {
    fn supports(&self, outcome: &Outcome, exchange: &Exchange) -> bool;

    /// Writes `outcome` into the empty `response`.
    async fn handle_result(
        &self,
        outcome: Outcome,
        exchange: &Exchange,
        response: &mut Response,
    ) -> Result<(), DispatchError>;
}

fn unsupported(exchange: &Exchange, outcome: &Outcome) -> DispatchError {
    DispatchError::HandlerInvocationFailed {
        handler: exchange.handler().to_string(),
        source: HandlerError::new(format!(
            "no result handler for {:?} outcome",
            outcome.return_type()
        )),
    }
}

/// Attaches the stream to the exchange's observation and answers with its
/// first emission.
pub struct ObservableResultHandler {
    relations: Arc<RelationRegistry>,
}

impl ObservableResultHandler {
    pub fn new(relations: Arc<RelationRegistry>) -> Self {
        Self { relations }
    }
}

#[async_trait]
impl ResultHandler for ObservableResultHandler {
    fn supports(&self, outcome: &Outcome, exchange: &Exchange) -> bool {
        matches!(outcome, Outcome::Stream(_)) && exchange.observation().is_some()
    }

    async fn handle_result(
        &self,
        outcome: Outcome,
        exchange: &Exchange,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let Some(observation) = exchange.observation() else {
            return Err(unsupported(exchange, &outcome));
        };
        let stream = match outcome {
            Outcome::Stream(stream) => stream,
            other => return Err(unsupported(exchange, &other)),
        };
        let ctx = observation.context();

        self.relations.attach(ctx, stream)?;
        match ctx.first_result().await {
            Ok(Some(emission)) => {
                response.set_payload(emission.payload.clone());
                if ctx.is_active() {
                    response.observe = Some(emission.sequence);
                }
                Ok(())
            }
            // completed without emitting
            Ok(None) => Ok(()),
            Err(reason) => Err(reason.into_error(ctx.key(), exchange.handler())),
        }
    }
}

/// Answers a non-subscribing request with the stream's first emission.
#[derive(Debug, Default)]
pub struct StreamResultHandler;

#[async_trait]
impl ResultHandler for StreamResultHandler {
    fn supports(&self, outcome: &Outcome, _exchange: &Exchange) -> bool {
        matches!(outcome, Outcome::Stream(_))
    }

    async fn handle_result(
        &self,
        outcome: Outcome,
        exchange: &Exchange,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let mut stream = match outcome {
            Outcome::Stream(stream) => stream,
            other => return Err(unsupported(exchange, &other)),
        };
        match stream.next().await {
            Some(Ok(payload)) => {
                response.set_payload(payload);
                Ok(())
            }
            Some(Err(source)) => Err(DispatchError::HandlerInvocationFailed {
                handler: exchange.handler().to_string(),
                source,
            }),
            None => Ok(()),
        }
    }
}

/// Writes a single value.
#[derive(Debug, Default)]
pub struct PayloadResultHandler;

#[async_trait]
impl ResultHandler for PayloadResultHandler {
    fn supports(&self, outcome: &Outcome, _exchange: &Exchange) -> bool {
        matches!(outcome, Outcome::Value(_))
    }

    async fn handle_result(
        &self,
        outcome: Outcome,
        exchange: &Exchange,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        match outcome {
            Outcome::Value(reply) => {
                *response = reply;
                Ok(())
            }
            other => Err(unsupported(exchange, &other)),
        }
    }
}
