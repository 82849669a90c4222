//! Handler invocation.
//!
//! # Data Flow
//! ```text
//! HandlerRef + Exchange
//!     → resolve target (provider call, per dispatch)
//!     → plan every parameter: provided value or first supporting resolver
//!     → resolve all arguments concurrently (try_join_all)
//!     → call the method, catching panics
//!     → Outcome::Value | Outcome::Stream (polling also catches panics)
//! ```
//!
//! # Design Decisions
//! - Resolver support is checked for every parameter before any resolver
//!   runs, so an unresolvable signature fails without side effects
//! - The handler is never called with a partial argument list

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::try_join_all;
use futures_util::{FutureExt, StreamExt};

use crate::dispatch::Exchange;
use crate::error::{DispatchError, HandlerError};
use crate::handler::argument::{Argument, Arguments, Parameter, ParameterType};
use crate::handler::method::{CallError, HandlerRef, Outcome, PayloadStream};
use crate::handler::resolver::{ArgumentResolver, ExchangeArgumentResolver};

enum Binding<'a> {
    Provided(Argument),
    Resolved(&'a dyn ArgumentResolver, &'a Parameter),
}

pub struct InvocableHandler {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
}

impl InvocableHandler {
    /// `resolvers` run after the built-in exchange resolver, in order.
    pub fn new(resolvers: impl IntoIterator<Item = Arc<dyn ArgumentResolver>>) -> Self {
        let mut chain: Vec<Arc<dyn ArgumentResolver>> = vec![Arc::new(ExchangeArgumentResolver)];
        chain.extend(resolvers);
        Self { resolvers: chain }
    }

    pub fn resolvers(&self) -> &[Arc<dyn ArgumentResolver>] {
        &self.resolvers
    }

    pub async fn invoke(
        &self,
        handler: &HandlerRef,
        exchange: &Arc<Exchange>,
    ) -> Result<Outcome, DispatchError> {
        let target = handler
            .resolve_target()
            .map_err(|source| DispatchError::TargetUnavailable {
                handler: handler.name().to_string(),
                source,
            })?;

        let bindings = handler
            .method()
            .parameters()
            .iter()
            .map(|parameter| self.bind(handler, parameter, exchange))
            .collect::<Result<Vec<_>, _>>()?;

        let arguments = try_join_all(bindings.into_iter().map(|binding| async move {
            match binding {
                Binding::Provided(argument) => Ok::<_, HandlerError>(argument),
                Binding::Resolved(resolver, parameter) => {
                    let resolved = resolver.resolve(parameter, exchange).await?;
                    Ok(resolved.unwrap_or(Argument::Null))
                }
            }
        }))
        .await
        .map_err(|source| DispatchError::HandlerInvocationFailed {
            handler: handler.name().to_string(),
            source,
        })?;

        tracing::debug!(handler = handler.name(), arguments = arguments.len(), "Invoking handler");

        let call = handler.method().call(target, Arguments::new(arguments));
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(Outcome::Stream(stream))) => {
                Ok(Outcome::Stream(catch_stream_panics(handler.name(), stream)))
            }
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(CallError::WrongTarget(expected))) => Err(DispatchError::TargetUnavailable {
                handler: handler.name().to_string(),
                source: format!("target is not a `{expected}`").into(),
            }),
            Ok(Err(CallError::Failed(source))) => {
                tracing::warn!(handler = handler.name(), error = %source, "Handler failed");
                Err(DispatchError::HandlerInvocationFailed {
                    handler: handler.name().to_string(),
                    source,
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(handler = handler.name(), panic = %message, "Handler panicked");
                Err(DispatchError::HandlerInvocationFailed {
                    handler: handler.name().to_string(),
                    source: HandlerError::new(format!("handler panicked: {message}")),
                })
            }
        }
    }

    fn bind<'a>(
        &'a self,
        handler: &HandlerRef,
        parameter: &'a Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Binding<'a>, DispatchError> {
        if let Some(argument) = provided(parameter, exchange) {
            return Ok(Binding::Provided(argument));
        }
        self.resolvers
            .iter()
            .find(|resolver| resolver.supports(parameter))
            .map(|resolver| Binding::Resolved(resolver.as_ref(), parameter))
            .ok_or_else(|| DispatchError::UnresolvableArgument {
                handler: handler.name().to_string(),
                index: parameter.index(),
                declared: parameter.ty().to_string(),
            })
    }
}

impl Default for InvocableHandler {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn provided(parameter: &Parameter, exchange: &Arc<Exchange>) -> Option<Argument> {
    match parameter.ty() {
        ParameterType::Request => Some(Argument::Request(Arc::clone(exchange.request()))),
        ParameterType::PathVariables => Some(Argument::PathVariables(exchange.path_variables().clone())),
        ParameterType::Observation => Some(
            exchange
                .observation()
                .cloned()
                .map(Argument::Observation)
                .unwrap_or(Argument::Null),
        ),
        _ => None,
    }
}

/// A panic while polling `stream` becomes its final item.
fn catch_stream_panics(handler: &str, stream: PayloadStream) -> PayloadStream {
    let handler = handler.to_string();
    AssertUnwindSafe(stream)
        .catch_unwind()
        .map(move |item| match item {
            Ok(item) => item,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(handler = %handler, panic = %message, "Handler stream panicked");
                Err(HandlerError::new(format!("stream panicked: {message}")))
            }
        })
        .boxed()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
