//! Argument resolvers.
//!
//! A resolver binds one kind of handler parameter from the exchange. The
//! invocable handler consults resolvers in order and uses the first one whose
//! `supports` returns true.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::Exchange;
use crate::error::HandlerError;
use crate::handler::argument::{Argument, Parameter, ParameterType};

#[async_trait]
pub trait ArgumentResolver: Send + Sync {
    fn supports(&self, parameter: &Parameter) -> bool;

    /// `Ok(None)` binds a null argument.
    async fn resolve(
        &self,
        parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError>;
}

/// Binds the exchange itself. Always installed first.
#[derive(Debug, Default)]
pub struct ExchangeArgumentResolver;

#[async_trait]
impl ArgumentResolver for ExchangeArgumentResolver {
    fn supports(&self, parameter: &Parameter) -> bool {
        *parameter.ty() == ParameterType::Exchange
    }

    async fn resolve(
        &self,
        _parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError> {
        Ok(Some(Argument::Exchange(Arc::clone(exchange))))
    }
}

#[derive(Debug, Default)]
pub struct PathVariableArgumentResolver;

#[async_trait]
impl ArgumentResolver for PathVariableArgumentResolver {
    fn supports(&self, parameter: &Parameter) -> bool {
        matches!(parameter.ty(), ParameterType::PathVariable(_))
    }

    async fn resolve(
        &self,
        parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError> {
        let ParameterType::PathVariable(name) = parameter.ty() else {
            return Ok(None);
        };
        Ok(exchange
            .path_variables()
            .get(name)
            .map(|value| Argument::Text(value.to_string())))
    }
}

/// Payload as bytes or UTF-8 text. An empty payload binds null.
#[derive(Debug, Default)]
pub struct PayloadArgumentResolver;

#[async_trait]
impl ArgumentResolver for PayloadArgumentResolver {
    fn supports(&self, parameter: &Parameter) -> bool {
        matches!(parameter.ty(), ParameterType::Payload | ParameterType::Text)
    }

    async fn resolve(
        &self,
        parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError> {
        let payload = exchange.request().payload();
        if payload.is_empty() {
            return Ok(None);
        }
        match parameter.ty() {
            ParameterType::Text => {
                let text = std::str::from_utf8(payload)
                    .map_err(|_| HandlerError::bad_request("payload is not valid UTF-8"))?;
                Ok(Some(Argument::Text(text.to_string())))
            }
            _ => Ok(Some(Argument::Bytes(payload.clone()))),
        }
    }
}

#[derive(Debug, Default)]
pub struct HeaderArgumentResolver;

#[async_trait]
impl ArgumentResolver for HeaderArgumentResolver {
    fn supports(&self, parameter: &Parameter) -> bool {
        matches!(parameter.ty(), ParameterType::Header(_))
    }

    async fn resolve(
        &self,
        parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError> {
        let ParameterType::Header(name) = parameter.ty() else {
            return Ok(None);
        };
        Ok(exchange
            .request()
            .headers()
            .get(name)
            .map(|value| Argument::Text(value.to_string())))
    }
}

#[derive(Debug, Default)]
pub struct ContentFormatArgumentResolver;

#[async_trait]
impl ArgumentResolver for ContentFormatArgumentResolver {
    fn supports(&self, parameter: &Parameter) -> bool {
        *parameter.ty() == ParameterType::ContentFormat
    }

    async fn resolve(
        &self,
        _parameter: &Parameter,
        exchange: &Arc<Exchange>,
    ) -> Result<Option<Argument>, HandlerError> {
        Ok(exchange.request().content_format().map(Argument::ContentFormat))
    }
}

/// Path variable, payload, header and content-format resolvers.
pub fn standard_resolvers() -> Vec<Arc<dyn ArgumentResolver>> {
    vec![
        Arc::new(PathVariableArgumentResolver),
        Arc::new(PayloadArgumentResolver),
        Arc::new(HeaderArgumentResolver),
        Arc::new(ContentFormatArgumentResolver),
    ]
}
