//! Parameter descriptors and resolved argument values.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::dispatch::Exchange;
use crate::error::HandlerError;
use crate::message::{ContentFormat, Request, ResponseCode};
use crate::observe::ObservationHandle;
use crate::routing::PathVariables;

/// Declared type of a handler parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// The request itself (provided).
    Request,
    /// All path variables (provided).
    PathVariables,
    /// The observation of the current exchange, if any (provided).
    Observation,
    /// The exchange; bound by the built-in resolver.
    Exchange,
    /// A single path variable by name.
    PathVariable(String),
    /// Raw payload bytes.
    Payload,
    /// Payload decoded as UTF-8.
    Text,
    /// First value of a request option by name.
    Header(String),
    ContentFormat,
    /// Application type bound by a host-supplied resolver.
    Custom(&'static str),
}

impl ParameterType {
    /// Bound directly from the exchange, without consulting resolvers.
    pub fn is_provided(&self) -> bool {
        matches!(
            self,
            ParameterType::Request | ParameterType::PathVariables | ParameterType::Observation
        )
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Request => f.write_str("Request"),
            ParameterType::PathVariables => f.write_str("PathVariables"),
            ParameterType::Observation => f.write_str("Observation"),
            ParameterType::Exchange => f.write_str("Exchange"),
            ParameterType::PathVariable(name) => write!(f, "PathVariable({name})"),
            ParameterType::Payload => f.write_str("Payload"),
            ParameterType::Text => f.write_str("Text"),
            ParameterType::Header(name) => write!(f, "Header({name})"),
            ParameterType::ContentFormat => f.write_str("ContentFormat"),
            ParameterType::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    index: usize,
    ty: ParameterType,
}

impl Parameter {
    pub fn new(index: usize, ty: ParameterType) -> Self {
        Self { index, ty }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ty(&self) -> &ParameterType {
        &self.ty
    }
}

/// A resolved argument value.
#[derive(Clone)]
pub enum Argument {
    /// The resolver had no value for the parameter.
    Null,
    Exchange(Arc<Exchange>),
    Request(Arc<Request>),
    PathVariables(PathVariables),
    Observation(ObservationHandle),
    Text(String),
    Bytes(Bytes),
    ContentFormat(ContentFormat),
    Value(Arc<dyn Any + Send + Sync>),
}

impl Argument {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Argument::Value(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Argument::Null)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Null => f.write_str("Null"),
            Argument::Exchange(exchange) => write!(f, "Exchange({})", exchange.id()),
            Argument::Request(request) => write!(f, "Request({} {})", request.method(), request.path()),
            Argument::PathVariables(vars) => f.debug_tuple("PathVariables").field(vars).finish(),
            Argument::Observation(handle) => write!(f, "Observation({})", handle.key()),
            Argument::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Argument::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Argument::ContentFormat(format) => f.debug_tuple("ContentFormat").field(format).finish(),
            Argument::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// Extraction of a typed value from an argument.
pub trait FromArgument: Sized {
    fn from_argument(argument: &Argument) -> Option<Self>;
}

impl FromArgument for String {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl FromArgument for Bytes {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Bytes(bytes) => Some(bytes.clone()),
            Argument::Text(text) => Some(Bytes::from(text.clone())),
            _ => None,
        }
    }
}

impl FromArgument for ContentFormat {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::ContentFormat(format) => Some(*format),
            _ => None,
        }
    }
}

impl FromArgument for Arc<Request> {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Request(request) => Some(Arc::clone(request)),
            Argument::Exchange(exchange) => Some(Arc::clone(exchange.request())),
            _ => None,
        }
    }
}

impl FromArgument for Arc<Exchange> {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Exchange(exchange) => Some(Arc::clone(exchange)),
            _ => None,
        }
    }
}

impl FromArgument for PathVariables {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::PathVariables(vars) => Some(vars.clone()),
            _ => None,
        }
    }
}

impl FromArgument for ObservationHandle {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Observation(handle) => Some(handle.clone()),
            _ => None,
        }
    }
}

/// `None` for a null argument instead of an error.
impl<T: FromArgument> FromArgument for Option<T> {
    fn from_argument(argument: &Argument) -> Option<Self> {
        match argument {
            Argument::Null => Some(None),
            other => T::from_argument(other).map(Some),
        }
    }
}

/// Arguments handed to a handler method, in parameter order.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(values: Vec<Argument>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    /// Typed argument at `index`.
    ///
    /// A null argument is a client error (4.00, e.g. a missing option); a
    /// type mismatch is a handler declaration error (5.00).
    pub fn get<T: FromArgument>(&self, index: usize) -> Result<T, HandlerError> {
        let null = Argument::Null;
        let argument = self.values.get(index).unwrap_or(&null);
        if let Some(value) = T::from_argument(argument) {
            return Ok(value);
        }
        if argument.is_null() {
            Err(HandlerError::bad_request(format!("argument {index} is missing")))
        } else {
            Err(HandlerError::with_code(
                ResponseCode::InternalServerError,
                format!("argument {index} is not a {}", type_name::<T>()),
            ))
        }
    }

    /// Payload argument at `index` deserialised from JSON; 4.00 when malformed.
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let bytes: Bytes = self.get(index)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HandlerError::bad_request(format!("malformed JSON payload: {e}")))
    }

    /// Application value bound by a custom resolver.
    pub fn value<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, HandlerError> {
        let mismatch = || {
            HandlerError::with_code(
                ResponseCode::InternalServerError,
                format!("argument {index} is not a {}", type_name::<T>()),
            )
        };
        match self.values.get(index) {
            Some(Argument::Value(value)) => Arc::clone(value).downcast::<T>().map_err(|_| mismatch()),
            None | Some(Argument::Null) => {
                Err(HandlerError::bad_request(format!("argument {index} is missing")))
            }
            Some(_) => Err(mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Colour {
        r: u8,
        g: u8,
        b: u8,
    }

    #[test]
    fn typed_access() {
        let args = Arguments::new(vec![
            Argument::Text("3".into()),
            Argument::Null,
            Argument::Bytes(Bytes::from_static(br#"{"r":1,"g":2,"b":3}"#)),
            Argument::value(42u32),
        ]);
        assert_eq!(args.get::<String>(0).unwrap(), "3");
        assert_eq!(args.get::<Option<String>>(1).unwrap(), None);
        assert_eq!(args.get::<String>(1).unwrap_err().code(), Some(ResponseCode::BadRequest));
        assert_eq!(
            args.get::<ContentFormat>(0).unwrap_err().code(),
            Some(ResponseCode::InternalServerError)
        );
        assert_eq!(args.json::<Colour>(2).unwrap(), Colour { r: 1, g: 2, b: 3 });
        assert_eq!(*args.value::<u32>(3).unwrap(), 42);
        assert!(args.value::<String>(3).is_err());
    }

    #[test]
    fn malformed_json_is_a_client_error() {
        let args = Arguments::new(vec![Argument::Text("not json".into())]);
        let err = args.json::<Colour>(0).unwrap_err();
        assert_eq!(err.code(), Some(ResponseCode::BadRequest));
    }
}
