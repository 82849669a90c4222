//! Handler methods and references.
//!
//! # Responsibilities
//! - Wrap an application closure as an opaque callable plus its parameter list
//! - Fix the return kind (single value or stream) when the method is built
//! - Bind a method to a target provider (`HandlerRef`) resolved per dispatch
//! - Group the methods of one handler object under a shared route prefix
//!
//! # Design Decisions
//! - No reflection: the parameter descriptors are declared next to the closure
//! - Targets are obtained through a provider on every dispatch and dropped
//!   when the dispatch ends; nothing caches a live instance

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream, StreamExt};

use crate::error::{BoxError, DispatchError, HandlerError, MappingError};
use crate::handler::argument::{Arguments, Parameter, ParameterType};
use crate::message::{Payload, Response, ResponseCode};
use crate::routing::{Route, RouteSpec};

/// Live handler instance, type-erased.
pub type Target = Arc<dyn Any + Send + Sync>;

pub type TargetProvider = Arc<dyn Fn() -> Result<Target, BoxError> + Send + Sync>;

/// Emissions of a stream-returning handler.
pub type PayloadStream = BoxStream<'static, Result<Payload, HandlerError>>;

type ErrorHook = Arc<dyn Fn(&DispatchError) -> Option<Response> + Send + Sync>;

type CallFuture = BoxFuture<'static, Result<Outcome, CallError>>;

type InvokeFn = Arc<dyn Fn(Target, Arguments) -> CallFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Value,
    Stream,
}

/// What a successful invocation produced.
pub enum Outcome {
    Value(Response),
    Stream(PayloadStream),
}

impl Outcome {
    pub fn return_type(&self) -> ReturnType {
        match self {
            Outcome::Value(_) => ReturnType::Value,
            Outcome::Stream(_) => ReturnType::Stream,
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(response) => f.debug_tuple("Value").field(response).finish(),
            Outcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub(crate) enum CallError {
    WrongTarget(&'static str),
    Failed(HandlerError),
}

/// Conversion of a handler's return value into a response.
pub trait IntoReply {
    fn into_reply(self) -> Response;
}

impl IntoReply for () {
    fn into_reply(self) -> Response {
        Response::new()
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Response {
        self
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Response {
        Response::from(self)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Response {
        Payload::from(self).into_reply()
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Response {
        Payload::from(self).into_reply()
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Response {
        Payload::from(self).into_reply()
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Response {
        Payload::from(self).into_reply()
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Response {
        self.map(IntoReply::into_reply).unwrap_or_default()
    }
}

/// Explicit status plus body.
impl<T: IntoReply> IntoReply for (ResponseCode, T) {
    fn into_reply(self) -> Response {
        let mut response = self.1.into_reply();
        response.code = Some(self.0);
        response
    }
}

/// A callable handler method with its declared parameters.
#[derive(Clone)]
pub struct HandlerMethod {
    name: Arc<str>,
    parameters: Arc<[Parameter]>,
    returns: ReturnType,
    call: InvokeFn,
    error_hook: Option<ErrorHook>,
}

impl HandlerMethod {
    /// A method answering with a single value.
    pub fn value<T, F, Fut, R>(
        name: &str,
        parameters: impl IntoIterator<Item = ParameterType>,
        f: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        let f = Arc::new(f);
        let call: InvokeFn = Arc::new(move |target: Target, args: Arguments| -> CallFuture {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let target = downcast::<T>(target)?;
                let reply = f(target, args).await.map_err(CallError::Failed)?;
                Ok::<_, CallError>(Outcome::Value(reply.into_reply()))
            })
        });
        Self::from_parts(name, parameters, ReturnType::Value, call)
    }

    /// A method answering with a stream of payloads; an observation candidate.
    pub fn stream<T, F, Fut, S>(
        name: &str,
        parameters: impl IntoIterator<Item = ParameterType>,
        f: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, HandlerError>> + Send + 'static,
        S: Stream<Item = Result<Payload, HandlerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let call: InvokeFn = Arc::new(move |target: Target, args: Arguments| -> CallFuture {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let target = downcast::<T>(target)?;
                let stream = f(target, args).await.map_err(CallError::Failed)?;
                Ok::<_, CallError>(Outcome::Stream(stream.boxed()))
            })
        });
        Self::from_parts(name, parameters, ReturnType::Stream, call)
    }

    fn from_parts(
        name: &str,
        parameters: impl IntoIterator<Item = ParameterType>,
        returns: ReturnType,
        call: InvokeFn,
    ) -> Self {
        let parameters = parameters
            .into_iter()
            .enumerate()
            .map(|(index, ty)| Parameter::new(index, ty))
            .collect();
        Self {
            name: name.into(),
            parameters,
            returns,
            call,
            error_hook: None,
        }
    }

    /// Maps dispatch errors of this method to a response of its own choosing.
    pub fn on_error(
        mut self,
        hook: impl Fn(&DispatchError) -> Option<Response> + Send + Sync + 'static,
    ) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn return_type(&self) -> ReturnType {
        self.returns
    }

    pub(crate) fn call(&self, target: Target, args: Arguments) -> CallFuture {
        (self.call)(target, args)
    }

    pub(crate) fn map_error(&self, error: &DispatchError) -> Option<Response> {
        self.error_hook.as_ref().and_then(|hook| hook(error))
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

fn downcast<T: Send + Sync + 'static>(target: Target) -> Result<Arc<T>, CallError> {
    target
        .downcast::<T>()
        .map_err(|_| CallError::WrongTarget(type_name::<T>()))
}

/// A handler method bound to the provider of its target object.
#[derive(Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    target: TargetProvider,
    method: HandlerMethod,
}

impl HandlerRef {
    pub fn new(owner: &str, target: TargetProvider, method: HandlerMethod) -> Self {
        let name = format!("{}#{}", owner, method.name());
        Self {
            name: name.into(),
            target,
            method,
        }
    }

    /// `owner#method`, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &HandlerMethod {
        &self.method
    }

    pub fn resolve_target(&self) -> Result<Target, BoxError> {
        (self.target)()
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef")
            .field("name", &self.name)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// The handler methods of one object, sharing a type-level route.
pub struct Controller {
    name: String,
    mapping: RouteSpec,
    target: TargetProvider,
    methods: Vec<(RouteSpec, HandlerMethod)>,
}

impl Controller {
    /// Controller whose target is obtained from `provider` on every dispatch.
    pub fn new<T, P>(name: impl Into<String>, provider: P) -> Self
    where
        T: Send + Sync + 'static,
        P: Fn() -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let target: TargetProvider = Arc::new(move || provider().map(|t| t as Target));
        Self {
            name: name.into(),
            mapping: RouteSpec::default(),
            target,
            methods: Vec::new(),
        }
    }

    pub fn singleton<T: Send + Sync + 'static>(name: impl Into<String>, instance: Arc<T>) -> Self {
        Self::new(name, move || Ok(Arc::clone(&instance)))
    }

    /// Controller for free functions; handlers receive `Arc<()>`.
    pub fn stateless(name: impl Into<String>) -> Self {
        Self::singleton(name, Arc::new(()))
    }

    /// Type-level route shared by every method.
    pub fn mapping(mut self, spec: RouteSpec) -> Self {
        self.mapping = spec;
        self
    }

    pub fn route(mut self, spec: RouteSpec, method: HandlerMethod) -> Self {
        self.methods.push((spec, method));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Combined routes and handler references, ready for registration.
    pub fn into_routes(self) -> Result<Vec<(Route, HandlerRef)>, MappingError> {
        let base = self.mapping.build()?;
        self.methods
            .into_iter()
            .map(|(spec, method)| {
                let route = base.combine(&spec.build()?);
                let handler = HandlerRef::new(&self.name, Arc::clone(&self.target), method);
                Ok((route, handler))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;

    struct Led;

    #[test]
    fn replies_from_return_values() {
        assert_eq!(().into_reply(), Response::new());
        let reply = (ResponseCode::Created, "made").into_reply();
        assert_eq!(reply.code, Some(ResponseCode::Created));
        assert_eq!(reply.payload_str(), Some("made"));
        assert!(None::<String>.into_reply().payload.is_empty());
    }

    #[test]
    fn controller_combines_type_level_mapping() {
        let method = HandlerMethod::value("set", [ParameterType::PathVariable("id".into())], |_: Arc<Led>, _| async {
            Ok::<_, HandlerError>(())
        });
        let routes = Controller::singleton("led", Arc::new(Led))
            .mapping(RouteSpec::new().path("/led"))
            .route(RouteSpec::new().path("/{id}").method(Method::Put), method)
            .into_routes()
            .unwrap();
        assert_eq!(routes.len(), 1);
        let (route, handler) = &routes[0];
        assert_eq!(route.to_string(), "{[/led/{id}], methods=[PUT]}");
        assert_eq!(handler.name(), "led#set");
        assert_eq!(handler.method().return_type(), ReturnType::Value);
        assert_eq!(handler.method().parameters()[0].index(), 0);
    }

    #[tokio::test]
    async fn wrong_target_type_is_reported() {
        let method = HandlerMethod::value("get", [], |_: Arc<Led>, _| async { Ok::<_, HandlerError>("x") });
        let result = method.call(Arc::new(()) as Target, Arguments::default()).await;
        assert!(matches!(result, Err(CallError::WrongTarget(_))));
    }
}
