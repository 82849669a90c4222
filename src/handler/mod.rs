//! Handler subsystem: handler methods, their parameters, argument resolution
//! and invocation.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Controller (target provider + RouteSpec per method)
//!     → HandlerRef per method → MappingRegistry
//!
//! Per dispatch:
//!     HandlerMatch.handler + Exchange
//!     → invoke.rs (target, arguments, call)
//!     → Outcome (single value or stream)
//! ```

pub mod argument;
pub mod invoke;
pub mod method;
pub mod resolver;

pub use argument::{Argument, Arguments, FromArgument, Parameter, ParameterType};
pub use invoke::InvocableHandler;
pub use method::{
    Controller, HandlerMethod, HandlerRef, IntoReply, Outcome, PayloadStream, ReturnType, Target,
    TargetProvider,
};
pub use resolver::{
    standard_resolvers, ArgumentResolver, ContentFormatArgumentResolver, ExchangeArgumentResolver,
    HeaderArgumentResolver, PathVariableArgumentResolver, PayloadArgumentResolver,
};
