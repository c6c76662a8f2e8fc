//! Fault taxonomy for the runtime.
//!
//! Nothing in this crate throws across a `fire` boundary: every runtime
//! fault is wrapped in a [`FaultReport`] and surfaced through an `Err`
//! channel with a stable `reason` tag and a human-readable message.
//!
//! | Reason | Tag | When |
//! |--------|-----|------|
//! | [`ConfigurationError`](FaultReason::ConfigurationError) | `configuration-error` | malformed schema or dangling wiring reference |
//! | [`ValidationError`](FaultReason::ValidationError) | `validation-error` | a signal payload fails its declared schema |
//! | [`HandlerFault`](FaultReason::HandlerFault) | `handler-fault` | a routed target handler returned an error |
//! | [`RoutingCycle`](FaultReason::RoutingCycle) | `routing-cycle` | the dispatch recursion guard tripped |
//! | [`LifecycleFault`](FaultReason::LifecycleFault) | `lifecycle-fault` | tolerated misuse (handler before init, double stop) |

use crate::core::SignalValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable tag identifying the kind of a reported fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultReason {
    ConfigurationError,
    ValidationError,
    HandlerFault,
    RoutingCycle,
    LifecycleFault,
}

impl FaultReason {
    /// The wire tag, identical to the serde representation.
    pub fn tag(&self) -> &'static str {
        match self {
            FaultReason::ConfigurationError => "configuration-error",
            FaultReason::ValidationError => "validation-error",
            FaultReason::HandlerFault => "handler-fault",
            FaultReason::RoutingCycle => "routing-cycle",
            FaultReason::LifecycleFault => "lifecycle-fault",
        }
    }
}

/// A locally recoverable failure, as delivered on an `Err` channel.
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub reason: FaultReason,
    pub message: String,
    /// Routing context (source, signal, target) when the fault happened
    /// inside a dispatch chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<SignalValue>,
}

impl FaultReport {
    pub fn new(reason: FaultReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: SignalValue) -> Self {
        self.context = Some(context);
        self
    }
}

/// Error raised while declaring a class or constructing an instance.
///
/// These are programming/configuration mistakes and are rejected eagerly,
/// at `define()` or `instantiate()` time, instead of surfacing later as
/// confusing dispatch failures.
#[derive(Debug, Error)]
pub enum ClassError {
    #[error("out signal '{signal}' on class '{class}' has a malformed schema: {detail}")]
    MalformedOutSchema {
        class: String,
        signal: String,
        detail: String,
    },

    #[error("err schema on class '{class}' is malformed: {detail}")]
    MalformedErrSchema { class: String, detail: String },

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("node id '{0}' is already registered")]
    DuplicateId(String),
}

/// Opaque failure carried across the dispatch fault boundary.
///
/// An `In` handler that cannot complete returns this; the router catches
/// it, reports a `handler-fault`, and keeps dispatching siblings.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
