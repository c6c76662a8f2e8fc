//! # nodewire
//!
//! A component/signal runtime for building interactive scenes: node
//! components expose typed input handlers and typed output signals, and
//! an orchestrator wires them together from configuration without the
//! components knowing about each other.
//!
//! ## Features
//!
//! - **Isolated instances**: private per-instance state lives in closure
//!   captures and private fields, never on the public surface
//! - **Schema-checked signals**: every output signal carries a declared
//!   payload contract, validated with full error accumulation
//! - **Data-driven wiring**: who talks to whom is configuration, with
//!   named modes that atomically swap the whole routing graph
//! - **Fault containment**: handler failures, payload rejects, and
//!   wiring cycles are reported through Err channels, never thrown
//!   across a `fire` boundary
//!
//! ## Quick Start
//!
//! ```rust
//! use nodewire::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), nodewire::ClassError> {
//! // Declare the component classes.
//! let pinger = NodeClass::define(
//!     "Pinger",
//!     "demo",
//!     None,
//!     NodeDef::new().output("ping", Schema::new()),
//! )?;
//! let ponger = NodeClass::define(
//!     "Ponger",
//!     "demo",
//!     None,
//!     NodeDef::new().input("on_ping", |ctx, data| {
//!         ctx.set_attribute("last", data.clone());
//!         Ok(())
//!     }),
//! )?;
//!
//! // Register, wire, enable.
//! let mut orch = Orchestrator::new();
//! orch.register_class(pinger);
//! orch.register_class(ponger);
//! orch.on_add_node("A", "Pinger", &json!({}))?;
//! orch.on_add_node("B", "Ponger", &json!({}))?;
//!
//! let mut wiring = WiringSet::new();
//! wiring.insert(
//!     SignalKey::new("A", "ping"),
//!     vec![WiringTarget::new("B", "on_ping")],
//! );
//! orch.on_configure(wiring, Default::default());
//! orch.on_enable();
//!
//! // Firing on A synchronously reaches B.
//! let a = orch.get_node("A").unwrap();
//! a.borrow_mut().fire("ping", &json!({ "n": 1 }));
//! let b = orch.get_node("B").unwrap();
//! assert_eq!(b.borrow().get_attribute("last"), Some(&json!({ "n": 1 })));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`schema`](core::schema): field specs, schemas, and the validation
//!   engine
//! - [`node`](core::node): class declaration, instances, and the
//!   In/Out/Err channels
//! - [`orchestrator`](core::orchestrator): registry, wiring graph, and
//!   routing
//! - [`host`](core::host): interfaces to external collaborators (pools,
//!   scheduler, resource handles)
//! - [`prelude`]: commonly used types (import with `use nodewire::prelude::*`)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

pub use core::SignalValue;

// Errors and faults
pub use core::error::{ClassError, FaultReason, FaultReport, HandlerError};

// Schema engine
pub use core::schema::validator::{
    merge_schemas, sanitize, validate, validate_and_process, validate_field, validate_schema,
    validate_sender,
};
pub use core::schema::{Constraint, CustomValidator, FieldSpec, FieldType, Schema, ValidationReport};

// Node runtime
pub use core::node::{
    DefFactory, ErrChannel, InHandler, NodeClass, NodeCtx, NodeDef, NodeInstance, OutChannel,
    SignalRouter, SysHandler, SysHandlers,
};

// Orchestrator
pub use core::orchestrator::wiring::{SignalKey, Transform, WiringSet, WiringTarget, overlay};
pub use core::orchestrator::{MAX_DISPATCH_DEPTH, Orchestrator};

// Host interfaces
pub use core::host::{NodePool, PoolStats, ResourceHandle, Scheduler, TaskHandle};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: everything needed to declare classes, build wiring,
/// and drive an orchestrator.
///
/// # Example
/// ```rust
/// use nodewire::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        ClassError,
        Constraint,
        FaultReason,
        FaultReport,
        FieldSpec,
        FieldType,
        HandlerError,
        // Node runtime
        NodeClass,
        NodeCtx,
        NodeDef,
        NodeInstance,
        // Orchestrator
        Orchestrator,
        // Schema engine
        Schema,
        SignalKey,
        SignalValue,
        ValidationReport,
        WiringSet,
        WiringTarget,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
