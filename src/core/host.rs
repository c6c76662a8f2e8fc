//! Interfaces to external collaborators.
//!
//! The runtime never drives timers, pools instances, or inspects engine
//! resources itself; the host supplies those. Only the contracts live
//! here.

use crate::core::SignalValue;
use crate::core::node::NodeInstance;
use serde_json::json;
use std::time::Duration;

/// Opaque engine resource token some nodes wrap.
///
/// Encoded in payloads as `{"$resource": <token>}` so schema fields of
/// type `resource` can carry it; the runtime never looks past the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    pub fn token(&self) -> u64 {
        self.0
    }

    pub fn as_value(&self) -> SignalValue {
        json!({ "$resource": self.0 })
    }

    pub fn from_value(value: &SignalValue) -> Option<Self> {
        value.get("$resource")?.as_u64().map(Self)
    }
}

/// Occupancy counters reported by a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub total: usize,
}

/// Object pool that pre-allocates node instances per class.
pub trait NodePool {
    /// Takes an idle instance of `class` out of the pool, if one exists.
    fn checkout(&mut self, class: &str) -> Option<NodeInstance>;

    /// Returns an instance to the pool. The pool owns stopping/resetting
    /// it.
    fn release(&mut self, instance: NodeInstance);

    fn stats(&self) -> PoolStats;
}

/// Handle identifying one recurring callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Host-provided recurring callback driver.
///
/// Nodes that need periodic behavior subscribe in `Sys.on_start` and
/// cancel in `Sys.on_stop`; the tick callback must poll its own liveness
/// flag rather than rely on cancellation signaling.
pub trait Scheduler {
    /// Invokes `tick` every `period` until the handle is cancelled.
    fn repeat(&mut self, period: Duration, tick: Box<dyn FnMut()>) -> TaskHandle;

    fn cancel(&mut self, handle: TaskHandle);
}
