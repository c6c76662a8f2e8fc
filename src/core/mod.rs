pub mod error;
pub mod host;
pub mod node;
pub mod orchestrator;
pub mod schema;

/// The alias for serde_json::Value since every payload flows through it.
pub type SignalValue = serde_json::Value;
