//! Declarative wiring: which source signal reaches which target
//! handlers, and how mode overlays compose.

use crate::core::SignalValue;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Optional payload rewrite applied per target before dispatch.
pub type Transform = Rc<dyn Fn(SignalValue) -> SignalValue>;

/// Identifies one `(source node, signal)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SignalKey {
    pub node: String,
    pub signal: String,
}

impl SignalKey {
    pub fn new(node: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            signal: signal.into(),
        }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.signal)
    }
}

impl FromStr for SignalKey {
    type Err = String;

    /// Parses `"node.signal"`; the last dot splits, so node ids may
    /// themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((node, signal)) if !node.is_empty() && !signal.is_empty() => {
                Ok(Self::new(node, signal))
            }
            _ => Err(format!("'{s}' is not of the form 'node.signal'")),
        }
    }
}

/// One routing destination: a target node's input handler, optionally
/// behind a payload transform.
#[derive(Clone)]
pub struct WiringTarget {
    pub node: String,
    pub handler: String,
    pub transform: Option<Transform>,
}

impl WiringTarget {
    pub fn new(node: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            handler: handler.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Fn(SignalValue) -> SignalValue + 'static) -> Self {
        self.transform = Some(Rc::new(transform));
        self
    }
}

impl fmt::Debug for WiringTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiringTarget")
            .field("node", &self.node)
            .field("handler", &self.handler)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// The full rule collection for one graph (default or one mode).
/// Targets fire in declared order; `BTreeMap` keeps wiring iteration
/// deterministic.
pub type WiringSet = BTreeMap<SignalKey, Vec<WiringTarget>>;

/// Materializes the active graph for a mode: the mode's rule list
/// replaces the default list for every key it defines; untouched keys
/// fall through to the default set.
pub fn overlay(default: &WiringSet, mode: Option<&WiringSet>) -> WiringSet {
    let mut merged = default.clone();
    if let Some(mode) = mode {
        for (key, targets) in mode {
            merged.insert(key.clone(), targets.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parses_and_displays() {
        let key: SignalKey = "A.ping".parse().unwrap();
        assert_eq!(key, SignalKey::new("A", "ping"));
        assert_eq!(key.to_string(), "A.ping");

        let dotted: SignalKey = "room.door_1.opened".parse().unwrap();
        assert_eq!(dotted.node, "room.door_1");
        assert_eq!(dotted.signal, "opened");

        assert!("nodot".parse::<SignalKey>().is_err());
        assert!(".sig".parse::<SignalKey>().is_err());
        assert!("node.".parse::<SignalKey>().is_err());
    }

    #[test]
    fn overlay_replaces_per_key_not_per_target() {
        let mut default = WiringSet::new();
        default.insert(
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("B", "on_ping"), WiringTarget::new("C", "on_ping")],
        );
        default.insert(
            SignalKey::new("A", "pong"),
            vec![WiringTarget::new("B", "on_pong")],
        );

        let mut alt = WiringSet::new();
        alt.insert(
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("D", "on_ping")],
        );

        let merged = overlay(&default, Some(&alt));
        // Replaced wholesale, not appended.
        assert_eq!(merged[&SignalKey::new("A", "ping")].len(), 1);
        assert_eq!(merged[&SignalKey::new("A", "ping")][0].node, "D");
        // Untouched key falls through.
        assert_eq!(merged[&SignalKey::new("A", "pong")][0].node, "B");
    }

    #[test]
    fn overlay_without_mode_is_the_default() {
        let mut default = WiringSet::new();
        default.insert(
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("B", "on_ping")],
        );
        let merged = overlay(&default, None);
        assert_eq!(merged.len(), 1);
    }
}
