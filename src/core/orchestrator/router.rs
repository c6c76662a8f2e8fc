//! The live dispatch path: validates a fired signal's payload, then
//! walks the ordered target list inside a fault boundary.

use super::wiring::{SignalKey, WiringSet};
use super::{SharedNodes, SharedSchemas};
use crate::core::SignalValue;
use crate::core::error::{FaultReason, FaultReport};
use crate::core::node::{ErrChannel, NodeInstance, SignalRouter};
use crate::core::schema::{Schema, validator};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Bound on nested routed dispatches. A wiring cycle trips this instead
/// of recursing unboundedly.
pub const MAX_DISPATCH_DEPTH: usize = 16;

/// One router instance is shared by every wired source node of the
/// active graph; it carries the materialized rules, shared handles to
/// the registry and schema table, a shared dispatch-depth counter, and
/// the orchestrator's Err channel as fault sink.
pub(crate) struct WiringRouter {
    rules: RefCell<WiringSet>,
    nodes: SharedNodes,
    schemas: SharedSchemas,
    depth: Cell<usize>,
    err: Rc<RefCell<ErrChannel>>,
}

impl WiringRouter {
    pub(crate) fn new(
        rules: WiringSet,
        nodes: SharedNodes,
        schemas: SharedSchemas,
        err: Rc<RefCell<ErrChannel>>,
    ) -> Self {
        Self {
            rules: RefCell::new(rules),
            nodes,
            schemas,
            depth: Cell::new(0),
            err,
        }
    }

    /// Drops every rule sourced at `id` from the live graph; used for
    /// incremental unwiring when a node is removed while enabled.
    pub(crate) fn remove_source(&self, id: &str) {
        self.rules.borrow_mut().retain(|key, _| key.node != id);
    }

    /// Reinstates rules in the live graph; used for incremental wiring
    /// when a node is added while enabled.
    pub(crate) fn add_rules(&self, rules: WiringSet) {
        self.rules.borrow_mut().extend(rules);
    }

    fn report(&self, reason: FaultReason, message: String, context: SignalValue) {
        self.err
            .borrow_mut()
            .fire(FaultReport::new(reason, message).with_context(context));
    }

    fn lookup(&self, id: &str) -> Option<Rc<RefCell<NodeInstance>>> {
        self.nodes.borrow().get(id).cloned()
    }

    fn schema_for(&self, source: &str, signal: &str) -> Option<Schema> {
        self.schemas
            .borrow()
            .get(source)
            .and_then(|out| out.get(signal))
            .cloned()
    }
}

impl SignalRouter for WiringRouter {
    fn route(&self, source: &str, signal: &str, data: &SignalValue) {
        let key = SignalKey::new(source, signal);
        // Snapshot the target list so a handler that rewires mid-dispatch
        // cannot invalidate the iteration.
        let Some(targets) = self.rules.borrow().get(&key).cloned() else {
            return;
        };

        let depth = self.depth.get();
        if depth >= MAX_DISPATCH_DEPTH {
            self.report(
                FaultReason::RoutingCycle,
                format!("dispatch depth exceeded {MAX_DISPATCH_DEPTH} while routing '{key}'"),
                json!({ "source": source, "signal": signal }),
            );
            return;
        }
        self.depth.set(depth + 1);

        // Local listeners already ran inside fire(); the schema guards
        // only the routed path.
        if let Some(schema) = self.schema_for(source, signal) {
            let check = validator::validate(data, &schema);
            if !check.ok() {
                self.report(
                    FaultReason::ValidationError,
                    format!("signal '{key}' payload rejected, routing skipped: {}", check.format()),
                    json!({ "source": source, "signal": signal }),
                );
                self.depth.set(depth);
                return;
            }
        }

        for target in &targets {
            let context = json!({
                "source": source,
                "signal": signal,
                "target": target.node,
                "handler": target.handler,
            });
            let Some(node) = self.lookup(&target.node) else {
                self.report(
                    FaultReason::ConfigurationError,
                    format!(
                        "route '{key}' -> '{}.{}': target node is gone",
                        target.node, target.handler
                    ),
                    context,
                );
                continue;
            };
            let payload = match &target.transform {
                Some(transform) => transform(data.clone()),
                None => data.clone(),
            };
            match node.try_borrow_mut() {
                Ok(mut node) => {
                    if let Err(fault) = node.handle(&target.handler, &payload) {
                        self.report(
                            FaultReason::HandlerFault,
                            format!(
                                "route '{key}' -> '{}.{}' failed: {fault}",
                                target.node, target.handler
                            ),
                            context,
                        );
                    }
                }
                // The target is already dispatching further up this very
                // stack: re-entrant wiring.
                Err(_) => {
                    self.report(
                        FaultReason::RoutingCycle,
                        format!(
                            "route '{key}' -> '{}.{}' re-enters a node that is still dispatching",
                            target.node, target.handler
                        ),
                        context,
                    );
                }
            }
        }

        self.depth.set(depth);
    }
}
