//! The orchestrator: a registry of live node instances plus the
//! data-driven wiring graph that routes signals between them.
//!
//! This is the only place that knows which component talks to which;
//! instances never hold references to each other. Routing is installed
//! by swapping each wired source's router slot, and removed by putting
//! the saved previous router back; instance data is never rewritten in
//! place.
//!
//! State machine: `Unconfigured -> Configured -> Enabled <-> Disabled`.
//! `on_set_mode` is legal while enabled or disabled and preserves
//! whichever it was; `on_add_node`/`on_remove_node` are legal in any
//! state and re-wire incrementally while enabled.

mod router;
pub mod wiring;

pub use router::MAX_DISPATCH_DEPTH;

use crate::core::SignalValue;
use crate::core::error::{ClassError, FaultReason, FaultReport};
use crate::core::node::{ErrChannel, NodeClass, NodeInstance, SignalRouter};
use crate::core::schema::{Schema, ValidationReport, validator};
use router::WiringRouter;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use wiring::{SignalKey, WiringSet, overlay};

pub(crate) type SharedNodes = Rc<RefCell<HashMap<String, Rc<RefCell<NodeInstance>>>>>;
pub(crate) type SharedSchemas = Rc<RefCell<HashMap<String, BTreeMap<String, Schema>>>>;

/// Registry + wiring engine over [`NodeInstance`]s.
pub struct Orchestrator {
    classes: HashMap<String, Rc<NodeClass>>,
    nodes: SharedNodes,
    schemas: SharedSchemas,
    default_wiring: WiringSet,
    mode_wiring: HashMap<String, WiringSet>,
    /// The single materialized graph; installed only while enabled.
    active_wiring: WiringSet,
    router: Option<Rc<WiringRouter>>,
    /// Saved previous dispatch routers, in install order.
    saved_routers: Vec<(String, Option<Rc<dyn SignalRouter>>)>,
    enabled: bool,
    current_mode: Option<String>,
    err: Rc<RefCell<ErrChannel>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            nodes: Rc::new(RefCell::new(HashMap::new())),
            schemas: Rc::new(RefCell::new(HashMap::new())),
            default_wiring: WiringSet::new(),
            mode_wiring: HashMap::new(),
            active_wiring: WiringSet::new(),
            router: None,
            saved_routers: Vec::new(),
            enabled: false,
            current_mode: None,
            err: Rc::new(RefCell::new(ErrChannel::new("orchestrator".to_string(), None))),
        }
    }

    /// Subscribes a listener to the orchestrator's own Err channel; all
    /// configuration, validation, handler, and cycle faults surface
    /// here.
    pub fn on_err(&mut self, listener: impl FnMut(&FaultReport) + 'static) {
        self.err.borrow_mut().on_err(listener);
    }

    /// Makes a class available to [`on_add_node`](Self::on_add_node).
    pub fn register_class(&mut self, class: Rc<NodeClass>) {
        if self.classes.contains_key(class.name()) {
            log::warn!("class '{}' was already registered, overwriting", class.name());
        }
        self.classes.insert(class.name().to_string(), class);
    }

    /// Stores wiring declarations. Takes no effect until
    /// [`on_enable`](Self::on_enable): a live graph keeps running on the
    /// wiring it was activated with.
    pub fn on_configure(
        &mut self,
        default_wiring: WiringSet,
        mode_wiring: HashMap<String, WiringSet>,
    ) {
        self.default_wiring = default_wiring;
        self.mode_wiring = mode_wiring;
        if !self.enabled {
            self.active_wiring = self.materialize();
        }
    }

    /// Constructs, initializes, and registers an instance of a
    /// registered class under `id`. While enabled, incrementally wires
    /// the rules touching this id, observably identical to a full
    /// rebuild.
    pub fn on_add_node(
        &mut self,
        id: &str,
        class: &str,
        config: &SignalValue,
    ) -> Result<(), ClassError> {
        if self.nodes.borrow().contains_key(id) {
            let err = ClassError::DuplicateId(id.to_string());
            self.report_config(err.to_string());
            return Err(err);
        }
        let Some(class) = self.classes.get(class).cloned() else {
            let err = ClassError::UnknownClass(class.to_string());
            self.report_config(err.to_string());
            return Err(err);
        };

        let mut config = config.as_object().cloned().unwrap_or_default();
        config.insert("id".to_string(), SignalValue::String(id.to_string()));
        let mut instance = match class.instantiate(&SignalValue::Object(config)) {
            Ok(instance) => instance,
            Err(err) => {
                self.report_config(err.to_string());
                return Err(err);
            }
        };

        // The derived (merged) Out schema gets one more self-check; a
        // class chain is validated layer by layer, this covers the
        // composition the instance actually carries.
        for (signal, schema) in instance.out_schemas() {
            let report = validator::validate_schema(schema);
            if !report.ok() {
                let err = ClassError::MalformedOutSchema {
                    class: instance.class().to_string(),
                    signal: signal.clone(),
                    detail: report.format(),
                };
                self.report_config(err.to_string());
                return Err(err);
            }
        }

        instance.init();
        self.schemas
            .borrow_mut()
            .insert(id.to_string(), instance.out_schemas().clone());
        self.nodes
            .borrow_mut()
            .insert(id.to_string(), Rc::new(RefCell::new(instance)));

        if self.enabled {
            self.wire_node(id);
        }
        Ok(())
    }

    /// Unwires a node (restoring its saved dispatcher), stops it, and
    /// deregisters it. Unknown ids are tolerated with a fault report.
    pub fn on_remove_node(&mut self, id: &str) {
        let removed = self.nodes.borrow_mut().remove(id);
        let Some(node) = removed else {
            self.report_config(format!("cannot remove unknown node '{id}'"));
            return;
        };
        self.schemas.borrow_mut().remove(id);

        if let Some(pos) = self.saved_routers.iter().position(|(nid, _)| nid == id) {
            let (_, previous) = self.saved_routers.remove(pos);
            node.borrow_mut().restore_router(previous);
        }
        if let Some(router) = &self.router {
            router.remove_source(id);
        }
        node.borrow_mut().stop();
    }

    /// Switches the active mode. While enabled the swap is atomic: the
    /// old graph is fully unwired, then the new one fully wired, before
    /// this returns. While disabled only the mode changes; switching
    /// never auto-enables.
    pub fn on_set_mode(&mut self, mode: Option<&str>) {
        if let Some(name) = mode {
            if !self.mode_wiring.contains_key(name) {
                log::warn!("mode '{name}' has no wiring override, using the default graph");
            }
        }
        self.current_mode = mode.map(str::to_string);
        let next = self.materialize();
        if self.enabled {
            self.unwire_all();
            self.active_wiring = next;
            self.enabled = self.install();
        } else {
            self.active_wiring = next;
        }
    }

    /// Validates the active graph and installs routing. Fail-closed: on
    /// any dangling rule nothing is wired, `is_enabled()` stays false,
    /// and exactly one Err names the invalid rules.
    pub fn on_enable(&mut self) {
        if self.enabled {
            return;
        }
        self.active_wiring = self.materialize();
        self.enabled = self.install();
    }

    /// Restores every wrapped dispatcher to its saved original, in
    /// reverse wiring order. Safe to call when already disabled.
    pub fn on_disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.unwire_all();
        self.enabled = false;
    }

    pub fn get_node(&self, id: &str) -> Option<Rc<RefCell<NodeInstance>>> {
        self.nodes.borrow().get(id).cloned()
    }

    /// Fresh sorted snapshot, not a live view.
    pub fn get_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The node's declared Out schemas, keyed by signal name.
    pub fn get_schema(&self, id: &str) -> Option<BTreeMap<String, Schema>> {
        self.schemas.borrow().get(id).cloned()
    }

    pub fn current_mode(&self) -> Option<&str> {
        self.current_mode.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn materialize(&self) -> WiringSet {
        let mode = self
            .current_mode
            .as_ref()
            .and_then(|name| self.mode_wiring.get(name));
        overlay(&self.default_wiring, mode)
    }

    fn report_config(&self, message: String) {
        self.err
            .borrow_mut()
            .fire(FaultReport::new(FaultReason::ConfigurationError, message));
    }

    /// Installs routing for the current `active_wiring`. Returns whether
    /// the graph went live.
    fn install(&mut self) -> bool {
        let report = self.validate_wiring(&self.active_wiring);
        if !report.ok() {
            self.report_config(format!("wiring rejected, not enabling: {}", report.format()));
            return false;
        }

        let router = Rc::new(WiringRouter::new(
            self.active_wiring.clone(),
            self.nodes.clone(),
            self.schemas.clone(),
            self.err.clone(),
        ));
        let sources: BTreeSet<&String> = self.active_wiring.keys().map(|key| &key.node).collect();
        for id in sources {
            let node = self.nodes.borrow().get(id).cloned();
            if let Some(node) = node {
                let previous = node
                    .borrow_mut()
                    .install_router(router.clone() as Rc<dyn SignalRouter>);
                self.saved_routers.push((id.clone(), previous));
            }
        }
        self.router = Some(router);
        true
    }

    fn unwire_all(&mut self) {
        while let Some((id, previous)) = self.saved_routers.pop() {
            let node = self.nodes.borrow().get(&id).cloned();
            if let Some(node) = node {
                node.borrow_mut().restore_router(previous);
            }
        }
        self.router = None;
    }

    /// Incremental wiring for a node added while enabled: validates and
    /// reinstates only the rules sourced at `id`. Rules targeting `id`
    /// need no action; the live router resolves targets through the
    /// registry at dispatch time.
    fn wire_node(&mut self, id: &str) {
        let sourced: WiringSet = self
            .active_wiring
            .iter()
            .filter(|(key, _)| key.node == id)
            .map(|(key, targets)| (key.clone(), targets.clone()))
            .collect();
        if sourced.is_empty() {
            return;
        }
        let report = self.validate_wiring(&sourced);
        if !report.ok() {
            self.report_config(format!(
                "node '{id}' joined with invalid wiring, left unwired: {}",
                report.format()
            ));
            return;
        }
        let Some(router) = self.router.clone() else {
            return;
        };
        router.add_rules(sourced);
        let node = self.nodes.borrow().get(id).cloned();
        if let Some(node) = node {
            let previous = node
                .borrow_mut()
                .install_router(router as Rc<dyn SignalRouter>);
            self.saved_routers.push((id.to_string(), previous));
        }
    }

    /// Every rule's source signal must exist in its node's declared Out
    /// schema and every target node/handler must exist. Errors
    /// accumulate so one report names every dangling rule.
    fn validate_wiring(&self, wiring: &WiringSet) -> ValidationReport {
        let mut report = ValidationReport::new();
        let nodes = self.nodes.borrow();
        let schemas = self.schemas.borrow();
        for (key, targets) in wiring {
            match schemas.get(&key.node) {
                None => report.add_error(format!(
                    "rule '{key}': source node '{}' is not registered",
                    key.node
                )),
                Some(out) if !out.contains_key(&key.signal) => report.add_error(format!(
                    "rule '{key}': node '{}' does not declare signal '{}'",
                    key.node, key.signal
                )),
                Some(_) => {}
            }
            for target in targets {
                match nodes.get(&target.node) {
                    None => report.add_error(format!(
                        "rule '{key}': target node '{}' is not registered",
                        target.node
                    )),
                    Some(node) if !node.borrow().has_in_handler(&target.handler) => {
                        report.add_error(format!(
                            "rule '{key}': target '{}' has no in handler '{}'",
                            target.node, target.handler
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        report
    }
}
