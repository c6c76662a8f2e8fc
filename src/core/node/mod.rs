//! The node runtime: how a component class is declared, how instances
//! get private isolated state, and the three channels every instance
//! exposes (In, Out, Err) plus the Sys lifecycle hooks.
//!
//! Private per-instance bookkeeping lives in closure captures (factory
//! classes) or behind private fields; nothing underscore-named is ever
//! part of the public surface, so "no leakage" is a visibility guarantee
//! rather than a convention.

pub mod class;

pub use class::{DefFactory, NodeClass};

use crate::core::SignalValue;
use crate::core::error::{FaultReason, FaultReport, HandlerError};
use crate::core::schema::{Schema, validator};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Handler for one named input signal.
///
/// Shared (`Rc`) so a static class definition can hand the same handler
/// to every instance; factory classes mint fresh ones per instance. A
/// handler that cannot complete returns [`HandlerError`], which the
/// routing layer catches and reports without aborting siblings.
pub type InHandler = Rc<RefCell<dyn FnMut(&mut NodeCtx, &SignalValue) -> Result<(), HandlerError>>>;

/// Lifecycle hook (`on_init` / `on_start` / `on_stop`).
pub type SysHandler = Rc<RefCell<dyn FnMut(&mut NodeCtx)>>;

/// Local listener on an instance's Out channel.
pub type SignalListener = Box<dyn FnMut(&str, &SignalValue)>;

/// Listener on an instance's Err channel.
pub type ErrListener = Box<dyn FnMut(&FaultReport)>;

/// Pluggable routing seam.
///
/// An instance's `fire` always notifies local listeners first, then
/// hands off to whatever router is installed. The orchestrator installs
/// and removes itself by swapping this reference; instance data is never
/// rewritten in place.
pub trait SignalRouter {
    fn route(&self, source: &str, signal: &str, data: &SignalValue);
}

/// The three lifecycle hooks of a class layer.
#[derive(Default, Clone)]
pub struct SysHandlers {
    pub on_init: Option<SysHandler>,
    pub on_start: Option<SysHandler>,
    pub on_stop: Option<SysHandler>,
}

/// One declaration layer of a node class: lifecycle hooks, input
/// handlers, output signal schemas, and an optional Err schema.
///
/// Layers are composed root-to-leaf by [`overlay`](NodeDef::overlay);
/// a child's entries shadow same-named parent entries, unset entries
/// inherit.
#[derive(Default, Clone)]
pub struct NodeDef {
    pub sys: SysHandlers,
    pub in_handlers: BTreeMap<String, InHandler>,
    pub out: BTreeMap<String, Schema>,
    pub err_schema: Option<Schema>,
}

impl NodeDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init(mut self, hook: impl FnMut(&mut NodeCtx) + 'static) -> Self {
        self.sys.on_init = Some(Rc::new(RefCell::new(hook)));
        self
    }

    pub fn on_start(mut self, hook: impl FnMut(&mut NodeCtx) + 'static) -> Self {
        self.sys.on_start = Some(Rc::new(RefCell::new(hook)));
        self
    }

    pub fn on_stop(mut self, hook: impl FnMut(&mut NodeCtx) + 'static) -> Self {
        self.sys.on_stop = Some(Rc::new(RefCell::new(hook)));
        self
    }

    /// Declares a named input handler. Re-declaring a name shadows the
    /// earlier entry.
    pub fn input(
        mut self,
        name: impl Into<String>,
        handler: impl FnMut(&mut NodeCtx, &SignalValue) -> Result<(), HandlerError> + 'static,
    ) -> Self {
        let name = name.into();
        if self.in_handlers.contains_key(&name) {
            log::warn!("input '{name}' was already declared, overwriting");
        }
        self.in_handlers.insert(name, Rc::new(RefCell::new(handler)));
        self
    }

    /// Declares a named output signal with its payload schema.
    pub fn output(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        if self.out.contains_key(&name) {
            log::warn!("output '{name}' was already declared, overwriting");
        }
        self.out.insert(name, schema);
        self
    }

    pub fn err_schema(mut self, schema: Schema) -> Self {
        self.err_schema = Some(schema);
        self
    }

    /// Overlays `layer` onto `self`: layer entries win key-by-key for
    /// Sys/In/Out, the Err schema is replaced wholesale when set.
    pub(crate) fn overlay(mut self, layer: NodeDef) -> Self {
        if layer.sys.on_init.is_some() {
            self.sys.on_init = layer.sys.on_init;
        }
        if layer.sys.on_start.is_some() {
            self.sys.on_start = layer.sys.on_start;
        }
        if layer.sys.on_stop.is_some() {
            self.sys.on_stop = layer.sys.on_stop;
        }
        for (name, handler) in layer.in_handlers {
            self.in_handlers.insert(name, handler);
        }
        for (name, schema) in layer.out {
            self.out.insert(name, schema);
        }
        if layer.err_schema.is_some() {
            self.err_schema = layer.err_schema;
        }
        self
    }
}

/// Out channel: declared schemas, local listeners, and the swappable
/// router slot.
pub struct OutChannel {
    source_id: String,
    schemas: BTreeMap<String, Schema>,
    listeners: Vec<SignalListener>,
    router: Option<Rc<dyn SignalRouter>>,
}

impl OutChannel {
    fn new(source_id: String, schemas: BTreeMap<String, Schema>) -> Self {
        Self {
            source_id,
            schemas,
            listeners: Vec::new(),
            router: None,
        }
    }

    pub fn schema(&self, signal: &str) -> Option<&Schema> {
        self.schemas.get(signal)
    }

    pub fn schemas(&self) -> &BTreeMap<String, Schema> {
        &self.schemas
    }

    /// Subscribes a local listener; local listeners always run before
    /// any routing, in subscription order.
    pub fn on_signal(&mut self, listener: impl FnMut(&str, &SignalValue) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Installs a router, returning whatever was installed before so the
    /// caller can restore it later.
    pub fn install_router(&mut self, router: Rc<dyn SignalRouter>) -> Option<Rc<dyn SignalRouter>> {
        self.router.replace(router)
    }

    /// Puts back a previously saved router (or clears the slot).
    pub fn restore_router(&mut self, router: Option<Rc<dyn SignalRouter>>) {
        self.router = router;
    }

    /// Notifies local listeners, then the installed router if any.
    pub fn fire(&mut self, signal: &str, data: &SignalValue) {
        for listener in &mut self.listeners {
            listener(signal, data);
        }
        if let Some(router) = self.router.clone() {
            router.route(&self.source_id, signal, data);
        }
    }
}

/// Err channel: reports locally recoverable failures to listeners,
/// never raises past the caller.
///
/// When the class declared an `Err` schema, each fired report is checked
/// against it. A violating report is still delivered (dropping a fault
/// would hide the original failure) and the violation is logged.
pub struct ErrChannel {
    source_id: String,
    schema: Option<Schema>,
    listeners: Vec<ErrListener>,
}

impl ErrChannel {
    pub(crate) fn new(source_id: String, schema: Option<Schema>) -> Self {
        Self {
            source_id,
            schema,
            listeners: Vec::new(),
        }
    }

    /// The declared `Err` schema, when the class set one.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn on_err(&mut self, listener: impl FnMut(&FaultReport) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn fire(&mut self, report: FaultReport) {
        log::error!(
            "[{}] {}: {}",
            self.source_id,
            report.reason.tag(),
            report.message
        );
        if let Some(schema) = &self.schema {
            if let Ok(value) = serde_json::to_value(&report) {
                let check = validator::validate(&value, schema);
                if !check.ok() {
                    log::warn!(
                        "[{}] err report violates the declared schema: {}",
                        self.source_id,
                        check.format()
                    );
                }
            }
        }
        for listener in &mut self.listeners {
            listener(&report);
        }
    }
}

/// What an instance's handlers see: the attribute map and the Out/Err
/// channels, without access to the handler tables (so a handler can
/// never re-enter its own instance through the front door).
pub struct NodeCtx {
    id: String,
    attributes: HashMap<String, SignalValue>,
    out: OutChannel,
    err: ErrChannel,
}

impl NodeCtx {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get_attribute(&self, name: &str) -> Option<&SignalValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<SignalValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attributes(&self) -> &HashMap<String, SignalValue> {
        &self.attributes
    }

    /// Fires a named output signal: local listeners first, then routing.
    pub fn fire(&mut self, signal: &str, data: &SignalValue) {
        self.out.fire(signal, data);
    }

    /// Reports a locally recoverable failure on the Err channel.
    pub fn report(&mut self, report: FaultReport) {
        self.err.fire(report);
    }

    pub fn out(&mut self) -> &mut OutChannel {
        &mut self.out
    }

    pub fn err(&mut self) -> &mut ErrChannel {
        &mut self.err
    }
}

/// A live component instance.
///
/// Constructed by [`NodeClass::instantiate`]; `init()` must run before
/// any input handler is dispatched, and `stop()` is idempotent.
pub struct NodeInstance {
    id: String,
    class: String,
    ctx: NodeCtx,
    sys: SysHandlers,
    in_handlers: BTreeMap<String, InHandler>,
    initialized: bool,
    stopped: bool,
}

impl NodeInstance {
    pub(crate) fn from_def(id: String, class: String, def: NodeDef) -> Self {
        let ctx = NodeCtx {
            id: id.clone(),
            attributes: HashMap::new(),
            out: OutChannel::new(id.clone(), def.out),
            err: ErrChannel::new(id.clone(), def.err_schema),
        };
        Self {
            id,
            class,
            ctx,
            sys: def.sys,
            in_handlers: def.in_handlers,
            initialized: false,
            stopped: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the leaf class this instance was built from.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Runs `Sys.on_init`. Safe to call once; repeat calls are no-ops.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        if let Some(hook) = &self.sys.on_init {
            match hook.try_borrow_mut() {
                Ok(mut hook) => (&mut *hook)(&mut self.ctx),
                Err(_) => self.ctx.err.fire(FaultReport::new(
                    FaultReason::LifecycleFault,
                    format!("on_init hook on node '{}' is already running, skipped", self.id),
                )),
            }
        }
    }

    /// Runs `Sys.on_start`. Before `init()` this is a tolerated no-op
    /// reported as a lifecycle fault.
    pub fn start(&mut self) {
        if !self.initialized {
            self.ctx.err.fire(FaultReport::new(
                FaultReason::LifecycleFault,
                format!("start called before init on node '{}'", self.id),
            ));
            return;
        }
        if let Some(hook) = &self.sys.on_start {
            match hook.try_borrow_mut() {
                Ok(mut hook) => (&mut *hook)(&mut self.ctx),
                Err(_) => self.ctx.err.fire(FaultReport::new(
                    FaultReason::LifecycleFault,
                    format!("on_start hook on node '{}' is already running, skipped", self.id),
                )),
            }
        }
    }

    /// Runs `Sys.on_stop` exactly once; every further call is a no-op.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if !self.initialized {
            return;
        }
        if let Some(hook) = &self.sys.on_stop {
            match hook.try_borrow_mut() {
                Ok(mut hook) => (&mut *hook)(&mut self.ctx),
                Err(_) => self.ctx.err.fire(FaultReport::new(
                    FaultReason::LifecycleFault,
                    format!("on_stop hook on node '{}' is already running, skipped", self.id),
                )),
            }
        }
    }

    /// Dispatches a named input handler with `payload`.
    ///
    /// Before `init()` this is a tolerated no-op reported as a lifecycle
    /// fault. An unknown handler name or a handler failure comes back as
    /// [`HandlerError`] for the caller's fault boundary.
    pub fn handle(&mut self, name: &str, payload: &SignalValue) -> Result<(), HandlerError> {
        if !self.initialized {
            self.ctx.err.fire(FaultReport::new(
                FaultReason::LifecycleFault,
                format!("in handler '{name}' called before init on node '{}'", self.id),
            ));
            return Ok(());
        }
        let Some(handler) = self.in_handlers.get(name).cloned() else {
            return Err(HandlerError::new(format!(
                "node '{}' has no in handler '{name}'",
                self.id
            )));
        };
        let mut handler = handler.try_borrow_mut().map_err(|_| {
            HandlerError::new(format!(
                "in handler '{name}' on node '{}' is already running",
                self.id
            ))
        })?;
        (&mut *handler)(&mut self.ctx, payload)
    }

    pub fn has_in_handler(&self, name: &str) -> bool {
        self.in_handlers.contains_key(name)
    }

    pub fn in_handler_names(&self) -> Vec<String> {
        self.in_handlers.keys().cloned().collect()
    }

    /// Declared Out schemas, keyed by signal name.
    pub fn out_schemas(&self) -> &BTreeMap<String, Schema> {
        self.ctx.out.schemas()
    }

    /// The declared Err schema, when the class set one.
    pub fn err_schema(&self) -> Option<&Schema> {
        self.ctx.err.schema()
    }

    /// Fires a named output signal on this instance's Out channel.
    pub fn fire(&mut self, signal: &str, data: &SignalValue) {
        self.ctx.fire(signal, data);
    }

    /// Reports a failure on this instance's Err channel.
    pub fn report(&mut self, report: FaultReport) {
        self.ctx.report(report);
    }

    pub fn get_attribute(&self, name: &str) -> Option<&SignalValue> {
        self.ctx.get_attribute(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<SignalValue>) {
        self.ctx.set_attribute(name, value);
    }

    /// Subscribes a local listener to this instance's Out channel.
    pub fn on_signal(&mut self, listener: impl FnMut(&str, &SignalValue) + 'static) {
        self.ctx.out.on_signal(listener);
    }

    /// Subscribes a listener to this instance's Err channel.
    pub fn on_err(&mut self, listener: impl FnMut(&FaultReport) + 'static) {
        self.ctx.err.on_err(listener);
    }

    /// Installs a router on the Out channel, returning the previous one.
    pub fn install_router(&mut self, router: Rc<dyn SignalRouter>) -> Option<Rc<dyn SignalRouter>> {
        self.ctx.out.install_router(router)
    }

    /// Restores a previously saved router.
    pub fn restore_router(&mut self, router: Option<Rc<dyn SignalRouter>>) {
        self.ctx.out.restore_router(router);
    }
}
