//! Class declaration: static definitions, per-instance factories, and
//! ancestor resolution by explicit map overlay.

use super::{NodeDef, NodeInstance};
use crate::core::SignalValue;
use crate::core::error::ClassError;
use crate::core::schema::validator;
use std::rc::Rc;

/// Per-instance definition factory.
///
/// Invoked once per `instantiate()` call, with the resolved parent class
/// (if any), so the returned definition's handler closures capture fresh
/// local state for exactly one instance.
pub type DefFactory = Box<dyn Fn(Option<&NodeClass>) -> NodeDef>;

enum ClassSource {
    Static(NodeDef),
    Factory(DefFactory),
}

/// An immutable node class: a name, a domain tag, an optional parent,
/// and either a static definition or a per-instance factory.
///
/// The two declaration styles get two explicit constructors,
/// [`define`](NodeClass::define) and [`define_with`](NodeClass::define_with),
/// rather than one entry point that probes its argument. A static class
/// shares its handler closures across instances, so per-instance state
/// belongs in attributes; a factory class mints fresh closures per
/// instance and may capture private state in them.
pub struct NodeClass {
    name: String,
    domain: String,
    parent: Option<Rc<NodeClass>>,
    source: ClassSource,
}

impl NodeClass {
    /// Declares a class from a static definition.
    ///
    /// Every declared `Out` schema (and the `Err` schema, when set) is
    /// self-validated here; a malformed schema is rejected at
    /// declaration time, not discovered later as a confusing dispatch
    /// failure.
    pub fn define(
        name: impl Into<String>,
        domain: impl Into<String>,
        parent: Option<Rc<NodeClass>>,
        def: NodeDef,
    ) -> Result<Rc<NodeClass>, ClassError> {
        let name = name.into();
        Self::check_def_schemas(&name, &def)?;
        Ok(Rc::new(Self {
            name,
            domain: domain.into(),
            parent,
            source: ClassSource::Static(def),
        }))
    }

    /// Declares a class from a per-instance factory.
    ///
    /// The factory runs at `instantiate()` time, so its `Out` and `Err`
    /// schemas are self-validated then.
    pub fn define_with(
        name: impl Into<String>,
        domain: impl Into<String>,
        parent: Option<Rc<NodeClass>>,
        factory: impl Fn(Option<&NodeClass>) -> NodeDef + 'static,
    ) -> Rc<NodeClass> {
        Rc::new(Self {
            name: name.into(),
            domain: domain.into(),
            parent,
            source: ClassSource::Factory(Box::new(factory)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn parent(&self) -> Option<&Rc<NodeClass>> {
        self.parent.as_ref()
    }

    fn check_def_schemas(class: &str, def: &NodeDef) -> Result<(), ClassError> {
        for (signal, schema) in &def.out {
            let report = validator::validate_schema(schema);
            if !report.ok() {
                return Err(ClassError::MalformedOutSchema {
                    class: class.to_string(),
                    signal: signal.clone(),
                    detail: report.format(),
                });
            }
        }
        if let Some(schema) = &def.err_schema {
            let report = validator::validate_schema(schema);
            if !report.ok() {
                return Err(ClassError::MalformedErrSchema {
                    class: class.to_string(),
                    detail: report.format(),
                });
            }
        }
        Ok(())
    }

    /// Resolves the full ancestor chain root-to-leaf into one merged
    /// definition. Factory ancestors are invoked now, once per call, so
    /// every instantiation gets fresh closures.
    fn resolve(&self) -> Result<NodeDef, ClassError> {
        let mut chain: Vec<&NodeClass> = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            chain.push(class);
            current = class.parent.as_deref();
        }
        chain.reverse();

        let mut merged = NodeDef::new();
        for class in chain {
            let layer = match &class.source {
                ClassSource::Static(def) => def.clone(),
                ClassSource::Factory(factory) => {
                    let def = factory(class.parent.as_deref());
                    Self::check_def_schemas(&class.name, &def)?;
                    def
                }
            };
            merged = merged.overlay(layer);
        }
        Ok(merged)
    }

    /// Constructs an instance from `config`.
    ///
    /// `config.id` becomes the instance id; when absent, one is
    /// auto-generated with a warning. Never runs `Sys.on_init`: the
    /// caller controls exactly when initialization happens, so an
    /// orchestrator or test harness can sequence many instances
    /// deterministically.
    pub fn instantiate(self: &Rc<Self>, config: &SignalValue) -> Result<NodeInstance, ClassError> {
        let def = self.resolve()?;
        let id = config
            .get("id")
            .and_then(SignalValue::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let id = format!("node_{}", uuid::Uuid::new_v4().simple());
                log::warn!(
                    "config has no id; auto-generated '{id}' for class '{}'",
                    self.name
                );
                id
            });
        Ok(NodeInstance::from_def(id, self.name.clone(), def))
    }
}
