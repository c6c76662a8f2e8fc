//! End-to-end tests of the component/signal runtime: classes are
//! declared, instances registered, wiring configured, and signals fired
//! through a live orchestrator.

use nodewire::prelude::*;
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<(String, SignalValue)>>>;

/// Class with one schemaless `ping` output.
fn pinger_class(out_schema: Schema) -> Rc<NodeClass> {
    NodeClass::define(
        "Pinger",
        "itest",
        None,
        NodeDef::new().output("ping", out_schema),
    )
    .unwrap()
}

/// Class whose `on_ping` input records every delivery into `log` under
/// the instance's own id.
fn receiver_class(name: &str, log: Log) -> Rc<NodeClass> {
    NodeClass::define_with(name.to_string(), "itest", None, move |_| {
        let log = log.clone();
        NodeDef::new().input("on_ping", move |ctx, data| {
            log.borrow_mut().push((ctx.id().to_string(), data.clone()));
            Ok(())
        })
    })
}

fn fault_sink(orch: &mut Orchestrator) -> Rc<RefCell<Vec<FaultReport>>> {
    let faults = Rc::new(RefCell::new(Vec::new()));
    orch.on_err({
        let faults = faults.clone();
        move |report| faults.borrow_mut().push(report.clone())
    });
    faults
}

#[test]
fn ping_reaches_wired_target_exactly_once() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();

    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![WiringTarget::new("B", "on_ping")],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();
    assert!(orch.is_enabled());

    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "n": 1 }));

    assert_eq!(
        log.borrow().as_slice(),
        &[("B".to_string(), json!({ "n": 1 }))]
    );
}

#[test]
fn unwired_fire_only_reaches_local_listeners() {
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();

    let seen = Rc::new(RefCell::new(0u32));
    orch.get_node("A").unwrap().borrow_mut().on_signal({
        let seen = seen.clone();
        move |_, _| *seen.borrow_mut() += 1
    });

    // Never enabled: firing is a purely local event.
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));
    assert_eq!(*seen.borrow(), 1);
}

#[test]
fn dangling_handler_fails_activation_closed() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    let faults = fault_sink(&mut orch);

    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![WiringTarget::new("B", "on_pong")],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    assert!(!orch.is_enabled());
    assert_eq!(faults.borrow().len(), 1);
    assert_eq!(faults.borrow()[0].reason, FaultReason::ConfigurationError);

    // No partial wiring: firing routes nowhere.
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));
    assert!(log.borrow().is_empty());
}

#[test]
fn mode_switch_while_enabled_swaps_the_graph_atomically() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    orch.on_add_node("C", "Receiver", &json!({})).unwrap();

    let default = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![WiringTarget::new("B", "on_ping")],
    )]);
    let alt = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![WiringTarget::new("C", "on_ping")],
    )]);
    orch.on_configure(default, HashMap::from([("alt".to_string(), alt)]));
    orch.on_enable();

    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "seq": 1 }));

    orch.on_set_mode(Some("alt"));
    assert!(orch.is_enabled());
    assert_eq!(orch.current_mode(), Some("alt"));
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "seq": 2 }));

    orch.on_set_mode(None);
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "seq": 3 }));

    assert_eq!(
        log.borrow().as_slice(),
        &[
            ("B".to_string(), json!({ "seq": 1 })),
            ("C".to_string(), json!({ "seq": 2 })),
            ("B".to_string(), json!({ "seq": 3 })),
        ]
    );
}

#[test]
fn routing_order_is_deterministic_and_declared() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    for id in ["C", "B", "D"] {
        orch.on_add_node(id, "Receiver", &json!({})).unwrap();
    }

    // Declared order, not alphabetical.
    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![
            WiringTarget::new("C", "on_ping"),
            WiringTarget::new("B", "on_ping"),
            WiringTarget::new("D", "on_ping"),
        ],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    for round in 0..3 {
        orch.get_node("A")
            .unwrap()
            .borrow_mut()
            .fire("ping", &json!({ "round": round }));
    }

    let order: Vec<String> = log.borrow().iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(order, vec!["C", "B", "D", "C", "B", "D", "C", "B", "D"]);
}

#[test]
fn faulting_target_does_not_abort_source_or_siblings() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let faulty = NodeClass::define(
        "Faulty",
        "itest",
        None,
        NodeDef::new().input("on_ping", |_, _| Err(HandlerError::new("exploded"))),
    )
    .unwrap();

    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(faulty);
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("F", "Faulty", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    let faults = fault_sink(&mut orch);

    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![
            WiringTarget::new("F", "on_ping"),
            WiringTarget::new("B", "on_ping"),
        ],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    let local = Rc::new(RefCell::new(0u32));
    orch.get_node("A").unwrap().borrow_mut().on_signal({
        let local = local.clone();
        move |_, _| *local.borrow_mut() += 1
    });

    // Fire returns normally despite the faulting target.
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));

    assert_eq!(*local.borrow(), 1);
    assert_eq!(log.borrow().len(), 1); // sibling B still ran
    let handler_faults: Vec<_> = faults
        .borrow()
        .iter()
        .filter(|f| f.reason == FaultReason::HandlerFault)
        .cloned()
        .collect();
    assert_eq!(handler_faults.len(), 1);
    assert!(handler_faults[0].message.contains("exploded"));
    let ctx = handler_faults[0].context.as_ref().unwrap();
    assert_eq!(ctx["source"], json!("A"));
    assert_eq!(ctx["target"], json!("F"));
}

#[test]
fn invalid_payload_skips_routing_but_not_local_listeners() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let strict = Schema::from([(
        "n".to_string(),
        FieldSpec::of(FieldType::Number).required(),
    )]);
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(strict));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    let faults = fault_sink(&mut orch);

    orch.on_configure(
        WiringSet::from([(
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("B", "on_ping")],
        )]),
        HashMap::new(),
    );
    orch.on_enable();

    let local = Rc::new(RefCell::new(0u32));
    orch.get_node("A").unwrap().borrow_mut().on_signal({
        let local = local.clone();
        move |_, _| *local.borrow_mut() += 1
    });

    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "n": "not a number" }));

    assert_eq!(*local.borrow(), 1);
    assert!(log.borrow().is_empty());
    assert_eq!(faults.borrow().len(), 1);
    assert_eq!(faults.borrow()[0].reason, FaultReason::ValidationError);
    assert!(faults.borrow()[0].message.contains("'n'"));

    // A valid payload routes normally afterwards.
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "n": 2 }));
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn transform_rewrites_payload_per_target() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    orch.on_add_node("C", "Receiver", &json!({})).unwrap();

    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![
            WiringTarget::new("B", "on_ping").with_transform(|mut data| {
                let doubled = data["n"].as_i64().unwrap_or(0) * 2;
                data["n"] = json!(doubled);
                data
            }),
            WiringTarget::new("C", "on_ping"),
        ],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "n": 3 }));

    assert_eq!(
        log.borrow().as_slice(),
        &[
            ("B".to_string(), json!({ "n": 6 })),
            ("C".to_string(), json!({ "n": 3 })),
        ]
    );
}

#[test]
fn reentrant_wiring_is_reported_as_a_cycle() {
    // A.ping -> B.on_ping; B fires back at A, which is still borrowed
    // by the original dispatch.
    let echo = NodeClass::define(
        "Echo",
        "itest",
        None,
        NodeDef::new()
            .output("echo", Schema::new())
            .input("on_ping", |ctx, data| {
                ctx.fire("echo", data);
                Ok(())
            }),
    )
    .unwrap();
    let pinger = NodeClass::define(
        "Pinger",
        "itest",
        None,
        NodeDef::new()
            .output("ping", Schema::new())
            .input("on_echo", |_, _| Ok(())),
    )
    .unwrap();

    let mut orch = Orchestrator::new();
    orch.register_class(pinger);
    orch.register_class(echo);
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Echo", &json!({})).unwrap();
    let faults = fault_sink(&mut orch);

    let wiring = WiringSet::from([
        (
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("B", "on_ping")],
        ),
        (
            SignalKey::new("B", "echo"),
            vec![WiringTarget::new("A", "on_echo")],
        ),
    ]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    // Returns normally; the back-edge is contained and reported.
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));

    let cycles: Vec<_> = faults
        .borrow()
        .iter()
        .filter(|f| f.reason == FaultReason::RoutingCycle)
        .cloned()
        .collect();
    assert_eq!(cycles.len(), 1);
}

#[test]
fn dispatch_depth_is_bounded() {
    // A linear chain longer than the dispatch depth bound: node i fires
    // "next", wired to node i+1.
    let visits = Rc::new(RefCell::new(0usize));
    let relay = NodeClass::define_with("Relay", "itest", None, {
        let visits = visits.clone();
        move |_| {
            let visits = visits.clone();
            NodeDef::new()
                .output("next", Schema::new())
                .input("on_next", move |ctx, data| {
                    *visits.borrow_mut() += 1;
                    ctx.fire("next", data);
                    Ok(())
                })
        }
    });

    let mut orch = Orchestrator::new();
    orch.register_class(relay);
    let count = nodewire::MAX_DISPATCH_DEPTH + 4;
    for i in 0..=count {
        orch.on_add_node(&format!("n{i}"), "Relay", &json!({})).unwrap();
    }
    let faults = fault_sink(&mut orch);

    let mut wiring = WiringSet::new();
    for i in 0..count {
        wiring.insert(
            SignalKey::new(format!("n{i}"), "next"),
            vec![WiringTarget::new(format!("n{}", i + 1), "on_next")],
        );
    }
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();
    assert!(orch.is_enabled());

    orch.get_node("n0")
        .unwrap()
        .borrow_mut()
        .fire("next", &json!({}));

    // The chain was cut at the bound instead of running to the end.
    assert_eq!(*visits.borrow(), nodewire::MAX_DISPATCH_DEPTH);
    let cycles: Vec<_> = faults
        .borrow()
        .iter()
        .filter(|f| f.reason == FaultReason::RoutingCycle)
        .cloned()
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("depth"));
}

#[test]
fn remove_and_readd_while_enabled_rewires_incrementally() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    orch.on_add_node("C", "Receiver", &json!({})).unwrap();
    let faults = fault_sink(&mut orch);

    let wiring = WiringSet::from([(
        SignalKey::new("A", "ping"),
        vec![
            WiringTarget::new("B", "on_ping"),
            WiringTarget::new("C", "on_ping"),
        ],
    )]);
    orch.on_configure(wiring, HashMap::new());
    orch.on_enable();

    orch.on_remove_node("B");
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "seq": 1 }));

    // C still receives; the gone target is reported, not fatal.
    assert_eq!(log.borrow().as_slice(), &[("C".to_string(), json!({ "seq": 1 }))]);
    assert!(
        faults
            .borrow()
            .iter()
            .any(|f| f.reason == FaultReason::ConfigurationError && f.message.contains("gone"))
    );

    orch.on_add_node("B", "Receiver", &json!({})).unwrap();
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({ "seq": 2 }));
    assert_eq!(
        log.borrow().as_slice(),
        &[
            ("C".to_string(), json!({ "seq": 1 })),
            ("B".to_string(), json!({ "seq": 2 })),
            ("C".to_string(), json!({ "seq": 2 })),
        ]
    );
}

#[test]
fn disable_restores_original_dispatch() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut orch = Orchestrator::new();
    orch.register_class(pinger_class(Schema::new()));
    orch.register_class(receiver_class("Receiver", log.clone()));
    orch.on_add_node("A", "Pinger", &json!({})).unwrap();
    orch.on_add_node("B", "Receiver", &json!({})).unwrap();

    orch.on_configure(
        WiringSet::from([(
            SignalKey::new("A", "ping"),
            vec![WiringTarget::new("B", "on_ping")],
        )]),
        HashMap::new(),
    );
    orch.on_enable();
    orch.on_disable();

    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));
    assert!(log.borrow().is_empty());

    // Re-enabling brings routing back.
    orch.on_enable();
    orch.get_node("A")
        .unwrap()
        .borrow_mut()
        .fire("ping", &json!({}));
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn validate_scenario_reports_exactly_the_missing_field() {
    let schema = Schema::from([
        (
            "name".to_string(),
            FieldSpec::of(FieldType::String).required(),
        ),
        (
            "count".to_string(),
            FieldSpec::of(FieldType::Number).required(),
        ),
    ]);
    let report = nodewire::validate(&json!({ "name": "x" }), &schema);
    assert!(!report.ok());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("count"));
}
