//! Automagic Module Inclusion Tests
//!
//! Modules flagged for automagic inclusion join a layer only when their
//! analyses' inputs are already present; the pass never grows receive sets
//! and is idempotent.

mod common;

use common::{names, TestModel};
use tbon_weaver::diagnostics::Diagnostics;
use tbon_weaver::layout::UidAllocator;
use tbon_weaver::mapping::{CalculationOrder, MappingStore};
use tbon_weaver::solver::{self, automagic};

/// Set up: an explicit analysis consuming {dest, count} on layer 1, plus an
/// automagic module whose analysis needs only {dest}.
fn build() -> (
    TestModel,
    MappingStore,
    tbon_weaver::layout::LayerGraph,
    tbon_weaver::spec::AnalysisModuleId,
    tbon_weaver::spec::AnalysisModuleId,
) {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest", "count", "tag"]);
    let explicit = t.module("ExplicitModule");
    let log = t.analysis(explicit, "logSend", &["dest", "count"]);
    let magic = t.module_with("IntegrityModule", |m| {
        m.is_added_automagically = true;
        m.is_local_integrity = true;
    });
    let check = t.analysis(magic, "checkDest", &["dest"]);
    let greedy = t.module_with("GreedyModule", |m| m.is_added_automagically = true);
    let wide = t.analysis(greedy, "checkAll", &["dest", "count", "tag", "extra"]);

    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();
    let inputs = t.arg_inputs(send, &["dest", "count"]);
    mappings
        .attach_analysis(&t.model, &mut diags, send, log, CalculationOrder::Pre, inputs, 0)
        .unwrap();
    let inputs = t.arg_inputs(send, &["dest"]);
    mappings
        .attach_analysis(&t.model, &mut diags, send, check, CalculationOrder::Pre, inputs, 1)
        .unwrap();
    // The greedy module wants an input nobody transports.
    let mut inputs = t.arg_inputs(send, &["dest", "count", "tag"]);
    inputs.push(tbon_weaver::mapping::MappingInput::CallId);
    mappings
        .attach_analysis(&t.model, &mut diags, send, wide, CalculationOrder::Pre, inputs, 2)
        .unwrap();
    t.model.freeze();

    let mut layout = t.chain_layout(&[(0, 16), (1, 1)]);
    layout.assign_module(&t.model, 1, explicit).unwrap();
    layout.reduce_to_tree().unwrap();
    (t, mappings, layout, magic, greedy)
}

#[test]
fn automagic_module_joins_where_inputs_are_free() {
    let (t, mappings, mut layout, magic, _) = build();
    let mut diags = Diagnostics::new();
    let mut uids = UidAllocator::new();
    solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids).unwrap();

    // Layer 1 has {dest, count} used; the integrity module needs {dest}.
    let l1 = layout.node(1).unwrap();
    assert!(layout.layer(l1).hosts_module(magic));

    // The application layer sees every argument, so it qualifies too.
    let l0 = layout.node(0).unwrap();
    assert!(layout.layer(l0).hosts_module(magic));
}

#[test]
fn automagic_never_grows_receive_sets() {
    let (t, mappings, mut layout, _, greedy) = build();
    let mut diags = Diagnostics::new();
    let mut uids = UidAllocator::new();
    solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids).unwrap();

    // Layer 1 never sees 'tag' arrive, so the greedy module only joins the
    // application layer, where the full signature is in scope anyway.
    let l0 = layout.node(0).unwrap();
    let l1 = layout.node(1).unwrap();
    assert!(!layout.layer(l1).hosts_module(greedy));
    assert!(layout.layer(l0).hosts_module(greedy));

    // Receive sets stay exactly what the explicit analysis demanded; the
    // greedy module's extra appetite adds nothing to the records.
    let send = t.model.find_call("Send").unwrap();
    let l0_props = layout
        .layer(l0)
        .props(send, CalculationOrder::Pre)
        .unwrap();
    assert_eq!(names(&l0_props.args_to_receive), ["dest", "count"]);
}

#[test]
fn automagic_inclusion_is_idempotent() {
    let (t, mappings, mut layout, _, _) = build();
    let mut diags = Diagnostics::new();
    let mut uids = UidAllocator::new();
    solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids).unwrap();

    let before: Vec<Vec<_>> = layout
        .layers()
        .into_iter()
        .map(|n| layout.layer(n).modules.clone())
        .collect();

    let added = automagic::include_automagic_modules(&t.model, &mappings, &mut layout).unwrap();
    assert_eq!(added, 0, "a second run must be a no-op");

    let after: Vec<Vec<_>> = layout
        .layers()
        .into_iter()
        .map(|n| layout.layer(n).modules.clone())
        .collect();
    assert_eq!(before, after);
}
