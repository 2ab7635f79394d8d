//! Reduction Placement Tests
//!
//! A reduction lands on the lowest layer hosting its module; extra
//! reductions on the same event are demoted with a warning; layers below
//! the reduction point record the forwarding channels of the partially
//! reduced record.

mod common;

use common::TestModel;
use tbon_weaver::diagnostics::{Diagnostics, Warning};
use tbon_weaver::error::WeaverError;
use tbon_weaver::layout::{ForwardChannel, UidAllocator};
use tbon_weaver::mapping::{CalculationOrder, MappingStore};
use tbon_weaver::solver;

/// Two tool layers host the same reduction-capable module; the lower one
/// becomes the reduction point, the upper keeps an ordinary instance.
#[test]
fn reduction_placed_on_lowest_hosting_layer() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest", "count"]);
    let module = t.module_with("CountEvents", |m| m.is_reduction = true);
    let count = t.analysis(module, "countEvents", &["dest"]);

    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();
    let inputs = t.arg_inputs(send, &["dest"]);
    mappings
        .attach_reduction(&t.model, &mut diags, send, count, CalculationOrder::Pre, inputs, 0)
        .unwrap();
    t.model.freeze();

    let mut layout = t.chain_layout(&[(0, 16), (1, 4), (2, 1)]);
    layout.assign_module(&t.model, 1, module).unwrap();
    layout.assign_module(&t.model, 2, module).unwrap();
    layout.reduce_to_tree().unwrap();

    let mut uids = UidAllocator::new();
    solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids).unwrap();

    let l1 = layout.node(1).unwrap();
    let l2 = layout.node(2).unwrap();
    assert!(layout.layer(l1).may_reduce(module), "lowest hosting layer reduces");
    assert!(
        !layout.layer(l2).may_reduce(module),
        "upper layer keeps a non-reducing instance"
    );
    assert!(layout.layer(l2).hosts_module(module));

    // The application records the forward of the partially reduced record.
    let l0 = layout.node(0).unwrap();
    let forwards = layout
        .layer(l0)
        .reduction_forwards
        .get(&(send, CalculationOrder::Pre))
        .expect("application layer records a reduction forward");
    assert_eq!(forwards, &vec![ForwardChannel::Up]);

    // The reduction point itself records none.
    assert!(layout
        .layer(l1)
        .reduction_forwards
        .get(&(send, CalculationOrder::Pre))
        .is_none());
}

/// At most one reduction per (call, order) stays active; the demotions are
/// logged.
#[test]
fn extra_reductions_demoted_with_warning() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest"]);
    let first = t.module_with("FirstReduction", |m| m.is_reduction = true);
    let second = t.module_with("SecondReduction", |m| m.is_reduction = true);
    let a_first = t.analysis(first, "reduceFirst", &["dest"]);
    let a_second = t.analysis(second, "reduceSecond", &["dest"]);

    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();
    for analysis in [a_first, a_second] {
        let inputs = t.arg_inputs(send, &["dest"]);
        mappings
            .attach_reduction(&t.model, &mut diags, send, analysis, CalculationOrder::Pre, inputs, 0)
            .unwrap();
    }
    t.model.freeze();

    let mut layout = t.chain_layout(&[(0, 16), (1, 1)]);
    layout.assign_module(&t.model, 1, first).unwrap();
    layout.assign_module(&t.model, 1, second).unwrap();
    layout.reduce_to_tree().unwrap();

    let mut uids = UidAllocator::new();
    solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids).unwrap();

    let l1 = layout.node(1).unwrap();
    assert!(layout.layer(l1).may_reduce(first));
    assert!(!layout.layer(l1).may_reduce(second));

    let demoted = diags.all().any(|w| {
        matches!(
            w,
            Warning::MultipleReductions { kept, removed, .. }
                if kept == "FirstReduction" && removed == "SecondReduction"
        )
    });
    assert!(demoted, "the removed reduction must appear in the warning log");
}

/// A reduction whose module is hosted nowhere is a placement error.
#[test]
fn unhosted_reduction_is_fatal() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest"]);
    let module = t.module_with("CountEvents", |m| m.is_reduction = true);
    let count = t.analysis(module, "countEvents", &["dest"]);

    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();
    let inputs = t.arg_inputs(send, &["dest"]);
    mappings
        .attach_reduction(&t.model, &mut diags, send, count, CalculationOrder::Pre, inputs, 0)
        .unwrap();
    t.model.freeze();

    let mut layout = t.chain_layout(&[(0, 16), (1, 1)]);
    layout.reduce_to_tree().unwrap();

    let mut uids = UidAllocator::new();
    let result = solver::solve(&t.model, &mappings, &mut layout, &mut diags, &mut uids);
    assert!(matches!(result, Err(WeaverError::Placement(_))));
}

/// Attaching a reduction to a module that declares no reduction support is
/// a constraint violation.
#[test]
fn reduction_requires_capable_module() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest"]);
    let module = t.module("PlainModule");
    let analysis = t.analysis(module, "plain", &["dest"]);

    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();
    let inputs = t.arg_inputs(send, &["dest"]);
    let result = mappings.attach_reduction(
        &t.model,
        &mut diags,
        send,
        analysis,
        CalculationOrder::Pre,
        inputs,
        0,
    );
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));
}
