//! Automagic Module Inclusion
//!
//! A module flagged `is_added_automagically` joins a layer when every input
//! of every one of its mapped analyses is already among the layer's
//! `used_args` for the relevant (call, order). Including such a module adds
//! analyses but never grows any receive set, so no recomputation of the
//! propagation passes is needed. Iterates to a fixed point; running the
//! pass again is a no-op.

use petgraph::graph::NodeIndex;

use crate::error::Result;
use crate::layout::LayerGraph;
use crate::mapping::{MappingInput, MappingStore};
use crate::spec::{AnalysisModuleId, CalculationRef, SpecModel};

/// True if every mapped analysis of `module` finds all of its inputs in the
/// layer's `used_args` already. Modules without any mapped analysis never
/// qualify.
fn inputs_already_present(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    module: AnalysisModuleId,
) -> bool {
    let mut any_mapping = false;
    for &analysis in &model.module(module).analyses {
        for (call_id, _) in model.calls() {
            for mapping in mappings.mappings_for(CalculationRef::Analysis(analysis), call_id) {
                any_mapping = true;
                let Some(props) = layout.layer(node).props(mapping.call, mapping.order) else {
                    return false;
                };
                for input in &mapping.inputs {
                    // Call names and ids are synthesized everywhere.
                    if matches!(input, MappingInput::CallName | MappingInput::CallId) {
                        continue;
                    }
                    let name = input.display_name(model, mapping.call);
                    if !props.used_args.contains(&name) {
                        return false;
                    }
                }
            }
        }
    }
    any_mapping
}

/// An added module's analyses run on the layer; the flag feeds the derived
/// wrapper/receival decisions of the closing pass.
fn mark_local_analyses(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
    node: NodeIndex,
    module: AnalysisModuleId,
) {
    let analyses = model.module(module).analyses.clone();
    for analysis in analyses {
        for (call_id, _) in model.calls() {
            let keys: Vec<_> = mappings
                .mappings_for(CalculationRef::Analysis(analysis), call_id)
                .iter()
                .map(|m| (m.call, m.order))
                .collect();
            for (call, order) in keys {
                layout
                    .layer_mut(node)
                    .props_mut(call, order)
                    .has_local_analyses = true;
            }
        }
    }
}

/// Pass: add automagic modules wherever their inputs come for free.
///
/// Returns the number of modules added across all layers.
pub fn include_automagic_modules(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
) -> Result<usize> {
    let candidates: Vec<AnalysisModuleId> = model
        .modules()
        .filter(|(_, m)| m.is_added_automagically)
        .map(|(id, _)| id)
        .collect();

    let mut added_total = 0;
    loop {
        let mut added_this_round = 0;
        for node in layout.layers() {
            for &module in &candidates {
                if layout.layer(node).hosts_module(module) {
                    continue;
                }
                if inputs_already_present(model, mappings, layout, node, module) {
                    let order = layout.layer(node).order;
                    layout.assign_module(model, order, module)?;
                    mark_local_analyses(model, mappings, layout, node, module);
                    added_this_round += 1;
                }
            }
        }
        if added_this_round == 0 {
            break;
        }
        added_total += added_this_round;
    }
    Ok(added_total)
}
