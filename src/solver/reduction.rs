//! Reduction Placement
//!
//! A reduction folds many occurrences of an event into one before it travels
//! further up the overlay. Placement rules:
//!
//! - a reduction is instantiated on the lowest layer hosting its module
//!   (closer to the leaves saves bandwidth);
//! - at most one reduction per (call, order) stays active; the others are
//!   demoted to ordinary analyses, with a warning;
//! - every layer on the path from the application to the reduction point
//!   records over which outgoing channels the partially reduced record
//!   leaves; an intra-communication, when present, participates;
//! - a reduction whose module is hosted nowhere above the application is a
//!   fatal placement error.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Result, WeaverError};
use crate::layout::{ForwardChannel, LayerGraph};
use crate::mapping::{CalculationOrder, MappingStore};
use crate::spec::{AnalysisModuleId, CalculationRef, CallId, SpecModel};

/// One placed reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedReduction {
    pub call: CallId,
    pub order: CalculationOrder,
    pub module: AnalysisModuleId,
    /// Order id of the layer the reduction runs on
    pub layer_order: u32,
}

/// Place all reductions; returns the final plan.
pub fn place_reductions(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
    diags: &mut Diagnostics,
) -> Result<Vec<PlacedReduction>> {
    // Reduction mappings grouped per (call, order), in attachment order.
    let mut groups: HashMap<(CallId, CalculationOrder), Vec<AnalysisModuleId>> = HashMap::new();
    let mut group_keys: Vec<(CallId, CalculationOrder)> = Vec::new();
    for mapping in mappings.iter().filter(|m| m.is_reduction) {
        let CalculationRef::Analysis(analysis) = mapping.calculation else {
            continue;
        };
        let module = model.analysis(analysis).module;
        let key = (mapping.call, mapping.order);
        let entry = groups.entry(key).or_insert_with(|| {
            group_keys.push(key);
            Vec::new()
        });
        if !entry.contains(&module) {
            entry.push(module);
        }
    }

    let mut plan = Vec::new();
    for key in group_keys {
        let (call, order) = key;
        let modules = &groups[&key];

        // Only one reduction may absorb an event; the first attachment wins.
        let kept = modules[0];
        for &removed in &modules[1..] {
            diags.record(Warning::MultipleReductions {
                call: model.call(call).name.clone(),
                order: order.as_str().to_string(),
                kept: model.module(kept).name.clone(),
                removed: model.module(removed).name.clone(),
            });
        }

        let target = lowest_hosting_layer(layout, kept).ok_or_else(|| {
            WeaverError::placement(format!(
                "reduction '{}' for call '{}' ({}) is hosted on no tool layer",
                model.module(kept).name,
                model.call(call).name,
                order.as_str()
            ))
        })?;
        let target_order = layout.layer(target).order;

        layout.layer_mut(target).reductions.push(kept);
        plan.push(PlacedReduction {
            call,
            order,
            module: kept,
            layer_order: target_order,
        });

        // Layers above the reduction point keep the module as an ordinary
        // analysis instance.
        for node in layout.layers() {
            let layer = layout.layer(node);
            if layer.order > target_order && layer.hosts_module(kept) {
                diags.record(Warning::ReductionDemoted {
                    module: model.module(kept).name.clone(),
                    layer: layer.order,
                });
            }
        }

        record_reduction_forwards(layout, call, order, target)?;
    }
    Ok(plan)
}

/// The lowest non-application layer hosting `module`
fn lowest_hosting_layer(layout: &LayerGraph, module: AnalysisModuleId) -> Option<NodeIndex> {
    layout
        .layers()
        .into_iter()
        .filter(|&n| !layout.layer(n).is_application() && layout.layer(n).hosts_module(module))
        .min_by_key(|&n| layout.layer(n).order)
}

/// Mark, on every layer from the application up to (excluding) the
/// reduction point, the channels carrying the partially reduced record.
fn record_reduction_forwards(
    layout: &mut LayerGraph,
    call: CallId,
    order: CalculationOrder,
    target: NodeIndex,
) -> Result<()> {
    let mut current = layout.application()?;
    while current != target {
        let mut channels = vec![ForwardChannel::Up];
        if layout.layer(current).intra_comm.is_some() {
            channels.push(ForwardChannel::Intra);
        }
        layout
            .layer_mut(current)
            .reduction_forwards
            .insert((call, order), channels);
        current = layout.parent_of(current).ok_or_else(|| {
            WeaverError::placement(format!(
                "no path from the application to the reduction layer {}",
                layout.layer(target).order
            ))
        })?;
    }
    Ok(())
}
