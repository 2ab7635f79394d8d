//! Receive-Set Propagation
//!
//! `args_to_receive` of a layer describes the record it sends on. For
//! ordinary events that is everything its receiver consumes or forwards,
//! minus what the receiver derives locally through operations; operation
//! results never travel, their raw inputs do. The only exception is a length
//! value produced by an operation for an array argument: the wrap site
//! computes it once and the value rides along so receivers can deserialize
//! the array.

use petgraph::graph::NodeIndex;

use crate::error::Result;
use crate::layout::{InputOrigin, InputSet, LayerGraph};
use crate::mapping::CalculationOrder;
use crate::spec::{CallId, SpecModel};

/// The transmittable subset of a layer's needs: call data stays, operation
/// results are dropped unless they are the transmitted length of an array
/// argument.
fn transmittable(needs: &InputSet) -> InputSet {
    let mut result = InputSet::new();
    for input in needs {
        match input.origin {
            InputOrigin::CallArgument { .. } | InputOrigin::CallReturn => {
                result.insert(input.clone());
            }
            InputOrigin::OperationResult { .. } | InputOrigin::OperationLen { .. } => {
                let is_transmitted_length = needs.iter().any(|candidate| {
                    matches!(candidate.origin, InputOrigin::CallArgument { .. })
                        && candidate.array_length.as_deref() == Some(input.name.as_str())
                });
                if is_transmitted_length {
                    result.insert(input.clone());
                }
            }
        }
    }
    result
}

/// Everything a layer needs to see arrive for one (call, order): local use
/// plus what it forwards.
fn needs_of(
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
) -> InputSet {
    let mut needs = InputSet::new();
    if let Some(props) = layout.layer(node).props(call, order) {
        needs.extend(props.used_args.iter().cloned());
        needs.extend(props.args_to_receive.iter().cloned());
    }
    needs
}

/// Nodes in root-first order (every node before its children)
fn root_first(layout: &LayerGraph) -> Result<Vec<NodeIndex>> {
    let root = layout.root()?;
    let mut order = vec![root];
    let mut cursor = 0;
    while cursor < order.len() {
        let node = order[cursor];
        cursor += 1;
        order.extend(layout.children_of(node));
    }
    Ok(order)
}

/// Pass B: propagate receive sets from the root toward the application for
/// all ordinary (upward-travelling) events. Also settles
/// `information_required`: a layer must see an event when it runs analyses
/// on it or when the layer it forwards to must see it.
pub fn propagate_upward(model: &SpecModel, layout: &mut LayerGraph) -> Result<()> {
    for node in root_first(layout)? {
        // Own analyses make the event required here.
        let own_keys: Vec<(CallId, CalculationOrder)> =
            layout.layer(node).properties.keys().copied().collect();
        for key in own_keys {
            let props = layout.layer_mut(node).props_mut(key.0, key.1);
            if props.has_local_analyses {
                props.information_required = true;
            }
        }

        let Some(parent) = layout.parent_of(node) else {
            continue; // the root sends nothing on
        };
        let keys: Vec<(CallId, CalculationOrder)> =
            layout.layer(parent).properties.keys().copied().collect();
        for (call, order) in keys {
            let flags = model.call(call).flags;
            if flags.wrap_down || flags.wrap_across {
                continue;
            }
            let parent_info = layout
                .layer(parent)
                .props(call, order)
                .map(|p| p.information_required)
                .unwrap_or(false);
            let outbound = transmittable(&needs_of(layout, parent, call, order));
            if outbound.is_empty() && !parent_info {
                continue;
            }
            let props = layout.layer_mut(node).props_mut(call, order);
            props.args_to_receive.extend(outbound);
            props.information_required |= parent_info;
        }
    }
    Ok(())
}

/// Pass B': identical propagation on the inverted edge set for wrap-down
/// events, which travel from the tool layers toward the application.
pub fn propagate_downward(model: &SpecModel, layout: &mut LayerGraph) -> Result<()> {
    // Children before parents: walk the root-first order backwards.
    let mut order = root_first(layout)?;
    order.reverse();
    for node in order {
        let children = layout.children_of(node);
        if children.is_empty() {
            continue;
        }
        let mut keys: Vec<(CallId, CalculationOrder)> = Vec::new();
        for &child in &children {
            for key in layout.layer(child).properties.keys() {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        for (call, order_tag) in keys {
            if !model.call(call).flags.wrap_down {
                continue;
            }
            let mut outbound = InputSet::new();
            let mut child_info = false;
            for &child in &children {
                outbound.extend(transmittable(&needs_of(layout, child, call, order_tag)));
                child_info |= layout
                    .layer(child)
                    .props(call, order_tag)
                    .map(|p| p.information_required || p.has_local_analyses)
                    .unwrap_or(false);
            }
            if outbound.is_empty() && !child_info {
                continue;
            }
            let props = layout.layer_mut(node).props_mut(call, order_tag);
            props.args_to_receive.extend(outbound);
            props.information_required |= child_info;
        }
    }
    Ok(())
}

/// Wrap-across events loop within their creating layer: the record leaving
/// the wrapper feeds the receivals of sibling processes on the same layer.
pub fn compute_wrap_across(model: &SpecModel, layout: &mut LayerGraph) -> Result<()> {
    for node in layout.layers() {
        let keys: Vec<(CallId, CalculationOrder)> =
            layout.layer(node).properties.keys().copied().collect();
        for (call, order) in keys {
            if !model.call(call).flags.wrap_across {
                continue;
            }
            let created = layout
                .layer(node)
                .props(call, order)
                .map(|p| p.wrap_across_created_on_level)
                .unwrap_or(false);
            if !created {
                continue;
            }
            let used = layout
                .layer(node)
                .props(call, order)
                .map(|p| p.used_args.clone())
                .unwrap_or_default();
            let outbound = transmittable(&used);
            layout
                .layer_mut(node)
                .props_mut(call, order)
                .args_to_receive
                .extend(outbound);
        }
    }
    Ok(())
}
