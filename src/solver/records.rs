//! Record Uids, Operation Schedules and Derived Flags
//!
//! The closing solver pass. Per (layer, call, order):
//!
//! - every distinct non-empty `args_to_receive` shape gets a 64-bit record
//!   uid from the monotonic allocator; identical shapes within one layer
//!   share a uid;
//! - `ops_to_execute` lists the operation instantiations the layer must run
//!   before analyses and record construction, ordered by intra-call order;
//! - `needs_wrapper` / `needs_receival` are settled.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::error::{Result, WeaverError};
use crate::layout::{InputOrigin, LayerGraph, UidAllocator};
use crate::mapping::{CalculationOrder, MappingInput, MappingStore};
use crate::solver::is_originating;
use crate::spec::{CallId, OperationId, SpecModel};

/// Names of the inputs arriving at a layer for one (call, order)
fn inbound_names(
    model: &SpecModel,
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
) -> Vec<String> {
    let flags = model.call(call).flags;
    let mut names = Vec::new();
    let mut collect = |source: NodeIndex| {
        if let Some(props) = layout.layer(source).props(call, order) {
            for input in &props.args_to_receive {
                if !names.contains(&input.name) {
                    names.push(input.name.clone());
                }
            }
        }
    };
    if flags.wrap_across {
        collect(node);
    } else if flags.wrap_down {
        if let Some(parent) = layout.parent_of(node) {
            collect(parent);
        }
    } else {
        for child in layout.children_of(node) {
            collect(child);
        }
    }
    names
}

/// Schedule the operations a layer must execute for one (call, order).
///
/// An operation instantiation is referenced when its result or length value
/// appears in `used_args` or `args_to_receive`. At the wrap site every
/// referenced operation runs; at receiving layers only those whose result
/// did not arrive in the record. Equivalent instantiations (same operation,
/// same input wiring) collapse onto the one with the lowest intra-call
/// order; an exact tie is a specification error.
fn schedule_operations(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
    inbound: &[String],
) -> Result<Vec<(OperationId, i32)>> {
    let originating = is_originating(model, layout, node, call);
    let props = match layout.layer(node).props(call, order) {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    let mut referenced: Vec<(OperationId, i32, String)> = Vec::new();
    for input in props.used_args.iter().chain(props.args_to_receive.iter()) {
        let (op, mapping_id) = match input.origin {
            InputOrigin::OperationResult { op, mapping_id }
            | InputOrigin::OperationLen { op, mapping_id } => (op, mapping_id),
            _ => continue,
        };
        let result_name = model.operation(op).result_var_name(mapping_id);
        if referenced
            .iter()
            .any(|(o, id, _)| *o == op && *id == mapping_id)
        {
            continue;
        }
        if !originating && inbound.contains(&result_name) {
            continue; // the value arrives in the record
        }
        referenced.push((op, mapping_id, result_name));
    }

    // Collapse equivalent instantiations; lowest intra-call order wins.
    let mut scheduled: Vec<(OperationId, i32, i32)> = Vec::new();
    let mut wiring: HashMap<(OperationId, Vec<MappingInput>), (i32, i32)> = HashMap::new();
    for (op, mapping_id, _) in referenced {
        let mapping = mappings
            .operation_mapping(call, op, mapping_id)
            .ok_or_else(|| {
                WeaverError::unresolved(
                    "operation mapping",
                    format!("{}@{}", model.operation(op).name, mapping_id),
                )
            })?;
        let key = (op, mapping.inputs.clone());
        match wiring.get(&key) {
            Some(&(kept_order, kept_id)) => {
                if mapping.intra_call_order == kept_order && kept_id != mapping_id {
                    return Err(WeaverError::constraint(format!(
                        "operation '{}' mapped twice to '{}' with identical inputs \
                         and intra-call order {}",
                        model.operation(op).name,
                        model.call(call).name,
                        kept_order
                    )));
                }
                if mapping.intra_call_order < kept_order {
                    scheduled.retain(|&(o, id, _)| !(o == key.0 && id == kept_id));
                    wiring.insert(key, (mapping.intra_call_order, mapping_id));
                    scheduled.push((op, mapping_id, mapping.intra_call_order));
                }
            }
            None => {
                wiring.insert(key, (mapping.intra_call_order, mapping_id));
                scheduled.push((op, mapping_id, mapping.intra_call_order));
            }
        }
    }

    scheduled.sort_by_key(|&(_, mapping_id, intra)| (intra, mapping_id));
    Ok(scheduled
        .into_iter()
        .map(|(op, mapping_id, _)| (op, mapping_id))
        .collect())
}

/// Pass C: assign record uids, schedule operations, settle flags.
pub fn finalize(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
    uids: &mut UidAllocator,
) -> Result<()> {
    for node in layout.layers() {
        let mut keys: Vec<(CallId, CalculationOrder)> =
            layout.layer(node).properties.keys().copied().collect();
        keys.sort_by_key(|&(call, order)| (call, order));

        // Seed with already-assigned uids so re-running the pass is a no-op.
        let mut uid_by_shape: HashMap<Vec<(String, String, bool)>, u64> = HashMap::new();
        for props in layout.layer(node).properties.values() {
            if let Some(uid) = props.in_record_uid {
                uid_by_shape.insert(props.args_to_receive.shape_signature(), uid);
            }
        }
        let is_app = layout.layer(node).is_application();
        let has_children = !layout.children_of(node).is_empty();
        let has_parent = layout.parent_of(node).is_some();

        for (call, order) in keys {
            let inbound = inbound_names(model, layout, node, call, order);
            let ops = schedule_operations(model, mappings, layout, node, call, order, &inbound)?;
            let originating = is_originating(model, layout, node, call);
            let flags = model.call(call).flags;

            let props = layout.layer_mut(node).props_mut(call, order);
            props.ops_to_execute = ops;

            let shape = props.args_to_receive.shape_signature();
            if !shape.is_empty() {
                props.in_record_uid =
                    Some(*uid_by_shape.entry(shape).or_insert_with(|| uids.next()));
            }

            let info = props.information_required
                || props.has_local_analyses
                || !props.args_to_receive.is_empty();
            props.needs_wrapper =
                originating && (info || (flags.is_finalizer && is_app));

            let inbound_exists = if flags.wrap_across {
                !props.args_to_receive.is_empty()
            } else if flags.wrap_down {
                has_parent && !inbound.is_empty()
            } else {
                has_children && (!inbound.is_empty() || props.information_required)
            };
            props.needs_receival = !is_app
                && (inbound_exists || flags.is_finalizer || flags.is_notify_finalize);
        }
    }
    Ok(())
}
