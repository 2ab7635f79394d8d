//! Local-Use Pass
//!
//! For every layer: the inputs referenced by mappings of analyses hosted on
//! that layer become `used_args` of the mapped (call, order). Operation
//! inputs pull in the operation's own inputs transitively, and array inputs
//! pull in their length sources. Wrap sites additionally see the full
//! argument list of the calls they intercept.

use crate::error::Result;
use crate::layout::{InputOrigin, InputSet, LayerGraph, RecordInput};
use crate::mapping::{CalculationOrder, Mapping, MappingInput, MappingStore};
use crate::spec::{ArrayLength, CallId, SpecModel};

/// Insert one mapping input into a set, together with everything it drags
/// along: length sources for arrays, and an operation's own inputs for
/// operation results.
pub fn insert_with_sources(
    model: &SpecModel,
    mappings: &MappingStore,
    call: CallId,
    input: &MappingInput,
    set: &mut InputSet,
) {
    let Some(record_input) = RecordInput::from_mapping_input(model, call, input) else {
        return; // call-name and call-id inputs are synthesized locally
    };
    if set.contains(&record_input.name) {
        return;
    }
    set.insert(record_input);

    match input {
        MappingInput::Argument { index } => {
            let argument = &model.call(call).arguments[*index];
            match &argument.length {
                Some(ArrayLength::Argument(len_name)) => {
                    if let Some((len_index, _)) = model.call(call).find_argument(len_name) {
                        insert_with_sources(
                            model,
                            mappings,
                            call,
                            &MappingInput::Argument { index: len_index },
                            set,
                        );
                    }
                }
                Some(ArrayLength::Operation {
                    op,
                    mapping_id,
                    use_array_len,
                }) => {
                    insert_with_sources(
                        model,
                        mappings,
                        call,
                        &MappingInput::Operation {
                            op: *op,
                            mapping_id: *mapping_id,
                            use_array_len: *use_array_len,
                        },
                        set,
                    );
                }
                None => {}
            }
        }
        MappingInput::Operation { op, mapping_id, .. } => {
            // The operation must run somewhere; whoever runs it needs its
            // own inputs.
            if let Some(op_mapping) = mappings.operation_mapping(call, *op, *mapping_id) {
                for op_input in &op_mapping.inputs {
                    insert_with_sources(model, mappings, call, op_input, set);
                }
            }
        }
        _ => {}
    }
}

/// Add every input of a mapping to the `used_args` of its (call, order)
fn add_mapping_use(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
    node: petgraph::graph::NodeIndex,
    mapping: &Mapping,
) {
    let mut set = InputSet::new();
    for input in &mapping.inputs {
        insert_with_sources(model, mappings, mapping.call, input, &mut set);
    }
    let props = layout
        .layer_mut(node)
        .props_mut(mapping.call, mapping.order);
    props.used_args.extend(set);
    props.has_local_analyses = true;
}

/// Pass A: compute `used_args` for every (layer, call, order).
pub fn compute_used_args(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
) -> Result<()> {
    let nodes = layout.layers();

    // Wrap-across / wrap-down creation marks come from module placement.
    for &node in &nodes {
        let modules = layout.layer(node).modules.clone();
        for module in modules {
            for &call in &model.module(module).creates {
                for order in [CalculationOrder::Pre, CalculationOrder::Post] {
                    layout
                        .layer_mut(node)
                        .props_mut(call, order)
                        .wrap_across_created_on_level = true;
                }
            }
        }
    }

    // The application wrapper has the full argument list of every
    // intercepted call in scope, plus the return value on the post side.
    // Tool-layer wrap sites contribute only what their analyses consume;
    // scope there never turns into transmission.
    for &node in &nodes {
        if !layout.layer(node).is_application() {
            continue;
        }
        for (call_id, call) in model.calls() {
            if call.flags.wrap_across || call.flags.wrap_down {
                continue;
            }
            for order in [CalculationOrder::Pre, CalculationOrder::Post] {
                let mut set = InputSet::new();
                for (index, _) in call.arguments.iter().enumerate() {
                    insert_with_sources(
                        model,
                        mappings,
                        call_id,
                        &MappingInput::Argument { index },
                        &mut set,
                    );
                }
                if order == CalculationOrder::Post && call.return_type != "void" {
                    set.insert(RecordInput {
                        name: "call_return".to_string(),
                        type_name: call.return_type.clone(),
                        array_length: None,
                        origin: InputOrigin::CallReturn,
                    });
                }
                layout
                    .layer_mut(node)
                    .props_mut(call_id, order)
                    .used_args
                    .extend(set);
            }
        }
    }

    // Inputs of every mapping whose analysis is hosted here. Operation
    // mappings contribute only when referenced (directly or as length
    // sources), which insert_with_sources already covers.
    for &node in &nodes {
        let modules = layout.layer(node).modules.clone();
        for module in modules {
            for &analysis in &model.module(module).analyses {
                for (call_id, _) in model.calls() {
                    for mapping in mappings
                        .mappings_for(crate::spec::CalculationRef::Analysis(analysis), call_id)
                    {
                        add_mapping_use(model, mappings, layout, node, mapping);
                    }
                }
            }
        }
    }

    Ok(())
}
