//! API Specification Reader
//!
//! Loads API groups with their calls and populates the mapping store from
//! each call's mapping sections. Parse order per call: the call and all of
//! its arguments are registered first (operation-length arrays resolve the
//! operation in the model, which the analysis specifications filled
//! earlier), then operation mappings attach, then the operation-length
//! arguments are validated against those mappings, then analysis mappings
//! attach.

use std::path::Path;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, WeaverError};
use crate::mapping::{CalculationOrder, MappingInput, MappingStore};
use crate::readers::{parse_document, parse_file, SpecNode};
use crate::spec::{
    ApiGroup, Argument, ArgumentIntent, ArrayLength, CallFlags, CallId, SpecModel,
};

/// Load a set of API specification files
pub fn load_api(
    paths: &[&Path],
    model: &mut SpecModel,
    mappings: &mut MappingStore,
    diags: &mut Diagnostics,
) -> Result<()> {
    for path in paths {
        let label = path.display().to_string();
        let root = parse_file(path)?;
        load_api_node(&root, &label, model, mappings, diags)?;
    }
    Ok(())
}

/// Load an API specification from an in-memory document
pub fn load_api_str(
    input: &str,
    file: &str,
    model: &mut SpecModel,
    mappings: &mut MappingStore,
    diags: &mut Diagnostics,
) -> Result<()> {
    let root = parse_document(input, file)?;
    load_api_node(&root, file, model, mappings, diags)
}

fn load_api_node(
    root: &SpecNode,
    file: &str,
    model: &mut SpecModel,
    mappings: &mut MappingStore,
    diags: &mut Diagnostics,
) -> Result<()> {
    if root.name != "api-specification" {
        return Err(WeaverError::parse(
            file,
            format!("expected <api-specification>, found <{}>", root.name),
        ));
    }
    let group_name = root.required_attr("group", file)?;
    let group = match model.find_api_group(group_name) {
        Some(id) => id,
        None => model.register_api_group(ApiGroup::new(
            group_name,
            root.attr("api-header").map(str::to_string),
        ))?,
    };

    let Some(calls) = root.child("calls") else {
        return Ok(());
    };
    for node in calls.children_named("call") {
        let flags = CallFlags {
            wrapped_everywhere: node.bool_attr("wrapped-everywhere"),
            wrap_across: node.bool_attr("wrap-across"),
            wrap_down: node.bool_attr("wrap-down"),
            is_finalizer: node.bool_attr("finalizer"),
            is_local_finalizer: node.bool_attr("local-finalizer"),
            is_notify_finalize: node.bool_attr("notify-finalize"),
            is_out_of_order: node.bool_attr("out-of-order"),
            is_callback: node.bool_attr("callback"),
            is_hook: node.bool_attr("hook"),
        };
        let call = model.register_call(
            node.required_attr("name", file)?,
            group,
            node.attr("return-type").unwrap_or("void"),
            flags,
        )?;

        if let Some(arguments) = node.child("arguments") {
            for arg in arguments.children_named("argument") {
                let argument = read_argument(arg, file, model)?;
                model.add_call_argument(call, argument)?;
            }
        }

        if let Some(operations) = node.child("operations") {
            for op_node in operations.children_named("operation") {
                attach_operation(op_node, file, call, model, mappings, diags)?;
            }
        }

        validate_length_operations(call, file, model, mappings)?;

        if let Some(analyses) = node.child("analyses") {
            for an_node in analyses.children_named("analysis") {
                attach_analysis(an_node, file, call, model, mappings, diags)?;
            }
        }
    }
    Ok(())
}

fn read_intent(node: &SpecNode, file: &str) -> Result<ArgumentIntent> {
    match node.attr("intent") {
        Some("in") | None => Ok(ArgumentIntent::In),
        Some("out") => Ok(ArgumentIntent::Out),
        Some("inout") => Ok(ArgumentIntent::InOut),
        Some(other) => Err(WeaverError::parse(
            file,
            format!("unknown argument intent '{}'", other),
        )),
    }
}

fn read_argument(node: &SpecNode, file: &str, model: &SpecModel) -> Result<Argument> {
    let name = node.required_attr("name", file)?.to_string();
    let type_name = node.required_attr("type", file)?.to_string();
    let intent = read_intent(node, file)?;

    let mut argument = if let Some(len_arg) = node.attr("array-length-argument") {
        Argument::array_with_length_arg(name, type_name, intent, len_arg)
    } else if let Some(len_op) = node.child("length-operation") {
        let group = model
            .find_analysis_group(len_op.required_attr("group", file)?)
            .ok_or_else(|| {
                WeaverError::unresolved(
                    "analysis group",
                    len_op.attr("group").unwrap_or_default().to_string(),
                )
            })?;
        let op_name = len_op.required_attr("name", file)?;
        let op = model
            .find_operation(group, op_name)
            .ok_or_else(|| WeaverError::unresolved("operation", op_name.to_string()))?;
        let mapping_id: i32 = len_op
            .attr("mapping-id")
            .unwrap_or("0")
            .parse()
            .map_err(|_| WeaverError::parse(file, "invalid mapping-id".to_string()))?;
        Argument {
            name,
            type_name,
            intent,
            type_after_arg: None,
            length: Some(ArrayLength::Operation {
                op,
                mapping_id,
                use_array_len: len_op.bool_attr("use-array-len"),
            }),
        }
    } else {
        Argument::scalar(name, type_name, intent)
    };
    argument.type_after_arg = node.attr("type-after-arg").map(str::to_string);
    Ok(argument)
}

/// Read the `<inputs>` of a mapping section into wired mapping inputs
fn read_mapping_inputs(
    node: Option<&SpecNode>,
    file: &str,
    call: CallId,
    model: &SpecModel,
) -> Result<Vec<MappingInput>> {
    let mut inputs = Vec::new();
    let Some(node) = node else {
        return Ok(inputs);
    };
    for input in node.children_named("input") {
        let wired = match input.required_attr("type", file)? {
            "argument" => {
                let arg_name = input.required_attr("name", file)?;
                let (index, _) = model.call(call).find_argument(arg_name).ok_or_else(|| {
                    WeaverError::unresolved("argument", arg_name.to_string())
                })?;
                MappingInput::Argument { index }
            }
            "operation" => {
                let group = model
                    .find_analysis_group(input.required_attr("group", file)?)
                    .ok_or_else(|| {
                        WeaverError::unresolved(
                            "analysis group",
                            input.attr("group").unwrap_or_default().to_string(),
                        )
                    })?;
                let op_name = input.required_attr("name", file)?;
                let op = model
                    .find_operation(group, op_name)
                    .ok_or_else(|| WeaverError::unresolved("operation", op_name.to_string()))?;
                MappingInput::Operation {
                    op,
                    mapping_id: input
                        .attr("mapping-id")
                        .unwrap_or("0")
                        .parse()
                        .map_err(|_| WeaverError::parse(file, "invalid mapping-id".to_string()))?,
                    use_array_len: input.bool_attr("use-array-len"),
                }
            }
            "call-name" => MappingInput::CallName,
            "call-return" => MappingInput::CallReturn,
            "call-id" => MappingInput::CallId,
            other => {
                return Err(WeaverError::parse(
                    file,
                    format!("unknown input type '{}'", other),
                ))
            }
        };
        inputs.push(wired);
    }
    Ok(inputs)
}

fn read_order(node: &SpecNode, file: &str) -> Result<CalculationOrder> {
    match node.required_attr("order", file)? {
        "pre" => Ok(CalculationOrder::Pre),
        "post" => Ok(CalculationOrder::Post),
        other => Err(WeaverError::parse(
            file,
            format!("unknown calculation order '{}'", other),
        )),
    }
}

fn read_intra_call_order(node: &SpecNode, file: &str) -> Result<i32> {
    node.attr("intra-call-order")
        .unwrap_or("0")
        .parse()
        .map_err(|_| WeaverError::parse(file, "invalid intra-call-order".to_string()))
}

fn attach_operation(
    node: &SpecNode,
    file: &str,
    call: CallId,
    model: &SpecModel,
    mappings: &mut MappingStore,
    diags: &mut Diagnostics,
) -> Result<()> {
    let group = model
        .find_analysis_group(node.required_attr("group", file)?)
        .ok_or_else(|| {
            WeaverError::unresolved(
                "analysis group",
                node.attr("group").unwrap_or_default().to_string(),
            )
        })?;
    let op_name = node.required_attr("name", file)?;
    let op = model
        .find_operation(group, op_name)
        .ok_or_else(|| WeaverError::unresolved("operation", op_name.to_string()))?;
    let inputs = read_mapping_inputs(node.child("inputs"), file, call, model)?;
    mappings.attach_operation(
        model,
        diags,
        call,
        op,
        read_order(node, file)?,
        inputs,
        read_intra_call_order(node, file)?,
    )?;
    Ok(())
}

fn attach_analysis(
    node: &SpecNode,
    file: &str,
    call: CallId,
    model: &SpecModel,
    mappings: &mut MappingStore,
    diags: &mut Diagnostics,
) -> Result<()> {
    let group = model
        .find_analysis_group(node.required_attr("group", file)?)
        .ok_or_else(|| {
            WeaverError::unresolved(
                "analysis group",
                node.attr("group").unwrap_or_default().to_string(),
            )
        })?;
    let function = node.required_attr("function", file)?;
    let analysis = model
        .find_analysis(group, function)
        .ok_or_else(|| WeaverError::unresolved("analysis", function.to_string()))?;
    let inputs = read_mapping_inputs(node.child("inputs"), file, call, model)?;
    let order = read_order(node, file)?;
    let intra = read_intra_call_order(node, file)?;
    if node.bool_attr("reduction") {
        mappings.attach_reduction(model, diags, call, analysis, order, inputs, intra)?;
    } else {
        mappings.attach_analysis(model, diags, call, analysis, order, inputs, intra)?;
    }
    Ok(())
}

/// Operation-length array arguments must reference an operation that is by
/// now mapped to the call under the given mapping id.
fn validate_length_operations(
    call: CallId,
    file: &str,
    model: &SpecModel,
    mappings: &MappingStore,
) -> Result<()> {
    for argument in &model.call(call).arguments {
        if let Some(ArrayLength::Operation { op, mapping_id, .. }) = &argument.length {
            if mappings.operation_mapping(call, *op, *mapping_id).is_none() {
                return Err(WeaverError::parse(
                    file,
                    format!(
                        "argument '{}' of '{}' uses operation '{}'@{} as length, \
                         but no such mapping exists on the call",
                        argument.name,
                        model.call(call).name,
                        model.operation(*op).name,
                        mapping_id
                    ),
                ));
            }
        }
    }
    Ok(())
}
