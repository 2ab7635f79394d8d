//! Wrapper Generator Input
//!
//! One document per layer that intercepts calls. It describes, for every
//! wrapped call, the body the wrapper generator must synthesize: pre
//! operations (with rendered source templates) and pre analyses in
//! intra-call order, record construction and forwarding for the pre side,
//! the delegate call, the mirrored post side, and cleanup in reverse
//! acquisition order. Reducible forwards carry a marker so the generated
//! code guards them with the `avoid_reducible_forwards` flag.

use petgraph::graph::NodeIndex;

use crate::channel_id::ChannelIdPlan;
use crate::error::{Result, WeaverError};
use crate::generation::{
    channel_index, channels_of, hosted_analyses, Channel, OutputNames, XmlDoc,
};
use crate::layout::{CallProperties, ForwardChannel, LayerGraph};
use crate::mapping::{CalculationOrder, MappingStore};
use crate::spec::{AnalysisModuleId, CalculationRef, CallId, SpecModel};

fn headers_of(model: &SpecModel, layout: &LayerGraph, node: NodeIndex) -> Vec<String> {
    let mut headers = Vec::new();
    let mut push = |header: String| {
        if !header.is_empty() && !headers.contains(&header) {
            headers.push(header);
        }
    };
    for (_, group) in model.api_groups() {
        if let Some(header) = &group.api_header {
            push(header.clone());
        }
    }
    for &module in &layout.layer(node).modules {
        push(model.module(module).header_name.clone());
    }
    let mut keys: Vec<_> = layout.layer(node).properties.keys().copied().collect();
    keys.sort_by_key(|&(call, order)| (call, order));
    for key in keys {
        let props = &layout.layer(node).properties[&key];
        for &(op, _) in &props.ops_to_execute {
            for header in &model.operation(op).extra_headers {
                push(header.clone());
            }
        }
    }
    headers
}

/// Collect the (module, function) pairs the document references
fn analysis_table(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    wrapped_calls: &[CallId],
) -> Vec<(AnalysisModuleId, String)> {
    let mut table = Vec::new();
    for &call in wrapped_calls {
        for order in [CalculationOrder::Pre, CalculationOrder::Post] {
            for mapping in hosted_analyses(model, mappings, layout, node, call, order) {
                if let CalculationRef::Analysis(analysis) = mapping.calculation {
                    let entry = (
                        model.analysis(analysis).module,
                        model.analysis(analysis).function_name.clone(),
                    );
                    if !table.contains(&entry) {
                        table.push(entry);
                    }
                }
            }
        }
    }
    table
}

/// The operations to declare in one exec block: everything either side of
/// the call schedules, filtered by the side the operation is mapped to.
/// An operation mapped pre but consumed post still runs pre; its result
/// variable stays in scope across the delegate call.
fn ops_for_block(
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
) -> Vec<(crate::spec::OperationId, i32)> {
    let mut ops = Vec::new();
    for side in [CalculationOrder::Pre, CalculationOrder::Post] {
        if let Some(props) = layout.layer(node).props(call, side) {
            for &(op, mapping_id) in &props.ops_to_execute {
                let mapped_order = mappings
                    .operation_mapping(call, op, mapping_id)
                    .map(|m| m.order);
                if mapped_order == Some(order) && !ops.contains(&(op, mapping_id)) {
                    ops.push((op, mapping_id));
                }
            }
        }
    }
    ops
}

fn write_exec_block(
    doc: &mut XmlDoc,
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
    props: &CallProperties,
    channels: &[Channel],
) -> Result<()> {
    doc.open("exec", &[("order", order.as_str())])?;

    // Operations first, already in execution order.
    for (op, mapping_id) in ops_for_block(mappings, layout, node, call, order) {
        let mapping = mappings
            .operation_mapping(call, op, mapping_id)
            .ok_or_else(|| {
                WeaverError::unresolved(
                    "operation mapping",
                    format!("{}@{}", model.operation(op).name, mapping_id),
                )
            })?;
        let operation = model.operation(op);
        let exprs: Vec<String> = mapping
            .inputs
            .iter()
            .map(|i| i.display_name(model, call))
            .collect();
        let id_text = mapping_id.to_string();
        let mut attrs = vec![
            ("name", operation.name.as_str()),
            ("mapping-id", id_text.as_str()),
            ("return-type", operation.return_type.as_str()),
        ];
        let result_var = operation.result_var_name(mapping_id);
        attrs.push(("result-var", result_var.as_str()));
        let len_var = operation.result_len_var_name(mapping_id);
        let len_type = operation.array_len_type.clone();
        if let Some(len_type) = &len_type {
            attrs.push(("len-var", len_var.as_str()));
            attrs.push(("len-type", len_type.as_str()));
        }
        doc.open("operation", &attrs)?;
        doc.text_element("source", &[], &operation.render_source(&exprs, mapping_id))?;
        if let Some(cleanup) = operation.render_cleanup(&exprs, mapping_id) {
            doc.text_element("cleanup", &[], &cleanup)?;
        }
        doc.close("operation")?;
    }

    // Analyses in intra-call order.
    for mapping in hosted_analyses(model, mappings, layout, node, call, order) {
        let CalculationRef::Analysis(analysis_id) = mapping.calculation else {
            continue;
        };
        let analysis = model.analysis(analysis_id);
        let module = model.module(analysis.module);
        let reducible = mapping.is_reduction && layout.layer(node).may_reduce(analysis.module);
        doc.open(
            "analysis",
            &[
                ("function", analysis.function_name.as_str()),
                ("module", module.module_name.as_str()),
                ("reducible", if reducible { "yes" } else { "no" }),
                (
                    "needs-channel-id",
                    if analysis.needs_channel_id { "yes" } else { "no" },
                ),
            ],
        )?;
        for input in &mapping.inputs {
            doc.text_element("input", &[], &input.display_name(model, call))?;
        }
        doc.close("analysis")?;
    }

    // Record construction and forwarding for this side.
    if !props.args_to_receive.is_empty() {
        let uid = props
            .in_record_uid
            .ok_or_else(|| {
                WeaverError::constraint(format!(
                    "call '{}' has a non-empty receive set but no record uid",
                    model.call(call).name
                ))
            })?
            .to_string();
        doc.open("record", &[("uid", uid.as_str())])?;
        for input in props.args_to_receive.record_shape() {
            let mut attrs = vec![
                ("name", input.name.as_str()),
                ("type", input.type_name.as_str()),
            ];
            if let Some(length) = &input.array_length {
                attrs.push(("array-length", length.as_str()));
            }
            doc.empty("element", &attrs)?;
        }
        doc.close("record")?;

        let flags = model.call(call).flags;
        let reducible = layout
            .layer(node)
            .reduction_forwards
            .contains_key(&(call, order));
        doc.open("forwarding", &[])?;
        for (index, channel) in channels.iter().enumerate() {
            let emit = if flags.wrap_across {
                channel.kind == "intra"
            } else if flags.wrap_down {
                channel.kind == "down"
            } else {
                channel.kind == "up"
            };
            if !emit {
                continue;
            }
            let index_text = index.to_string();
            doc.empty(
                "forward",
                &[
                    ("channel", index_text.as_str()),
                    ("reducible", if reducible { "yes" } else { "no" }),
                ],
            )?;
        }
        doc.close("forwarding")?;
    }

    doc.close("exec")
}

/// Emit the wrapper generator input for one layer.
///
/// Returns `None` when no call needs a wrapper on this layer.
pub fn emit_wrapper_input(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    plan: &ChannelIdPlan,
    names: &OutputNames,
) -> Result<Option<XmlDoc>> {
    let layer = layout.layer(node);
    let mut wrapped_calls: Vec<CallId> = Vec::new();
    for (call_id, _) in model.calls() {
        let wrapped = [CalculationOrder::Pre, CalculationOrder::Post]
            .iter()
            .any(|&o| layer.props(call_id, o).is_some_and(|p| p.needs_wrapper));
        if wrapped {
            wrapped_calls.push(call_id);
        }
    }
    if wrapped_calls.is_empty() {
        return Ok(None);
    }
    wrapped_calls.sort_unstable();

    let channels = channels_of(model, layout, node);
    let order_text = layer.order.to_string();

    let mut doc = XmlDoc::new();
    doc.open("wrapper-gen-input", &[("level", order_text.as_str())])?;

    doc.open("settings", &[])?;
    doc.text_element("source-file", &[], &names.source.display().to_string())?;
    doc.text_element("header-file", &[], &names.header.display().to_string())?;
    doc.text_element("log-file", &[], &names.log.display().to_string())?;
    doc.close("settings")?;

    doc.open("headers", &[])?;
    for header in headers_of(model, layout, node) {
        doc.text_element("header", &[], &header)?;
    }
    doc.close("headers")?;

    let bits = plan.bits_per_sub_id.to_string();
    let words = plan.num_words.to_string();
    doc.empty(
        "channel-id",
        &[
            ("num-words", words.as_str()),
            ("bits-per-channel", bits.as_str()),
            ("base-arg-name", crate::channel_id::CHANNEL_ID_ARG_BASE),
        ],
    )?;

    doc.open("communications", &[])?;
    for (index, channel) in channels.iter().enumerate() {
        let index_text = index.to_string();
        let mut attrs = vec![
            ("id", index_text.as_str()),
            ("kind", channel.kind),
            ("module", channel.module_name.as_str()),
        ];
        let to_level = channel.to_level.map(|l| l.to_string());
        if let Some(level) = &to_level {
            attrs.push(("to-level", level.as_str()));
        }
        doc.empty("communication", &attrs)?;
    }
    doc.close("communications")?;

    doc.open("analyses", &[])?;
    for (index, (module, function)) in analysis_table(model, mappings, layout, node, &wrapped_calls)
        .iter()
        .enumerate()
    {
        let index_text = index.to_string();
        doc.empty(
            "analysis",
            &[
                ("id", index_text.as_str()),
                ("module", model.module(*module).module_name.as_str()),
                ("function", function.as_str()),
            ],
        )?;
    }
    doc.close("analyses")?;

    doc.open("calls", &[])?;
    for &call_id in &wrapped_calls {
        let call = model.call(call_id);
        let uid_text = call.unique_id.to_string();
        doc.open(
            "call",
            &[
                ("name", call.name.as_str()),
                ("group", model.api_group(call.group).name.as_str()),
                ("return-type", call.return_type.as_str()),
                ("unique-id", uid_text.as_str()),
                ("finalizer", if call.flags.is_finalizer { "yes" } else { "no" }),
                (
                    "local-finalizer",
                    if call.flags.is_local_finalizer { "yes" } else { "no" },
                ),
            ],
        )?;

        doc.open("arguments", &[])?;
        for argument in &call.arguments {
            let mut attrs = vec![
                ("name", argument.name.as_str()),
                ("type", argument.type_name.as_str()),
                ("intent", argument.intent.as_str()),
            ];
            if let Some(suffix) = &argument.type_after_arg {
                attrs.push(("type-after-arg", suffix.as_str()));
            }
            doc.empty("argument", &attrs)?;
        }
        doc.close("arguments")?;

        for order in [CalculationOrder::Pre, CalculationOrder::Post] {
            if let Some(props) = layout.layer(node).props(call_id, order) {
                write_exec_block(
                    &mut doc, model, mappings, layout, node, call_id, order, props, &channels,
                )?;
            }
        }

        // Where a reduction upstream may already have absorbed the event,
        // the generator wires the runtime guard for this call.
        let guarded = [CalculationOrder::Pre, CalculationOrder::Post].iter().any(|&o| {
            layout
                .layer(node)
                .reduction_forwards
                .contains_key(&(call_id, o))
        });
        if guarded {
            let up = channel_index(&channels, ForwardChannel::Up)
                .map(|i| i.to_string())
                .unwrap_or_default();
            doc.empty(
                "avoid-reducible-forwards",
                &[("channel", up.as_str())],
            )?;
        }

        doc.close("call")?;
    }
    doc.close("calls")?;

    doc.close("wrapper-gen-input")?;
    Ok(Some(doc))
}
