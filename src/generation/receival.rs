//! Receival Generator Input
//!
//! One document per layer with an inbound side. It describes the channel-id
//! plan (so the generated channel function can extract the originating
//! sub-channel), the analyses placed on the layer, and one dispatch handler
//! per inbound record uid: deserialize, run operations and analyses in
//! intra-call order, then forward, deliver intra, or broadcast down as the
//! layer's edges require.

use petgraph::graph::NodeIndex;

use crate::channel_id::{ChannelIdPlan, CHANNEL_ID_ARG_BASE};
use crate::error::{Result, WeaverError};
use crate::generation::{channels_of, hosted_analyses, OutputNames, XmlDoc};
use crate::layout::{CallProperties, LayerGraph};
use crate::mapping::{CalculationOrder, MappingStore};
use crate::spec::{CalculationRef, CallId, SpecModel};

/// One inbound record at a layer
struct InboundRecord<'a> {
    call: CallId,
    order: CalculationOrder,
    from_level: u32,
    uid: u64,
    props: &'a CallProperties,
}

/// Collect the records arriving at a layer: children's outbound sets for
/// upward events, the parent's for wrap-down events, the layer's own for
/// wrap-across events.
fn inbound_records<'a>(
    model: &SpecModel,
    layout: &'a LayerGraph,
    node: NodeIndex,
) -> Vec<InboundRecord<'a>> {
    let mut records = Vec::new();
    let mut collect = |source: NodeIndex| {
        let source_layer = layout.layer(source);
        let mut keys: Vec<(CallId, CalculationOrder)> =
            source_layer.properties.keys().copied().collect();
        keys.sort_by_key(|&(call, order)| (call, order));
        for (call, order) in keys {
            let flags = model.call(call).flags;
            let from_self = source == node;
            if flags.wrap_across != from_self {
                continue;
            }
            let arrives_from_parent = layout.parent_of(node) == Some(source);
            if flags.wrap_down != arrives_from_parent && !from_self {
                continue;
            }
            let Some(props) = source_layer.props(call, order) else {
                continue;
            };
            if let Some(uid) = props.in_record_uid {
                records.push(InboundRecord {
                    call,
                    order,
                    from_level: source_layer.order,
                    uid,
                    props,
                });
            }
        }
    };

    for child in layout.children_of(node) {
        collect(child);
    }
    if let Some(parent) = layout.parent_of(node) {
        collect(parent);
    }
    collect(node); // wrap-across records loop within the layer
    records
}

/// Emit the receival generator input for one layer.
///
/// Returns `None` when no call needs a receival module on this layer.
pub fn emit_receival_input(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    plan: &ChannelIdPlan,
    names: &OutputNames,
) -> Result<Option<XmlDoc>> {
    let layer = layout.layer(node);
    let needed = layer
        .properties
        .values()
        .any(|props| props.needs_receival);
    if !needed {
        return Ok(None);
    }

    let channels = channels_of(model, layout, node);
    let records = inbound_records(model, layout, node);
    let order_text = layer.order.to_string();

    let mut doc = XmlDoc::new();
    doc.open("receival-gen-input", &[("level", order_text.as_str())])?;

    doc.open("settings", &[])?;
    doc.text_element("source-file", &[], &names.source.display().to_string())?;
    doc.text_element("header-file", &[], &names.header.display().to_string())?;
    doc.text_element("log-file", &[], &names.log.display().to_string())?;
    doc.close("settings")?;

    // The channel function extracts the originating sub-channel from these
    // record arguments.
    let from_level = layout
        .children_of(node)
        .first()
        .map(|&c| layout.layer(c).order)
        .unwrap_or(layer.order);
    let attrs_owned = [
        ("from-level", from_level.to_string()),
        ("num-levels", layout.len().to_string()),
        ("num-words", plan.num_words.to_string()),
        ("bits-per-channel", plan.bits_per_sub_id.to_string()),
        ("base-arg-name", CHANNEL_ID_ARG_BASE.to_string()),
        ("start-index-pre", plan.start_index_pre().to_string()),
        ("start-index-post", plan.start_index_post().to_string()),
    ];
    let attrs: Vec<(&str, &str)> = attrs_owned
        .iter()
        .map(|(k, v)| (*k, v.as_str()))
        .collect();
    doc.empty("channel-id", &attrs)?;

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

    doc.open("records", &[])?;
    for record in &records {
        let call = model.call(record.call);
        let uid_text = record.uid.to_string();
        let from_text = record.from_level.to_string();
        let call_uid_text = call.unique_id.to_string();
        doc.open(
            "record",
            &[
                ("uid", uid_text.as_str()),
                ("call", call.name.as_str()),
                ("call-id", call_uid_text.as_str()),
                ("order", record.order.as_str()),
                ("from-level", from_text.as_str()),
            ],
        )?;

        for input in record.props.args_to_receive.record_shape() {
            let mut attrs = vec![
                ("name", input.name.as_str()),
                ("type", input.type_name.as_str()),
            ];
            if let Some(length) = &input.array_length {
                attrs.push(("array-length", length.as_str()));
            }
            doc.empty("element", &attrs)?;
        }

        write_record_exec(&mut doc, model, mappings, layout, node, record)?;
        write_record_forwards(&mut doc, model, layout, node, record, &channels)?;

        doc.close("record")?;
    }
    doc.close("records")?;

    doc.close("receival-gen-input")?;
    Ok(Some(doc))
}

/// Operations and analyses the layer runs when this record arrives
fn write_record_exec(
    doc: &mut XmlDoc,
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    record: &InboundRecord<'_>,
) -> Result<()> {
    doc.open("exec", &[])?;

    let own_props = layout.layer(node).props(record.call, record.order);
    if let Some(props) = own_props {
        for &(op, mapping_id) in &props.ops_to_execute {
            let mapping = mappings
                .operation_mapping(record.call, op, mapping_id)
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
                .map(|i| i.display_name(model, record.call))
                .collect();
            let id_text = mapping_id.to_string();
            let result_var = operation.result_var_name(mapping_id);
            doc.open(
                "operation",
                &[
                    ("name", operation.name.as_str()),
                    ("mapping-id", id_text.as_str()),
                    ("return-type", operation.return_type.as_str()),
                    ("result-var", result_var.as_str()),
                ],
            )?;
            doc.text_element("source", &[], &operation.render_source(&exprs, mapping_id))?;
            if let Some(cleanup) = operation.render_cleanup(&exprs, mapping_id) {
                doc.text_element("cleanup", &[], &cleanup)?;
            }
            doc.close("operation")?;
        }
    }

    for mapping in hosted_analyses(model, mappings, layout, node, record.call, record.order) {
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
            doc.text_element("input", &[], &input.display_name(model, record.call))?;
        }
        doc.close("analysis")?;
    }

    doc.close("exec")
}

/// Where the record travels after local processing
fn write_record_forwards(
    doc: &mut XmlDoc,
    model: &SpecModel,
    layout: &LayerGraph,
    node: NodeIndex,
    record: &InboundRecord<'_>,
    channels: &[crate::generation::Channel],
) -> Result<()> {
    let flags = model.call(record.call).flags;
    let own_props = layout.layer(node).props(record.call, record.order);
    let own_outbound = own_props
        .map(|p| !p.args_to_receive.is_empty() || p.information_required)
        .unwrap_or(false);
    let reducible = layout
        .layer(node)
        .reduction_forwards
        .contains_key(&(record.call, record.order));
    let own_uid = own_props.and_then(|p| p.in_record_uid);

    doc.open("forwards", &[])?;
    for (index, channel) in channels.iter().enumerate() {
        let emit = if flags.wrap_across {
            false // across records end on the receiving processes
        } else if flags.wrap_down {
            channel.kind == "down"
        } else {
            channel.kind == "up" && own_outbound
        };
        if !emit {
            continue;
        }
        let index_text = index.to_string();
        let uid_text = own_uid.map(|u| u.to_string()).unwrap_or_default();
        let mut attrs = vec![
            ("channel", index_text.as_str()),
            ("kind", channel.kind),
            ("reducible", if reducible { "yes" } else { "no" }),
        ];
        if !uid_text.is_empty() {
            attrs.push(("out-uid", uid_text.as_str()));
        }
        doc.empty("forward", &attrs)?;
    }
    doc.close("forwards")
}
