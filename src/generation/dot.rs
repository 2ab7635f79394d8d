//! DOT Dumps
//!
//! Graph visualizations for verbose runs: the layer layout, the analysis
//! modules with their dependencies, and per-call mapping graphs. All output
//! is plain GraphViz text written in one piece.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::layout::LayerGraph;
use crate::mapping::{CalculationOrder, MappingStore};
use crate::spec::{CalculationRef, SpecModel};

/// The layer graph with sizes and adjacencies
pub fn write_layout_dot(layout: &LayerGraph, path: &Path) -> Result<()> {
    let mut out = String::new();
    out.push_str("digraph layout {\n");
    out.push_str("  rankdir=BT;\n");
    for node in layout.layers() {
        let layer = layout.layer(node);
        let shape = if layer.is_application() { "house" } else { "box" };
        let _ = writeln!(
            out,
            "  l{} [label=\"layer {}\\nsize {}\" shape={}];",
            layer.order, layer.order, layer.size, shape
        );
    }
    for node in layout.layers() {
        if let Some(parent) = layout.parent_of(node) {
            let _ = writeln!(
                out,
                "  l{} -> l{};",
                layout.layer(node).order,
                layout.layer(parent).order
            );
        }
        if layout.layer(node).intra_comm.is_some() {
            let order = layout.layer(node).order;
            let _ = writeln!(out, "  l{} -> l{} [style=dashed];", order, order);
        }
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

/// Analysis modules and their dependencies; reductions get their own shape
pub fn write_analyses_dot(model: &SpecModel, path: &Path) -> Result<()> {
    let mut out = String::new();
    out.push_str("digraph analyses {\n");
    for (_, module) in model.modules() {
        let color = if module.is_reduction {
            "lightsalmon"
        } else if module.is_added_automagically {
            "lightyellow"
        } else {
            "lightblue"
        };
        let _ = writeln!(
            out,
            "  \"{}\" [style=filled fillcolor={}];",
            module.name, color
        );
    }
    for (_, module) in model.modules() {
        for (dep, soft) in &module.dependencies {
            let style = if *soft { " [style=dotted]" } else { "" };
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\"{};",
                module.name,
                model.module(*dep).name,
                style
            );
        }
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

/// Per-call mapping graphs: which inputs feed which calculations
pub fn write_mappings_dot(
    model: &SpecModel,
    mappings: &MappingStore,
    path: &Path,
) -> Result<()> {
    let mut out = String::new();
    out.push_str("digraph mappings {\n");
    for (call_id, call) in model.calls() {
        let mut body = String::new();
        for order in [CalculationOrder::Pre, CalculationOrder::Post] {
            for mapping in mappings.mappings_of(call_id, order) {
                let calc = model.calculation_name(mapping.calculation);
                let shape = match mapping.calculation {
                    CalculationRef::Analysis(_) => "ellipse",
                    CalculationRef::Operation(_) => "diamond",
                };
                let node_name = format!("{}_{}_{}", call.name, calc, mapping.mapping_id);
                let _ = writeln!(
                    body,
                    "    \"{}\" [label=\"{} ({})\" shape={}];",
                    node_name,
                    calc,
                    order.as_str(),
                    shape
                );
                for input in &mapping.inputs {
                    let _ = writeln!(
                        body,
                        "    \"{}:{}\" -> \"{}\";",
                        call.name,
                        input.display_name(model, call_id).replace('"', ""),
                        node_name
                    );
                }
            }
        }
        if body.is_empty() {
            continue;
        }
        let _ = writeln!(out, "  subgraph \"cluster_{}\" {{", call.name);
        let _ = writeln!(out, "    label=\"{}\";", call.name);
        out.push_str(&body);
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}
