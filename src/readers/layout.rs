//! Layout Specification Reader
//!
//! Builds the layer graph: levels with size, place and analysis-module
//! placements, inter-layer connections with their communication and
//! distribution policy, optional intra-communications, and merge
//! directives for the module-configuration emitter. Settings on strategies
//! and protocols are validated against their descriptions.

use std::path::Path;

use crate::error::{Result, WeaverError};
use crate::layout::{Communication, Distribution, LayerGraph};
use crate::readers::{parse_document, parse_file, SpecNode};
use crate::spec::{Setting, SettingsDescription, SpecModel};

/// Load the layout specification file
pub fn load_layout(path: &Path, model: &SpecModel) -> Result<LayerGraph> {
    let label = path.display().to_string();
    let root = parse_file(path)?;
    load_layout_node(&root, &label, model)
}

/// Load a layout specification from an in-memory document
pub fn load_layout_str(input: &str, file: &str, model: &SpecModel) -> Result<LayerGraph> {
    let root = parse_document(input, file)?;
    load_layout_node(&root, file, model)
}

fn load_layout_node(root: &SpecNode, file: &str, model: &SpecModel) -> Result<LayerGraph> {
    if root.name != "layout-specification" {
        return Err(WeaverError::parse(
            file,
            format!("expected <layout-specification>, found <{}>", root.name),
        ));
    }

    let mut layout = LayerGraph::new();

    if let Some(default) = root.child("default-communication") {
        layout.default_comm = Some(read_communication(default, file, model)?);
    }

    let levels = root
        .child("levels")
        .ok_or_else(|| WeaverError::parse(file, "layout has no <levels>".to_string()))?;
    for node in levels.children_named("level") {
        let order: u32 = node
            .required_attr("order", file)?
            .parse()
            .map_err(|_| WeaverError::parse(file, "invalid level order".to_string()))?;
        let size: u64 = node
            .required_attr("size", file)?
            .parse()
            .map_err(|_| WeaverError::parse(file, "invalid level size".to_string()))?;
        let place = match node.attr("place") {
            Some(name) => Some(
                model
                    .find_place(name)
                    .ok_or_else(|| WeaverError::unresolved("place", name.to_string()))?,
            ),
            None => None,
        };
        if order == 0 && place.is_some() {
            return Err(WeaverError::layout(
                "the application layer cannot have a place",
            ));
        }
        layout.add_layer(order, size, place)?;

        if let Some(analyses) = node.child("analyses") {
            for module_node in analyses.children_named("analysis-module") {
                let name = module_node.required_attr("name", file)?;
                let module = model
                    .find_module(name)
                    .ok_or_else(|| WeaverError::unresolved("analysis module", name.to_string()))?;
                layout.assign_module(model, order, module)?;
            }
        }

        if let Some(intra) = node.child("intra-communication") {
            let comm = read_communication(intra, file, model)?;
            let strategy = model.strategy(comm.strategy);
            if !strategy.is_intra() {
                return Err(WeaverError::layout(format!(
                    "strategy '{}' on level {} is not an intra strategy",
                    strategy.name(),
                    order
                )));
            }
            if !model.protocol(comm.protocol).supports_intra {
                return Err(WeaverError::layout(format!(
                    "protocol '{}' on level {} does not support intra communication",
                    model.protocol(comm.protocol).name,
                    order
                )));
            }
            layout.set_intra_comm(order, comm)?;
        }
    }

    if let Some(connections) = root.child("connections") {
        for node in connections.children_named("connection") {
            let from: u32 = node
                .required_attr("from", file)?
                .parse()
                .map_err(|_| WeaverError::parse(file, "invalid connection source".to_string()))?;
            let to: u32 = node
                .required_attr("to", file)?
                .parse()
                .map_err(|_| WeaverError::parse(file, "invalid connection target".to_string()))?;
            let distribution = match node.attr("distribution") {
                Some("uniform") | None => Distribution::Uniform,
                Some("by-block") => {
                    let block: u64 = node
                        .attr("blocksize")
                        .unwrap_or("1")
                        .parse()
                        .map_err(|_| {
                            WeaverError::parse(file, "invalid blocksize".to_string())
                        })?;
                    Distribution::ByBlock(block)
                }
                Some(other) => {
                    return Err(WeaverError::parse(
                        file,
                        format!("unknown distribution '{}'", other),
                    ))
                }
            };
            let comm = match node.child("communication") {
                Some(c) => read_communication(c, file, model)?,
                None => layout.default_comm.clone().ok_or_else(|| {
                    WeaverError::layout(format!(
                        "connection {} -> {} configures no communication and the \
                         layout has no default",
                        from, to
                    ))
                })?,
            };
            let strategy = model.strategy(comm.strategy);
            if strategy.is_intra() {
                return Err(WeaverError::layout(format!(
                    "connection {} -> {} uses intra strategy '{}'",
                    from,
                    to,
                    strategy.name()
                )));
            }
            layout.connect(from, to, comm, distribution)?;
        }
    }

    if let Some(merges) = root.child("merges") {
        for node in merges.children_named("merge") {
            let higher: u32 = node
                .required_attr("higher", file)?
                .parse()
                .map_err(|_| WeaverError::parse(file, "invalid merge level".to_string()))?;
            let lower: u32 = node
                .required_attr("lower", file)?
                .parse()
                .map_err(|_| WeaverError::parse(file, "invalid merge level".to_string()))?;
            layout.merges.push((higher, lower));
        }
    }

    Ok(layout)
}

/// Read a `<communication>`-like element: strategy + protocol references
/// plus their validated settings.
fn read_communication(node: &SpecNode, file: &str, model: &SpecModel) -> Result<Communication> {
    let strategy_name = node.required_attr("strategy", file)?;
    let strategy = model
        .find_strategy(strategy_name)
        .ok_or_else(|| WeaverError::unresolved("communication strategy", strategy_name))?;
    let protocol_name = node.required_attr("protocol", file)?;
    let protocol = model
        .find_protocol(protocol_name)
        .ok_or_else(|| WeaverError::unresolved("communication protocol", protocol_name))?;

    let mut comm = Communication::new(strategy, protocol);
    comm.strategy_settings = read_settings(
        node.child("strategy-settings"),
        model.strategy(strategy).settings(),
        model,
        file,
    )?;
    comm.protocol_settings = read_settings(
        node.child("protocol-settings"),
        &model.protocol(protocol).settings,
        model,
        file,
    )?;
    Ok(comm)
}

/// Read and validate concrete `<setting name value/>` pairs
pub fn read_settings(
    node: Option<&SpecNode>,
    descriptions: &SettingsDescription,
    model: &SpecModel,
    file: &str,
) -> Result<Vec<Setting>> {
    let mut settings = Vec::new();
    let Some(node) = node else {
        return Ok(settings);
    };
    for setting in node.children_named("setting") {
        let name = setting.required_attr("name", file)?;
        let value = setting.required_attr("value", file)?;
        let description = descriptions
            .find(name)
            .ok_or_else(|| WeaverError::unresolved("setting", name.to_string()))?;
        let enum_entries = match &description.kind {
            crate::spec::SettingKind::Enum { list }
            | crate::spec::SettingKind::EnumSelection { list, .. } => Some(
                model
                    .find_enum(list)
                    .ok_or_else(|| WeaverError::unresolved("enumeration", list.clone()))?
                    .entries
                    .clone(),
            ),
            _ => None,
        };
        description.validate(value, enum_entries.as_deref())?;
        settings.push(Setting::new(name, value));
    }
    Ok(settings)
}
