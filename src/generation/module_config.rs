//! Module-Configuration Input
//!
//! Lists, for every layer, the module instances the stacking runtime must
//! materialize, with settings and cross-instance references. Emission order
//! inside a layer: place, strategies, protocols, wrappers, receivals,
//! analyses. Prepended modules of a building block become instances right
//! before it. Each layer gets its own document unless a merge directive
//! moves a (higher) layer's instances into a lower layer's document; the
//! originating layer id is preserved on the instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::graph::NodeIndex;

use crate::error::{Result, WeaverError};
use crate::generation::XmlDoc;
use crate::layout::{Communication, LayerGraph};
use crate::spec::{
    CommStrategy, ModuleInfo, PlaceKind, Setting, SettingsDescription, SpecModel,
};

/// Kind tag of a module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Analysis,
    Wrapper,
    Receival,
    Place,
    ProtocolUp,
    ProtocolDown,
    Strategy,
}

impl InstanceKind {
    fn as_str(&self) -> &'static str {
        match self {
            InstanceKind::Analysis => "analysis",
            InstanceKind::Wrapper => "wrapper",
            InstanceKind::Receival => "receival",
            InstanceKind::Place => "place",
            InstanceKind::ProtocolUp => "protocol-up",
            InstanceKind::ProtocolDown => "protocol-down",
            InstanceKind::Strategy => "strategy",
        }
    }
}

/// One module instance of a layer
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub load_name: String,
    pub kind: InstanceKind,
    /// Layer the instance belongs to (kept across merges)
    pub layer_order: u32,
    pub to_level: Option<u32>,
    pub settings: Vec<Setting>,
    /// Instance ids this instance depends on
    pub uses: Vec<String>,
}

/// Settings for an instance: configured values first, then defaults for
/// everything the description declares but the layout left unset.
fn settings_with_defaults(
    configured: &[Setting],
    description: &SettingsDescription,
) -> Vec<Setting> {
    let mut settings: Vec<Setting> = configured.to_vec();
    for desc in description.iter() {
        if !settings.iter().any(|s| s.name == desc.name) && !desc.default.is_empty() {
            settings.push(Setting::new(desc.name.clone(), desc.default.clone()));
        }
    }
    settings
}

/// Builds the instance list of one layer
struct LayerInstances<'a> {
    model: &'a SpecModel,
    layer_order: u32,
    next_id: usize,
    instances: Vec<Instance>,
}

impl<'a> LayerInstances<'a> {
    fn new(model: &'a SpecModel, layer_order: u32) -> Self {
        LayerInstances {
            model,
            layer_order,
            next_id: 0,
            instances: Vec::new(),
        }
    }

    fn fresh_id(&mut self, kind: InstanceKind) -> String {
        let id = format!("l{}_{}_{}", self.layer_order, kind.as_str(), self.next_id);
        self.next_id += 1;
        id
    }

    /// Materialize prepended modules of a building block, then the block
    /// itself. Returns the instance id of the block.
    fn push_module(
        &mut self,
        info: &ModuleInfo,
        kind: InstanceKind,
        to_level: Option<u32>,
        settings: Vec<Setting>,
    ) -> String {
        for prepended in &info.prepended {
            let id = self.fresh_id(kind);
            self.instances.push(Instance {
                id,
                load_name: prepended.clone(),
                kind,
                layer_order: self.layer_order,
                to_level,
                settings: Vec::new(),
                uses: Vec::new(),
            });
        }
        let id = self.fresh_id(kind);
        self.instances.push(Instance {
            id: id.clone(),
            load_name: info.module_name.clone(),
            kind,
            layer_order: self.layer_order,
            to_level,
            settings,
            uses: Vec::new(),
        });
        id
    }

    /// Materialize all channels: every strategy half first, then every
    /// protocol, with each strategy referencing its protocol instance.
    fn push_channels(&mut self, channels: &[(Communication, bool, u32)]) {
        let mut strategy_ids = Vec::new();
        for (comm, upward, to_level) in channels {
            let strategy = self.model.strategy(comm.strategy);
            let settings = settings_with_defaults(&comm.strategy_settings, strategy.settings());
            let info = match strategy {
                CommStrategy::Inter { up, down, .. } => {
                    if *upward {
                        up
                    } else {
                        down
                    }
                }
                CommStrategy::Intra { module, .. } => module,
            };
            strategy_ids.push(self.push_module(
                info,
                InstanceKind::Strategy,
                Some(*to_level),
                settings,
            ));
        }
        for ((comm, upward, to_level), strategy_id) in channels.iter().zip(strategy_ids) {
            let protocol = self.model.protocol(comm.protocol);
            let settings = settings_with_defaults(&comm.protocol_settings, &protocol.settings);
            let kind = if *upward {
                InstanceKind::ProtocolUp
            } else {
                InstanceKind::ProtocolDown
            };
            let protocol_id =
                self.push_module(&protocol.module, kind, Some(*to_level), settings);
            if let Some(instance) = self.instances.iter_mut().find(|i| i.id == strategy_id) {
                instance.uses.push(protocol_id);
            }
        }
    }
}

/// Build the instance list of one layer in emission order
fn build_layer_instances(
    model: &SpecModel,
    layout: &LayerGraph,
    node: NodeIndex,
) -> Vec<Instance> {
    let layer = layout.layer(node);
    let mut builder = LayerInstances::new(model, layer.order);

    // Place first.
    if let Some(place_id) = layer.place {
        let place = model.place(place_id);
        let settings = settings_with_defaults(&[], &place.settings);
        match &place.kind {
            PlaceKind::Module(info) => {
                builder.push_module(info, InstanceKind::Place, None, settings);
            }
            PlaceKind::Executable { command } => {
                let id = builder.fresh_id(InstanceKind::Place);
                builder.instances.push(Instance {
                    id,
                    load_name: command.clone(),
                    kind: InstanceKind::Place,
                    layer_order: layer.order,
                    to_level: None,
                    settings,
                    uses: Vec::new(),
                });
            }
        }
    }

    // Channels: the upward edge, one downward half per in-edge, intra last.
    let mut channels: Vec<(Communication, bool, u32)> = Vec::new();
    if let Some(parent) = layout.parent_of(node) {
        if let Some(adjacency) = layout.out_adjacency(node) {
            channels.push((adjacency.comm.clone(), true, layout.layer(parent).order));
        }
    }
    for child in layout.children_of(node) {
        if let Some(adjacency) = layout.out_adjacency(child) {
            channels.push((adjacency.comm.clone(), false, layout.layer(child).order));
        }
    }
    if let Some(intra) = &layer.intra_comm {
        channels.push((intra.clone(), true, layer.order));
    }
    builder.push_channels(&channels);

    // Wrapper and receival modules synthesized for this layer.
    let needs_wrapper = layer.properties.values().any(|p| p.needs_wrapper);
    let needs_receival = layer.properties.values().any(|p| p.needs_receival);
    let mut wrapper_instance = None;
    let mut receival_instance = None;
    if needs_wrapper {
        let id = builder.fresh_id(InstanceKind::Wrapper);
        builder.instances.push(Instance {
            id: id.clone(),
            load_name: format!("weaver_wrapper_l{}", layer.order),
            kind: InstanceKind::Wrapper,
            layer_order: layer.order,
            to_level: None,
            settings: Vec::new(),
            uses: Vec::new(),
        });
        wrapper_instance = Some(id);
    }
    if needs_receival {
        let id = builder.fresh_id(InstanceKind::Receival);
        builder.instances.push(Instance {
            id: id.clone(),
            load_name: format!("weaver_receival_l{}", layer.order),
            kind: InstanceKind::Receival,
            layer_order: layer.order,
            to_level: None,
            settings: Vec::new(),
            uses: Vec::new(),
        });
        receival_instance = Some(id);
    }

    // Analyses, each knowing its hard dependencies.
    let mut analysis_instances: HashMap<crate::spec::AnalysisModuleId, String> = HashMap::new();
    for &module_id in &layer.modules {
        let module = model.module(module_id);
        let id = builder.fresh_id(InstanceKind::Analysis);
        builder.instances.push(Instance {
            id: id.clone(),
            load_name: module.module_name.clone(),
            kind: InstanceKind::Analysis,
            layer_order: layer.order,
            to_level: None,
            settings: Vec::new(),
            uses: Vec::new(),
        });
        analysis_instances.insert(module_id, id);
    }
    for &module_id in &layer.modules {
        let module = model.module(module_id);
        let own_id = analysis_instances[&module_id].clone();
        let mut uses = Vec::new();
        for dep in module.hard_dependencies() {
            if let Some(dep_id) = analysis_instances.get(&dep) {
                uses.push(dep_id.clone());
            }
        }
        if let Some(instance) = builder.instances.iter_mut().find(|i| i.id == own_id) {
            instance.uses = uses;
        }
    }

    // The synthesized modules call into every analysis instance.
    let analysis_ids: Vec<String> = builder
        .instances
        .iter()
        .filter(|i| i.kind == InstanceKind::Analysis)
        .map(|i| i.id.clone())
        .collect();
    for id in [wrapper_instance, receival_instance].into_iter().flatten() {
        if let Some(instance) = builder.instances.iter_mut().find(|i| i.id == id) {
            instance.uses.extend(analysis_ids.iter().cloned());
        }
    }

    builder.instances
}

fn write_level(
    doc: &mut XmlDoc,
    layout: &LayerGraph,
    node: NodeIndex,
    instances: &[Instance],
) -> Result<()> {
    let layer = layout.layer(node);
    let order_text = layer.order.to_string();
    let size_text = layer.size.to_string();
    doc.open(
        "level",
        &[("order", order_text.as_str()), ("size", size_text.as_str())],
    )?;
    for instance in instances {
        let origin_text = instance.layer_order.to_string();
        let mut attrs = vec![
            ("id", instance.id.as_str()),
            ("name", instance.load_name.as_str()),
            ("kind", instance.kind.as_str()),
            ("origin-level", origin_text.as_str()),
        ];
        let to_level = instance.to_level.map(|l| l.to_string());
        if let Some(level) = &to_level {
            attrs.push(("to-level", level.as_str()));
        }
        doc.open("instance", &attrs)?;
        if !instance.settings.is_empty() {
            doc.open("settings", &[])?;
            for setting in &instance.settings {
                doc.empty(
                    "setting",
                    &[
                        ("name", setting.name.as_str()),
                        ("value", setting.value.as_str()),
                    ],
                )?;
            }
            doc.close("settings")?;
        }
        if !instance.uses.is_empty() {
            doc.open("uses", &[])?;
            for used in &instance.uses {
                doc.empty("instance-ref", &[("id", used.as_str())])?;
            }
            doc.close("uses")?;
        }
        doc.close("instance")?;
    }
    doc.close("level")
}

/// Emit one module-configuration document per layer, honoring merges.
///
/// Returns the written file paths in layer order.
pub fn emit_module_config(
    model: &SpecModel,
    layout: &LayerGraph,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    // A merge (higher, lower) routes the higher layer into the lower
    // layer's document. Chains are allowed in any declaration order
    // ((2,1) before (1,0) must land layer 2 in layer 0's document), so
    // the targets resolve to a fixed point afterwards.
    let mut document_of: HashMap<u32, u32> = HashMap::new();
    for node in layout.layers() {
        let order = layout.layer(node).order;
        document_of.insert(order, order);
    }
    for &(higher, lower) in &layout.merges {
        if !document_of.contains_key(&higher) || !document_of.contains_key(&lower) {
            return Err(WeaverError::layout(format!(
                "merge directive {} -> {} references an unknown layer",
                higher, lower
            )));
        }
        document_of.insert(higher, lower);
    }
    let orders: Vec<u32> = document_of.keys().copied().collect();
    for &order in &orders {
        let mut target = document_of[&order];
        let mut hops = 0;
        while document_of[&target] != target {
            target = document_of[&target];
            hops += 1;
            if hops > orders.len() {
                return Err(WeaverError::layout(format!(
                    "merge directives form a cycle at layer {}",
                    order
                )));
            }
        }
        document_of.insert(order, target);
    }

    let mut written = Vec::new();
    for doc_node in layout.layers() {
        let doc_order = layout.layer(doc_node).order;
        if document_of[&doc_order] != doc_order {
            continue; // merged into another document
        }
        let mut members: Vec<NodeIndex> = layout
            .layers()
            .into_iter()
            .filter(|&n| document_of[&layout.layer(n).order] == doc_order)
            .collect();
        members.sort_by_key(|&n| layout.layer(n).order);

        let mut doc = XmlDoc::new();
        let order_text = doc_order.to_string();
        doc.open("module-configuration", &[("level", order_text.as_str())])?;
        doc.open("levels", &[])?;
        for member in members {
            let instances = build_layer_instances(model, layout, member);
            write_level(&mut doc, layout, member, &instances)?;
        }
        doc.close("levels")?;
        doc.close("module-configuration")?;

        let path = output_dir.join(format!("weaver-mod-conf-input-{}.xml", doc_order));
        doc.write_to(&path)?;
        written.push(path);
    }
    Ok(written)
}
