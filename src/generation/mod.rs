//! # Generation
//!
//! Emitters for the four weaver output document kinds plus the DOT dumps:
//!
//! - [`wrapper`]: per-layer wrapper generator input;
//! - [`receival`]: per-layer receival generator input;
//! - [`module_config`]: module-configuration input for the stacking runtime;
//! - [`buildgen`]: the build aggregator input listing all generator runs;
//! - [`dot`]: graph dumps for verbose runs.
//!
//! All documents are built in memory and written in one piece; a failing
//! emission leaves no half-written file behind.

pub mod buildgen;
pub mod dot;
pub mod module_config;
pub mod receival;
pub mod wrapper;

use std::fs;
use std::path::{Path, PathBuf};

use petgraph::graph::NodeIndex;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, WeaverError};
use crate::layout::{ForwardChannel, LayerGraph};
use crate::mapping::{CalculationOrder, Mapping, MappingStore};
use crate::spec::{CalculationRef, CallId, CommStrategy, SpecModel};

fn wx<T, E: std::fmt::Display>(result: std::result::Result<T, E>) -> Result<T> {
    result.map_err(|e| WeaverError::Io(std::io::Error::other(e.to_string())))
}

/// An XML document under construction
pub struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    pub fn new() -> Self {
        XmlDoc {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// Open an element with attributes
    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        wx(self.writer.write_event(Event::Start(start)))
    }

    pub fn close(&mut self, name: &str) -> Result<()> {
        wx(self.writer.write_event(Event::End(BytesEnd::new(name))))
    }

    /// Write an empty element with attributes
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        wx(self.writer.write_event(Event::Empty(start)))
    }

    /// Write an element holding only text
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attrs)?;
        wx(self.writer.write_event(Event::Text(BytesText::new(text))))?;
        self.close(name)
    }

    /// The serialized document
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Serialize and write in one piece
    pub fn write_to(self, path: &Path) -> Result<()> {
        let bytes = self.into_bytes();
        fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for XmlDoc {
    fn default() -> Self {
        XmlDoc::new()
    }
}

/// One outgoing channel of a layer, as the generators see it
#[derive(Debug, Clone)]
pub struct Channel {
    pub kind: &'static str,
    pub to_level: Option<u32>,
    pub module_name: String,
}

/// Enumerate the channels a layer can emit on: the upward edge, downward
/// edges toward children (wrap-down broadcast), then intra.
pub fn channels_of(model: &SpecModel, layout: &LayerGraph, node: NodeIndex) -> Vec<Channel> {
    let mut channels = Vec::new();
    if let Some(parent) = layout.parent_of(node) {
        if let Some(adjacency) = layout.out_adjacency(node) {
            if let CommStrategy::Inter { up, .. } = model.strategy(adjacency.comm.strategy) {
                channels.push(Channel {
                    kind: "up",
                    to_level: Some(layout.layer(parent).order),
                    module_name: up.module_name.clone(),
                });
            }
        }
    }
    for child in layout.children_of(node) {
        if let Some(adjacency) = layout.out_adjacency(child) {
            if let CommStrategy::Inter { down, .. } = model.strategy(adjacency.comm.strategy) {
                channels.push(Channel {
                    kind: "down",
                    to_level: Some(layout.layer(child).order),
                    module_name: down.module_name.clone(),
                });
            }
        }
    }
    if let Some(intra) = &layout.layer(node).intra_comm {
        if let CommStrategy::Intra { module, .. } = model.strategy(intra.strategy) {
            channels.push(Channel {
                kind: "intra",
                to_level: Some(layout.layer(node).order),
                module_name: module.module_name.clone(),
            });
        }
    }
    channels
}

/// Index of the first channel matching a forward-channel kind
pub fn channel_index(channels: &[Channel], wanted: ForwardChannel) -> Option<usize> {
    let kind = match wanted {
        ForwardChannel::Up => "up",
        ForwardChannel::Intra => "intra",
    };
    channels.iter().position(|c| c.kind == kind)
}

/// The analysis mappings a layer executes for one (call, order), in
/// intra-call order: every mapping of an analysis whose module is hosted on
/// the layer.
pub fn hosted_analyses<'a>(
    model: &SpecModel,
    mappings: &'a MappingStore,
    layout: &LayerGraph,
    node: NodeIndex,
    call: CallId,
    order: CalculationOrder,
) -> Vec<&'a Mapping> {
    mappings
        .mappings_of(call, order)
        .into_iter()
        .filter(|m| match m.calculation {
            CalculationRef::Analysis(analysis) => {
                let module = model.analysis(analysis).module;
                layout.layer(node).hosts_module(module)
            }
            CalculationRef::Operation(_) => false,
        })
        .collect()
}

/// One generator run: its input document and the outputs it will produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorRun {
    /// "wrapper", "receival" or "module-config"
    pub kind: &'static str,
    pub layer_order: u32,
    pub input: PathBuf,
    pub output_source: PathBuf,
    pub output_header: PathBuf,
}

/// Output file names of one generation run, per layer
#[derive(Debug, Clone)]
pub struct OutputNames {
    pub input: PathBuf,
    pub source: PathBuf,
    pub header: PathBuf,
    pub log: PathBuf,
}

impl OutputNames {
    /// Conventional names for one generator kind and layer
    pub fn for_layer(output_dir: &Path, kind: &str, order: u32) -> Self {
        OutputNames {
            input: output_dir.join(format!("weaver-{}-gen-input-{}.xml", kind, order)),
            source: output_dir.join(format!("weaver-{}-gen-output-{}.cpp", kind, order)),
            header: output_dir.join(format!("weaver-{}-gen-output-{}.h", kind, order)),
            log: output_dir.join(format!("weaver-{}-gen-output-{}.log", kind, order)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_serialize_with_indentation() {
        let mut doc = XmlDoc::new();
        doc.open("root", &[("version", "1")]).unwrap();
        doc.empty("leaf", &[("name", "a")]).unwrap();
        doc.text_element("note", &[], "text").unwrap();
        doc.close("root").unwrap();
        let bytes = doc.into_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<root version=\"1\">"));
        assert!(text.contains("<leaf name=\"a\"/>"));
        assert!(text.contains("<note>text</note>"));
    }
}
