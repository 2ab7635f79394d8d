//! # Driver
//!
//! Composes the whole weave: loads the four specification kinds (with the
//! built-in GTI-internal API and analysis specifications always prepended),
//! freezes the model, reduces and checks the layout, runs the solver, then
//! drives the emitters. Verbosity 2 and up also writes DOT dumps of the
//! inputs and the solved layout.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::channel_id::ChannelIdPlan;
use crate::config::WeaverConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WeaverError};
use crate::generation::{
    buildgen, dot, module_config, receival, wrapper, GeneratorRun, OutputNames, XmlDoc,
};
use crate::layout::{LayerGraph, UidAllocator};
use crate::mapping::MappingStore;
use crate::readers::{self, SpecKind};
use crate::solver;
use crate::spec::SpecModel;

/// The GTI-internal specifications every weave includes
const IMPLICIT_ANALYSIS_SPEC: &str = include_str!("../assets/gti-implicit-analysis.xml");
const IMPLICIT_API_SPEC: &str = include_str!("../assets/gti-implicit-api.xml");

/// Command-line inputs of one weave
#[derive(Debug, Clone)]
pub struct WeaverArgs {
    pub layout: PathBuf,
    pub gti: PathBuf,
    /// API and analysis specifications, in any mix
    pub specs: Vec<PathBuf>,
}

/// What a successful weave produced
#[derive(Debug, Default)]
pub struct WeaveSummary {
    pub layers: usize,
    pub warnings: usize,
    /// All written output documents
    pub outputs: Vec<PathBuf>,
}

/// Run a complete weave
pub fn run(args: &WeaverArgs, config: &WeaverConfig) -> Result<WeaveSummary> {
    let mut model = SpecModel::new();
    let mut mappings = MappingStore::new();
    let mut diags = Diagnostics::new();

    // ---- Load phase -------------------------------------------------

    readers::gti::load_gti(&args.gti, &mut model)?;
    info!("loaded GTI specification {}", args.gti.display());

    let mut api_paths: Vec<&Path> = Vec::new();
    let mut analysis_paths: Vec<&Path> = Vec::new();
    for path in &args.specs {
        match readers::sniff_kind(path)? {
            SpecKind::Api => api_paths.push(path),
            SpecKind::Analysis => analysis_paths.push(path),
            other => {
                return Err(WeaverError::parse(
                    path.display().to_string(),
                    format!("expected an API or analysis specification, found {:?}", other),
                ))
            }
        }
    }

    let mut pending = readers::analysis::load_analyses_str(
        &[(IMPLICIT_ANALYSIS_SPEC, "gti-implicit-analysis")],
        &mut model,
    )?;
    pending.extend(readers::analysis::load_analyses(&analysis_paths, &mut model)?);
    debug!("loaded {} analysis specifications", analysis_paths.len() + 1);

    readers::api::load_api_str(
        IMPLICIT_API_SPEC,
        "gti-implicit-api",
        &mut model,
        &mut mappings,
        &mut diags,
    )?;
    readers::api::load_api(&api_paths, &mut model, &mut mappings, &mut diags)?;
    readers::analysis::resolve_pending_creates(pending, &mut model)?;

    model.freeze();
    diags.flush();

    // ---- Layout phase -----------------------------------------------

    let mut layout = readers::layout::load_layout(&args.layout, &model)?;
    map_gti_implicits(&model, &mut layout)?;

    fs::create_dir_all(&config.output_dir)?;
    if config.dot_enabled() {
        let dir = &config.output_dir;
        dot::write_layout_dot(&layout, &dir.join("weaver-verbose-layout.dot"))?;
        dot::write_analyses_dot(&model, &dir.join("weaver-verbose-analyses.dot"))?;
        if config.verbosity >= 3 {
            dot::write_mappings_dot(&model, &mappings, &dir.join("weaver-verbose-mappings.dot"))?;
        }
    }

    layout.reduce_to_tree()?;
    layout.check_wrap_across_usage(&model)?;

    let mut uids = UidAllocator::new();
    solver::solve(&model, &mappings, &mut layout, &mut diags, &mut uids)?;
    info!("solved call properties for {} layers", layout.len());

    if config.dot_enabled() {
        dot::write_layout_dot(
            &layout,
            &config.output_dir.join("weaver-verbose-layout-final.dot"),
        )?;
    }

    // ---- Emission phase ---------------------------------------------

    let plan = ChannelIdPlan::for_layout(&layout);
    let mut summary = WeaveSummary {
        layers: layout.len(),
        ..WeaveSummary::default()
    };
    let mut runs: Vec<GeneratorRun> = Vec::new();

    write_layout_info(
        &layout,
        &plan,
        &config.output_dir.join("weaver-layout-info.xml"),
    )?;
    summary
        .outputs
        .push(config.output_dir.join("weaver-layout-info.xml"));

    for node in layout.layers() {
        let order = layout.layer(node).order;

        let names = OutputNames::for_layer(&config.output_dir, "wrapp", order);
        if let Some(doc) =
            wrapper::emit_wrapper_input(&model, &mappings, &layout, node, &plan, &names)?
        {
            doc.write_to(&names.input)?;
            runs.push(GeneratorRun {
                kind: "wrapper",
                layer_order: order,
                input: names.input.clone(),
                output_source: names.source.clone(),
                output_header: names.header.clone(),
            });
            summary.outputs.push(names.input.clone());
        }

        let names = OutputNames::for_layer(&config.output_dir, "receival", order);
        if let Some(doc) =
            receival::emit_receival_input(&model, &mappings, &layout, node, &plan, &names)?
        {
            doc.write_to(&names.input)?;
            runs.push(GeneratorRun {
                kind: "receival",
                layer_order: order,
                input: names.input.clone(),
                output_source: names.source.clone(),
                output_header: names.header.clone(),
            });
            summary.outputs.push(names.input.clone());
        }
    }

    let config_docs = module_config::emit_module_config(&model, &layout, &config.output_dir)?;
    summary.outputs.extend(config_docs);

    let buildgen_path = config.output_dir.join("weaver-buildgen.xml");
    buildgen::emit_buildgen_input(&runs, &buildgen_path)?;
    summary.outputs.push(buildgen_path);

    diags.flush();
    summary.warnings = diags.len();
    info!(
        "weave complete: {} layers, {} documents, {} warnings",
        summary.layers,
        summary.outputs.len(),
        summary.warnings
    );
    Ok(summary)
}

/// Place the GTI-internal modules: the finalize handler runs on every tool
/// layer so shutdown events are handled wherever they arrive.
fn map_gti_implicits(model: &SpecModel, layout: &mut LayerGraph) -> Result<()> {
    let Some(handler) = model.find_module("FinalizeHandler") else {
        return Ok(());
    };
    for node in layout.layers() {
        let layer = layout.layer(node);
        if layer.is_application() {
            continue;
        }
        let order = layer.order;
        layout.assign_module(model, order, handler)?;
    }
    Ok(())
}

/// Summary document: layers, their shape, and the channel-id plan
fn write_layout_info(layout: &LayerGraph, plan: &ChannelIdPlan, path: &Path) -> Result<()> {
    let mut doc = XmlDoc::new();
    doc.open("layout-info", &[])?;

    let fan_in_text = plan.max_fan_in.to_string();
    let depth_text = plan.depth.to_string();
    let bits_text = plan.bits_per_sub_id.to_string();
    let words_text = plan.num_words.to_string();
    doc.empty(
        "channel-id",
        &[
            ("max-fan-in", fan_in_text.as_str()),
            ("depth", depth_text.as_str()),
            ("bits-per-sub-id", bits_text.as_str()),
            ("num-words", words_text.as_str()),
        ],
    )?;

    doc.open("layers", &[])?;
    for node in layout.layers() {
        let layer = layout.layer(node);
        let order_text = layer.order.to_string();
        let size_text = layer.size.to_string();
        let modules_text = layer.modules.len().to_string();
        let mut attrs = vec![
            ("order", order_text.as_str()),
            ("size", size_text.as_str()),
            ("modules", modules_text.as_str()),
        ];
        let parent_text = layout
            .parent_of(node)
            .map(|p| layout.layer(p).order.to_string());
        if let Some(parent) = &parent_text {
            attrs.push(("sends-to", parent.as_str()));
        }
        doc.empty("layer", &attrs)?;
    }
    doc.close("layers")?;

    doc.close("layout-info")?;
    doc.write_to(path)
}
