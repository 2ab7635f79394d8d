//! Build Aggregator Input
//!
//! One document listing every generator run the weaver prepared: which
//! input document drives which generator kind and which source/header pair
//! it will produce. The downstream build aggregator turns this into build
//! files; that templating step is not part of the weaver.

use std::path::Path;

use crate::error::Result;
use crate::generation::{GeneratorRun, XmlDoc};

/// Emit `weaver-buildgen.xml`
pub fn emit_buildgen_input(runs: &[GeneratorRun], path: &Path) -> Result<()> {
    let mut doc = XmlDoc::new();
    doc.open("buildgen-input", &[])?;
    doc.open("generators", &[])?;
    for run in runs {
        let level_text = run.layer_order.to_string();
        doc.open(
            "generator",
            &[("kind", run.kind), ("level", level_text.as_str())],
        )?;
        doc.text_element("input", &[], &run.input.display().to_string())?;
        doc.text_element("output-source", &[], &run.output_source.display().to_string())?;
        doc.text_element("output-header", &[], &run.output_header.display().to_string())?;
        doc.close("generator")?;
    }
    doc.close("generators")?;
    doc.close("buildgen-input")?;
    doc.write_to(path)
}
