//! Analysis Specification Reader
//!
//! Loads analysis groups: their operations (source templates) and their
//! analysis modules with analysis functions. Module-to-module references
//! (dependencies, supported reductions) may point into later documents, so
//! they resolve in a second phase after all analysis specifications are
//! parsed. References to created calls resolve even later, once the API
//! specifications are loaded; they are returned as pending entries.

use std::path::Path;

use crate::error::{Result, WeaverError};
use crate::readers::{parse_document, parse_file, SpecNode};
use crate::spec::{
    Analysis, AnalysisGroup, AnalysisGroupId, AnalysisModule, InputDescription, Operation,
    SpecModel,
};

/// A module → created-call reference awaiting API load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub module: String,
    pub call: String,
}

/// Load a set of analysis specification files.
///
/// Returns the created-call references that must be resolved after the API
/// specifications are in (see [`resolve_pending_creates`]).
pub fn load_analyses(paths: &[&Path], model: &mut SpecModel) -> Result<Vec<PendingCreate>> {
    let mut documents = Vec::new();
    for path in paths {
        let label = path.display().to_string();
        documents.push((parse_file(path)?, label));
    }
    load_analysis_documents(&documents, model)
}

/// Load analysis specifications from in-memory documents
pub fn load_analyses_str(
    inputs: &[(&str, &str)],
    model: &mut SpecModel,
) -> Result<Vec<PendingCreate>> {
    let mut documents = Vec::new();
    for (input, file) in inputs {
        documents.push((parse_document(input, file)?, file.to_string()));
    }
    load_analysis_documents(&documents, model)
}

fn load_analysis_documents(
    documents: &[(SpecNode, String)],
    model: &mut SpecModel,
) -> Result<Vec<PendingCreate>> {
    // Phase 1: groups, operations, modules, analyses.
    let mut pending_creates = Vec::new();
    let mut pending_deps: Vec<(String, String, bool)> = Vec::new();
    let mut pending_reductions: Vec<(String, String)> = Vec::new();

    for (root, file) in documents {
        if root.name != "analysis-specification" {
            return Err(WeaverError::parse(
                file,
                format!("expected <analysis-specification>, found <{}>", root.name),
            ));
        }
        let group_name = root.required_attr("group", file)?;
        let group = match model.find_analysis_group(group_name) {
            Some(id) => id,
            None => model.register_analysis_group(AnalysisGroup::new(
                group_name,
                root.attr("include-path").map(str::to_string),
            ))?,
        };

        if let Some(operations) = root.child("operations") {
            for node in operations.children_named("operation") {
                read_operation(node, file, group, model)?;
            }
        }

        if let Some(modules) = root.child("modules") {
            for node in modules.children_named("module") {
                read_module(
                    node,
                    file,
                    group,
                    model,
                    &mut pending_deps,
                    &mut pending_reductions,
                    &mut pending_creates,
                )?;
            }
        }
    }

    // Phase 2: cross-module references.
    for (module, dependency, soft) in pending_deps {
        let module_id = model
            .find_module(&module)
            .ok_or_else(|| WeaverError::unresolved("analysis module", module.clone()))?;
        let dep_id = model
            .find_module(&dependency)
            .ok_or_else(|| WeaverError::unresolved("analysis module", dependency.clone()))?;
        model.add_module_dependency(module_id, dep_id, soft)?;
    }
    for (module, reduction) in pending_reductions {
        let module_id = model
            .find_module(&module)
            .ok_or_else(|| WeaverError::unresolved("analysis module", module.clone()))?;
        let red_id = model
            .find_module(&reduction)
            .ok_or_else(|| WeaverError::unresolved("analysis module", reduction.clone()))?;
        model.add_supported_reduction(module_id, red_id)?;
    }

    Ok(pending_creates)
}

/// Resolve created-call references once the API specifications are loaded
pub fn resolve_pending_creates(
    pending: Vec<PendingCreate>,
    model: &mut SpecModel,
) -> Result<()> {
    for entry in pending {
        let module = model
            .find_module(&entry.module)
            .ok_or_else(|| WeaverError::unresolved("analysis module", entry.module.clone()))?;
        let call = model
            .find_call(&entry.call)
            .ok_or_else(|| WeaverError::unresolved("call", entry.call.clone()))?;
        model.add_created_call(module, call)?;
    }
    Ok(())
}

fn read_inputs(node: Option<&SpecNode>, file: &str) -> Result<Vec<InputDescription>> {
    let mut inputs = Vec::new();
    if let Some(node) = node {
        for input in node.children_named("input") {
            inputs.push(InputDescription::new(
                input.required_attr("type", file)?,
                input.required_attr("name", file)?,
            ));
        }
    }
    Ok(inputs)
}

fn read_operation(
    node: &SpecNode,
    file: &str,
    group: AnalysisGroupId,
    model: &mut SpecModel,
) -> Result<()> {
    let name = node.required_attr("name", file)?.to_string();
    let source_template = node.child_text("source");
    if source_template.is_empty() {
        return Err(WeaverError::parse(
            file,
            format!("operation '{}' has no <source> template", name),
        ));
    }
    let cleanup = node.child("cleanup").map(|c| c.text.trim().to_string());
    let extra_headers = node
        .child("headers")
        .map(|h| {
            h.children_named("header")
                .map(|e| e.text.trim().to_string())
                .collect()
        })
        .unwrap_or_default();
    model.register_operation(Operation {
        name,
        group,
        inputs: read_inputs(node.child("inputs"), file)?,
        return_type: node.required_attr("return-type", file)?.to_string(),
        array_len_type: node
            .child("array-return")
            .map(|a| a.required_attr("len-type", file).map(str::to_string))
            .transpose()?,
        extra_headers,
        source_template,
        cleanup_template: cleanup,
    })?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn read_module(
    node: &SpecNode,
    file: &str,
    group: AnalysisGroupId,
    model: &mut SpecModel,
    pending_deps: &mut Vec<(String, String, bool)>,
    pending_reductions: &mut Vec<(String, String)>,
    pending_creates: &mut Vec<PendingCreate>,
) -> Result<()> {
    let name = node.required_attr("name", file)?.to_string();
    let module = AnalysisModule {
        name: name.clone(),
        module_name: node.required_attr("module-name", file)?.to_string(),
        config_name: node.required_attr("config-name", file)?.to_string(),
        instance_type: node.attr("instance-type").unwrap_or_default().to_string(),
        header_name: node.attr("header-name").unwrap_or_default().to_string(),
        include_dir: node.attr("include-dir").unwrap_or_default().to_string(),
        group,
        sub_group: node.attr("sub-group").unwrap_or("General").to_string(),
        is_global: node.bool_attr("global"),
        is_process_global: node.bool_attr("process-global"),
        listens_to_timeouts: node.bool_attr("listens-to-timeouts"),
        is_local_integrity: node.bool_attr("local-integrity"),
        is_reduction: node.bool_attr("reduction"),
        is_continuous: node.bool_attr("continuous"),
        is_added_automagically: node.bool_attr("added-automagically"),
        dependencies: Vec::new(),
        supported_reductions: Vec::new(),
        analyses: Vec::new(),
        creates: Vec::new(),
    };
    let module_id = model.register_module(module)?;

    if let Some(deps) = node.child("dependencies") {
        for dep in deps.children_named("dependency") {
            pending_deps.push((
                name.clone(),
                dep.required_attr("name", file)?.to_string(),
                dep.bool_attr("soft"),
            ));
        }
    }
    if let Some(reds) = node.child("supported-reductions") {
        for red in reds.children_named("reduction") {
            pending_reductions.push((name.clone(), red.required_attr("name", file)?.to_string()));
        }
    }
    if let Some(creates) = node.child("creates") {
        for call in creates.children_named("call") {
            pending_creates.push(PendingCreate {
                module: name.clone(),
                call: call.required_attr("name", file)?.to_string(),
            });
        }
    }

    if let Some(analyses) = node.child("analyses") {
        for analysis in analyses.children_named("analysis") {
            model.register_analysis(Analysis {
                function_name: analysis.required_attr("function", file)?.to_string(),
                module: module_id,
                group,
                inputs: read_inputs(analysis.child("inputs"), file)?,
                needs_channel_id: analysis.bool_attr("needs-channel-id"),
            })?;
        }
    }
    Ok(())
}
