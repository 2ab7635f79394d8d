//! Analyses, Operations and Analysis Modules
//!
//! A *calculation* is anything that consumes call-event inputs: an
//! **analysis** (a function of a runtime analysis module) or an **operation**
//! (a pure source template that produces a derived value). Both declare an
//! ordered input specification; mappings wire those inputs to concrete call
//! data (see [`crate::mapping`]).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::spec::{AnalysisGroupId, AnalysisId, AnalysisModuleId, CallId, OperationId};

/// One declared input of a calculation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescription {
    pub type_name: String,
    pub name: String,
}

impl InputDescription {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        InputDescription {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

/// A named group of analyses and operations (one analysis specification)
#[derive(Debug, Clone, Default)]
pub struct AnalysisGroup {
    pub name: String,
    /// Directory prefix for the group's headers
    pub include_path: Option<String>,
    pub modules: Vec<AnalysisModuleId>,
    pub operations: Vec<OperationId>,
}

impl AnalysisGroup {
    pub fn new(name: impl Into<String>, include_path: Option<String>) -> Self {
        AnalysisGroup {
            name: name.into(),
            include_path,
            modules: Vec::new(),
            operations: Vec::new(),
        }
    }
}

/// An analysis function provided by an analysis module
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Function name invoked on the module instance
    pub function_name: String,
    pub module: AnalysisModuleId,
    pub group: AnalysisGroupId,
    pub inputs: Vec<InputDescription>,
    /// Adds an implicit channel-id input when the function is invoked
    pub needs_channel_id: bool,
}

/// A pure source-template function producing a derived input
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    pub group: AnalysisGroupId,
    pub inputs: Vec<InputDescription>,
    pub return_type: String,
    /// Set for array-returning operations: the type of the length value
    pub array_len_type: Option<String>,
    pub extra_headers: Vec<String>,
    pub source_template: String,
    pub cleanup_template: Option<String>,
}

static HOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+|[RLM])").unwrap());

impl Operation {
    pub fn has_array_return(&self) -> bool {
        self.array_len_type.is_some()
    }

    /// Name of the result variable for one instantiation; the mapping id
    /// keeps multiple instantiations on the same call apart.
    pub fn result_var_name(&self, mapping_id: i32) -> String {
        format!("op_{}_{}", self.name, mapping_id)
    }

    /// Name of the length variable for array-returning operations
    pub fn result_len_var_name(&self, mapping_id: i32) -> String {
        format!("op_{}_{}_len", self.name, mapping_id)
    }

    /// Render the source template for one instantiation.
    ///
    /// Holders: `$0, $1, …` positional inputs, `$R` result variable, `$L`
    /// length variable, `$M` mapping id. Substitution is literal and
    /// whitespace-preserving; unknown holders stay untouched.
    pub fn render_source(&self, input_exprs: &[String], mapping_id: i32) -> String {
        self.render(&self.source_template, input_exprs, mapping_id)
    }

    /// Render the cleanup template, if any
    pub fn render_cleanup(&self, input_exprs: &[String], mapping_id: i32) -> Option<String> {
        self.cleanup_template
            .as_ref()
            .map(|t| self.render(t, input_exprs, mapping_id))
    }

    fn render(&self, template: &str, input_exprs: &[String], mapping_id: i32) -> String {
        HOLDER
            .replace_all(template, |caps: &regex::Captures| {
                let holder = &caps[1];
                match holder {
                    "R" => self.result_var_name(mapping_id),
                    "L" => self.result_len_var_name(mapping_id),
                    "M" => mapping_id.to_string(),
                    _ => match holder.parse::<usize>() {
                        Ok(i) if i < input_exprs.len() => input_exprs[i].clone(),
                        _ => caps[0].to_string(),
                    },
                }
            })
            .into_owned()
    }
}

/// Specification of a runtime module that hosts analysis functions
#[derive(Debug, Clone)]
pub struct AnalysisModule {
    /// Registered name, unique within the analysis group
    pub name: String,
    /// Name the module-stacking runtime loads the module under
    pub module_name: String,
    /// Name used in module-configuration documents
    pub config_name: String,
    /// Data type of a module instance
    pub instance_type: String,
    pub header_name: String,
    pub include_dir: String,
    pub group: AnalysisGroupId,
    /// Presentation-only subgroup label
    pub sub_group: String,
    pub is_global: bool,
    pub is_process_global: bool,
    pub listens_to_timeouts: bool,
    pub is_local_integrity: bool,
    pub is_reduction: bool,
    pub is_continuous: bool,
    pub is_added_automagically: bool,
    /// (dependency, soft). Soft dependencies do not become child module
    /// instances; they exist to break cycles.
    pub dependencies: Vec<(AnalysisModuleId, bool)>,
    /// Reductions this module can consume
    pub supported_reductions: Vec<AnalysisModuleId>,
    pub analyses: Vec<AnalysisId>,
    /// Calls this module creates at run time (wrap-across events)
    pub creates: Vec<CallId>,
}

impl AnalysisModule {
    pub fn hard_dependencies(&self) -> impl Iterator<Item = AnalysisModuleId> + '_ {
        self.dependencies
            .iter()
            .filter(|(_, soft)| !soft)
            .map(|(id, _)| *id)
    }

    pub fn is_soft_dependency(&self, module: AnalysisModuleId) -> bool {
        self.dependencies
            .iter()
            .any(|(id, soft)| *id == module && *soft)
    }

    pub fn supports_reduction(&self, reduction: AnalysisModuleId) -> bool {
        self.supported_reductions.contains(&reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::AnalysisGroupId;

    fn op(template: &str, cleanup: Option<&str>) -> Operation {
        Operation {
            name: "ResolveComm".into(),
            group: AnalysisGroupId(0),
            inputs: vec![InputDescription::new("int", "comm")],
            return_type: "HandleInfo".into(),
            array_len_type: None,
            extra_headers: vec![],
            source_template: template.into(),
            cleanup_template: cleanup.map(Into::into),
        }
    }

    #[test]
    fn holders_substitute_positionally() {
        let o = op("$R = resolve($0); /*id $M*/", None);
        let rendered = o.render_source(&["comm".into()], 2);
        assert_eq!(rendered, "op_ResolveComm_2 = resolve(comm); /*id 2*/");
    }

    #[test]
    fn unknown_holders_are_preserved() {
        let o = op("$R = f($0, $7);", None);
        let rendered = o.render_source(&["x".into()], 0);
        assert_eq!(rendered, "op_ResolveComm_0 = f(x, $7);");
    }

    #[test]
    fn cleanup_uses_same_substitution() {
        let o = op("$R = g($0);", Some("free($R);"));
        assert_eq!(
            o.render_cleanup(&["x".into()], 1).unwrap(),
            "free(op_ResolveComm_1);"
        );
    }

    #[test]
    fn length_holder_for_array_returns() {
        let mut o = op("$R = h($0); $L = n;", None);
        o.array_len_type = Some("int".into());
        assert_eq!(
            o.render_source(&["x".into()], 0),
            "op_ResolveComm_0 = h(x); op_ResolveComm_0_len = n;"
        );
    }
}
