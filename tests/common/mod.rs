//! Shared builders for solver and generation tests: a small intercepted
//! API, analysis modules with configurable flags, and chain layouts wired
//! with one inter and one intra communication.

#![allow(dead_code)]

use tbon_weaver::layout::{Communication, Distribution, LayerGraph};
use tbon_weaver::mapping::MappingInput;
use tbon_weaver::spec::{
    Analysis, AnalysisGroup, AnalysisGroupId, AnalysisId, AnalysisModule, AnalysisModuleId,
    ApiGroup, ApiGroupId, Argument, ArgumentIntent, CallFlags, CallId, CommProtocol,
    CommStrategy, InputDescription, ModuleInfo, Operation, ProtocolId, SettingsDescription,
    SpecModel, StrategyId,
};

/// A model pre-filled with one API group, one analysis group and one
/// inter/intra communication pair.
pub struct TestModel {
    pub model: SpecModel,
    pub api_group: ApiGroupId,
    pub analysis_group: AnalysisGroupId,
    pub inter: StrategyId,
    pub intra: StrategyId,
    pub protocol: ProtocolId,
}

fn module_info(name: &str) -> ModuleInfo {
    ModuleInfo {
        module_name: name.to_string(),
        config_name: name.to_string(),
        instance_type: format!("I_{}", name),
        header_name: format!("{}.h", name),
        include_dir: "modules".to_string(),
        prepended: Vec::new(),
        required_apis: Vec::new(),
    }
}

impl TestModel {
    pub fn new() -> Self {
        let mut model = SpecModel::new();
        let api_group = model
            .register_api_group(ApiGroup::new("ExampleApi", Some("example_api.h".into())))
            .unwrap();
        let analysis_group = model
            .register_analysis_group(AnalysisGroup::new("checks", Some("modules/checks".into())))
            .unwrap();
        let inter = model
            .register_strategy(CommStrategy::Inter {
                name: "buffered".into(),
                up: module_info("stratBufferedUp"),
                down: module_info("stratBufferedDown"),
                settings: SettingsDescription::new(),
            })
            .unwrap();
        let intra = model
            .register_strategy(CommStrategy::Intra {
                name: "ring".into(),
                module: module_info("stratRing"),
                settings: SettingsDescription::new(),
            })
            .unwrap();
        let protocol = model
            .register_protocol(CommProtocol {
                name: "tcp".into(),
                module: module_info("protTcp"),
                supports_intra: true,
                settings: SettingsDescription::new(),
            })
            .unwrap();
        TestModel {
            model,
            api_group,
            analysis_group,
            inter,
            intra,
            protocol,
        }
    }

    /// Register a call with scalar int arguments
    pub fn call_with_scalars(&mut self, name: &str, args: &[&str]) -> CallId {
        let call = self
            .model
            .register_call(name, self.api_group, "int", CallFlags::default())
            .unwrap();
        for arg in args {
            self.model
                .add_call_argument(call, Argument::scalar(*arg, "int", ArgumentIntent::In))
                .unwrap();
        }
        call
    }

    /// Register an analysis module with default attributes
    pub fn module(&mut self, name: &str) -> AnalysisModuleId {
        self.module_with(name, |_| {})
    }

    /// Register an analysis module, letting the caller tweak its flags
    pub fn module_with(
        &mut self,
        name: &str,
        configure: impl FnOnce(&mut AnalysisModule),
    ) -> AnalysisModuleId {
        let mut module = AnalysisModule {
            name: name.to_string(),
            module_name: format!("mod{}", name),
            config_name: name.to_string(),
            instance_type: format!("I_{}", name),
            header_name: format!("i_{}.h", name.to_lowercase()),
            include_dir: "modules/checks".to_string(),
            group: self.analysis_group,
            sub_group: "General".to_string(),
            is_global: false,
            is_process_global: false,
            listens_to_timeouts: false,
            is_local_integrity: false,
            is_reduction: false,
            is_continuous: false,
            is_added_automagically: false,
            dependencies: Vec::new(),
            supported_reductions: Vec::new(),
            analyses: Vec::new(),
            creates: Vec::new(),
        };
        configure(&mut module);
        self.model.register_module(module).unwrap()
    }

    /// Register an analysis function with int inputs
    pub fn analysis(
        &mut self,
        module: AnalysisModuleId,
        function: &str,
        inputs: &[&str],
    ) -> AnalysisId {
        self.model
            .register_analysis(Analysis {
                function_name: function.to_string(),
                module,
                group: self.analysis_group,
                inputs: inputs
                    .iter()
                    .map(|name| InputDescription::new("int", *name))
                    .collect(),
                needs_channel_id: false,
            })
            .unwrap()
    }

    /// Register an operation with int inputs and a custom return type
    pub fn operation(
        &mut self,
        name: &str,
        inputs: &[&str],
        return_type: &str,
    ) -> tbon_weaver::spec::OperationId {
        self.model
            .register_operation(Operation {
                name: name.to_string(),
                group: self.analysis_group,
                inputs: inputs
                    .iter()
                    .map(|n| InputDescription::new("int", *n))
                    .collect(),
                return_type: return_type.to_string(),
                array_len_type: None,
                extra_headers: Vec::new(),
                source_template: format!("$R = {}($0);", name),
                cleanup_template: None,
            })
            .unwrap()
    }

    /// Wire argument names of a call into mapping inputs
    pub fn arg_inputs(&self, call: CallId, names: &[&str]) -> Vec<MappingInput> {
        names
            .iter()
            .map(|name| {
                let (index, _) = self.model.call(call).find_argument(name).unwrap();
                MappingInput::Argument { index }
            })
            .collect()
    }

    pub fn inter_comm(&self) -> Communication {
        Communication::new(self.inter, self.protocol)
    }

    pub fn intra_comm(&self) -> Communication {
        Communication::new(self.intra, self.protocol)
    }

    /// A chain layout `0 -> 1 -> ... -> n`, sizes halving layer by layer
    pub fn chain_layout(&self, levels: &[(u32, u64)]) -> LayerGraph {
        let mut layout = LayerGraph::new();
        for &(order, size) in levels {
            layout.add_layer(order, size, None).unwrap();
        }
        for window in levels.windows(2) {
            layout
                .connect(
                    window[0].0,
                    window[1].0,
                    self.inter_comm(),
                    Distribution::Uniform,
                )
                .unwrap();
        }
        layout
    }
}

/// Names of an input set, for compact assertions
pub fn names(set: &tbon_weaver::layout::InputSet) -> Vec<String> {
    set.iter().map(|i| i.name.clone()).collect()
}
