//! # Spec Model
//!
//! Immutable post-parse representation of everything the four input
//! specifications declare: API groups and calls, analysis groups with their
//! modules, analyses and operations, communication strategies and protocols,
//! places, and enumeration lists.
//!
//! Entities live in per-kind arenas (`Vec`s) and reference each other through
//! typed index newtypes; name→index maps are built at registration time. After
//! [`SpecModel::freeze`] the model rejects every further registration — all
//! downstream passes rely on stable identities.

pub mod analyses;
pub mod calls;
pub mod gti;
pub mod settings;

use std::collections::HashMap;

pub use analyses::{Analysis, AnalysisGroup, AnalysisModule, InputDescription, Operation};
pub use calls::{ApiCall, ApiGroup, Argument, ArgumentIntent, ArrayLength, CallFlags};
pub use gti::{CommProtocol, CommStrategy, EnumList, ModuleInfo, Place, PlaceKind};
pub use settings::{
    FilePathIntent, Setting, SettingDescription, SettingKind, SettingsDescription,
};

use crate::error::{Result, WeaverError};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

entity_id!(
    /// Index of an API group
    ApiGroupId
);
entity_id!(
    /// Index of an API call
    CallId
);
entity_id!(
    /// Index of an analysis group
    AnalysisGroupId
);
entity_id!(
    /// Index of an analysis function
    AnalysisId
);
entity_id!(
    /// Index of an operation
    OperationId
);
entity_id!(
    /// Index of an analysis module
    AnalysisModuleId
);
entity_id!(
    /// Index of a communication strategy
    StrategyId
);
entity_id!(
    /// Index of a communication protocol
    ProtocolId
);
entity_id!(
    /// Index of a place
    PlaceId
);

/// Reference to a calculation: an analysis or an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculationRef {
    Analysis(AnalysisId),
    Operation(OperationId),
}

/// The frozen registry of all specification entities
#[derive(Debug, Default)]
pub struct SpecModel {
    frozen: bool,

    api_groups: Vec<ApiGroup>,
    calls: Vec<ApiCall>,
    analysis_groups: Vec<AnalysisGroup>,
    analyses: Vec<Analysis>,
    operations: Vec<Operation>,
    modules: Vec<AnalysisModule>,
    strategies: Vec<CommStrategy>,
    protocols: Vec<CommProtocol>,
    places: Vec<Place>,
    enums: Vec<EnumList>,

    api_group_names: HashMap<String, ApiGroupId>,
    /// (group, name) → call; call names are unique within their group
    call_names: HashMap<(ApiGroupId, String), CallId>,
    /// name → first registered call of that name, for cross-spec references
    call_by_name: HashMap<String, CallId>,
    analysis_group_names: HashMap<String, AnalysisGroupId>,
    /// (group, function name) → analysis
    analysis_names: HashMap<(AnalysisGroupId, String), AnalysisId>,
    /// (group, name) → operation
    operation_names: HashMap<(AnalysisGroupId, String), OperationId>,
    module_names: HashMap<String, AnalysisModuleId>,
    strategy_names: HashMap<String, StrategyId>,
    protocol_names: HashMap<String, ProtocolId>,
    place_names: HashMap<String, PlaceId>,
    enum_names: HashMap<String, usize>,

    next_call_uid: u32,
}

impl SpecModel {
    pub fn new() -> Self {
        SpecModel::default()
    }

    /// Reject registrations once loading is done
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_mutable(&self) -> Result<()> {
        if self.frozen {
            Err(WeaverError::constraint(
                "spec model is frozen; no further registrations are accepted",
            ))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Registration (only before freeze)
    // ------------------------------------------------------------------

    pub fn register_api_group(&mut self, group: ApiGroup) -> Result<ApiGroupId> {
        self.check_mutable()?;
        if self.api_group_names.contains_key(&group.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate API group '{}'",
                group.name
            )));
        }
        let id = ApiGroupId(self.api_groups.len());
        self.api_group_names.insert(group.name.clone(), id);
        self.api_groups.push(group);
        Ok(id)
    }

    /// Register a call; assigns its globally unique id.
    pub fn register_call(
        &mut self,
        name: impl Into<String>,
        group: ApiGroupId,
        return_type: impl Into<String>,
        flags: CallFlags,
    ) -> Result<CallId> {
        self.check_mutable()?;
        let name = name.into();
        let key = (group, name.clone());
        if self.call_names.contains_key(&key) {
            return Err(WeaverError::constraint(format!(
                "duplicate call '{}' in API group '{}'",
                name, self.api_groups[group.0].name
            )));
        }
        let uid = self.next_call_uid;
        self.next_call_uid += 1;
        let call = ApiCall::new(name.clone(), group, return_type, flags, uid)?;
        let id = CallId(self.calls.len());
        self.call_names.insert(key, id);
        self.call_by_name.entry(name).or_insert(id);
        self.api_groups[group.0].calls.push(id);
        self.calls.push(call);
        Ok(id)
    }

    /// Append an argument to a registered call
    pub fn add_call_argument(&mut self, call: CallId, argument: Argument) -> Result<()> {
        self.check_mutable()?;
        self.calls[call.0].add_argument(argument)
    }

    pub fn register_analysis_group(&mut self, group: AnalysisGroup) -> Result<AnalysisGroupId> {
        self.check_mutable()?;
        if self.analysis_group_names.contains_key(&group.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate analysis group '{}'",
                group.name
            )));
        }
        let id = AnalysisGroupId(self.analysis_groups.len());
        self.analysis_group_names.insert(group.name.clone(), id);
        self.analysis_groups.push(group);
        Ok(id)
    }

    pub fn register_module(&mut self, module: AnalysisModule) -> Result<AnalysisModuleId> {
        self.check_mutable()?;
        if self.module_names.contains_key(&module.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate analysis module '{}'",
                module.name
            )));
        }
        let id = AnalysisModuleId(self.modules.len());
        self.module_names.insert(module.name.clone(), id);
        self.analysis_groups[module.group.0].modules.push(id);
        self.modules.push(module);
        Ok(id)
    }

    /// Register an analysis function of a module.
    ///
    /// Function names are unique within the analysis group; all analyses of
    /// a module belong to the module's group.
    pub fn register_analysis(&mut self, analysis: Analysis) -> Result<AnalysisId> {
        self.check_mutable()?;
        let group = analysis.group;
        let key = (group, analysis.function_name.clone());
        if self.analysis_names.contains_key(&key) {
            return Err(WeaverError::constraint(format!(
                "duplicate analysis '{}' in group '{}'",
                analysis.function_name, self.analysis_groups[group.0].name
            )));
        }
        if self.modules[analysis.module.0].group != group {
            return Err(WeaverError::constraint(format!(
                "analysis '{}' belongs to a different group than its module",
                analysis.function_name
            )));
        }
        let id = AnalysisId(self.analyses.len());
        self.analysis_names.insert(key, id);
        self.modules[analysis.module.0].analyses.push(id);
        self.analyses.push(analysis);
        Ok(id)
    }

    pub fn register_operation(&mut self, operation: Operation) -> Result<OperationId> {
        self.check_mutable()?;
        let key = (operation.group, operation.name.clone());
        if self.operation_names.contains_key(&key) {
            return Err(WeaverError::constraint(format!(
                "duplicate operation '{}' in group '{}'",
                operation.name, self.analysis_groups[operation.group.0].name
            )));
        }
        let id = OperationId(self.operations.len());
        self.operation_names.insert(key, id);
        self.analysis_groups[operation.group.0].operations.push(id);
        self.operations.push(operation);
        Ok(id)
    }

    pub fn register_strategy(&mut self, strategy: CommStrategy) -> Result<StrategyId> {
        self.check_mutable()?;
        if self.strategy_names.contains_key(strategy.name()) {
            return Err(WeaverError::constraint(format!(
                "duplicate communication strategy '{}'",
                strategy.name()
            )));
        }
        let id = StrategyId(self.strategies.len());
        self.strategy_names.insert(strategy.name().to_string(), id);
        self.strategies.push(strategy);
        Ok(id)
    }

    pub fn register_protocol(&mut self, protocol: CommProtocol) -> Result<ProtocolId> {
        self.check_mutable()?;
        if self.protocol_names.contains_key(&protocol.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate communication protocol '{}'",
                protocol.name
            )));
        }
        let id = ProtocolId(self.protocols.len());
        self.protocol_names.insert(protocol.name.clone(), id);
        self.protocols.push(protocol);
        Ok(id)
    }

    pub fn register_place(&mut self, place: Place) -> Result<PlaceId> {
        self.check_mutable()?;
        if self.place_names.contains_key(&place.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate place '{}'",
                place.name
            )));
        }
        let id = PlaceId(self.places.len());
        self.place_names.insert(place.name.clone(), id);
        self.places.push(place);
        Ok(id)
    }

    pub fn register_enum(&mut self, list: EnumList) -> Result<()> {
        self.check_mutable()?;
        if self.enum_names.contains_key(&list.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate enumeration '{}'",
                list.name
            )));
        }
        self.enum_names.insert(list.name.clone(), self.enums.len());
        self.enums.push(list);
        Ok(())
    }

    /// Add a dependency edge between two registered modules
    pub fn add_module_dependency(
        &mut self,
        module: AnalysisModuleId,
        depends_on: AnalysisModuleId,
        soft: bool,
    ) -> Result<()> {
        self.check_mutable()?;
        self.modules[module.0].dependencies.push((depends_on, soft));
        Ok(())
    }

    /// Declare that `module` supports consuming `reduction`
    pub fn add_supported_reduction(
        &mut self,
        module: AnalysisModuleId,
        reduction: AnalysisModuleId,
    ) -> Result<()> {
        self.check_mutable()?;
        if !self.modules[reduction.0].is_reduction {
            return Err(WeaverError::constraint(format!(
                "module '{}' declares no reduction support but is listed as one",
                self.modules[reduction.0].name
            )));
        }
        self.modules[module.0].supported_reductions.push(reduction);
        Ok(())
    }

    /// Declare that `module` creates `call` at run time (wrap-across events)
    pub fn add_created_call(&mut self, module: AnalysisModuleId, call: CallId) -> Result<()> {
        self.check_mutable()?;
        self.modules[module.0].creates.push(call);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn api_group(&self, id: ApiGroupId) -> &ApiGroup {
        &self.api_groups[id.0]
    }

    pub fn call(&self, id: CallId) -> &ApiCall {
        &self.calls[id.0]
    }

    pub fn analysis_group(&self, id: AnalysisGroupId) -> &AnalysisGroup {
        &self.analysis_groups[id.0]
    }

    pub fn analysis(&self, id: AnalysisId) -> &Analysis {
        &self.analyses[id.0]
    }

    pub fn operation(&self, id: OperationId) -> &Operation {
        &self.operations[id.0]
    }

    pub fn module(&self, id: AnalysisModuleId) -> &AnalysisModule {
        &self.modules[id.0]
    }

    pub fn strategy(&self, id: StrategyId) -> &CommStrategy {
        &self.strategies[id.0]
    }

    pub fn protocol(&self, id: ProtocolId) -> &CommProtocol {
        &self.protocols[id.0]
    }

    pub fn place(&self, id: PlaceId) -> &Place {
        &self.places[id.0]
    }

    pub fn find_api_group(&self, name: &str) -> Option<ApiGroupId> {
        self.api_group_names.get(name).copied()
    }

    pub fn find_call_in_group(&self, group: ApiGroupId, name: &str) -> Option<CallId> {
        self.call_names.get(&(group, name.to_string())).copied()
    }

    /// Cross-group call lookup; returns the first registered call of that
    /// name (API specs are loaded in a fixed order, so this is stable).
    pub fn find_call(&self, name: &str) -> Option<CallId> {
        self.call_by_name.get(name).copied()
    }

    pub fn find_analysis_group(&self, name: &str) -> Option<AnalysisGroupId> {
        self.analysis_group_names.get(name).copied()
    }

    pub fn find_analysis(&self, group: AnalysisGroupId, function_name: &str) -> Option<AnalysisId> {
        self.analysis_names
            .get(&(group, function_name.to_string()))
            .copied()
    }

    pub fn find_operation(&self, group: AnalysisGroupId, name: &str) -> Option<OperationId> {
        self.operation_names
            .get(&(group, name.to_string()))
            .copied()
    }

    pub fn find_module(&self, name: &str) -> Option<AnalysisModuleId> {
        self.module_names.get(name).copied()
    }

    pub fn find_strategy(&self, name: &str) -> Option<StrategyId> {
        self.strategy_names.get(name).copied()
    }

    pub fn find_protocol(&self, name: &str) -> Option<ProtocolId> {
        self.protocol_names.get(name).copied()
    }

    pub fn find_place(&self, name: &str) -> Option<PlaceId> {
        self.place_names.get(name).copied()
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumList> {
        self.enum_names.get(name).map(|&i| &self.enums[i])
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    pub fn api_groups(&self) -> impl Iterator<Item = (ApiGroupId, &ApiGroup)> {
        self.api_groups
            .iter()
            .enumerate()
            .map(|(i, g)| (ApiGroupId(i), g))
    }

    pub fn calls(&self) -> impl Iterator<Item = (CallId, &ApiCall)> {
        self.calls.iter().enumerate().map(|(i, c)| (CallId(i), c))
    }

    pub fn analysis_groups(&self) -> impl Iterator<Item = (AnalysisGroupId, &AnalysisGroup)> {
        self.analysis_groups
            .iter()
            .enumerate()
            .map(|(i, g)| (AnalysisGroupId(i), g))
    }

    pub fn analyses(&self) -> impl Iterator<Item = (AnalysisId, &Analysis)> {
        self.analyses
            .iter()
            .enumerate()
            .map(|(i, a)| (AnalysisId(i), a))
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationId, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, o)| (OperationId(i), o))
    }

    pub fn modules(&self) -> impl Iterator<Item = (AnalysisModuleId, &AnalysisModule)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (AnalysisModuleId(i), m))
    }

    pub fn strategies(&self) -> impl Iterator<Item = (StrategyId, &CommStrategy)> {
        self.strategies
            .iter()
            .enumerate()
            .map(|(i, s)| (StrategyId(i), s))
    }

    pub fn protocols(&self) -> impl Iterator<Item = (ProtocolId, &CommProtocol)> {
        self.protocols
            .iter()
            .enumerate()
            .map(|(i, p)| (ProtocolId(i), p))
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter().enumerate().map(|(i, p)| (PlaceId(i), p))
    }

    /// Inputs of a calculation, analysis or operation alike
    pub fn calculation_inputs(&self, calc: CalculationRef) -> &[InputDescription] {
        match calc {
            CalculationRef::Analysis(id) => &self.analyses[id.0].inputs,
            CalculationRef::Operation(id) => &self.operations[id.0].inputs,
        }
    }

    /// Display name of a calculation
    pub fn calculation_name(&self, calc: CalculationRef) -> &str {
        match calc {
            CalculationRef::Analysis(id) => &self.analyses[id.0].function_name,
            CalculationRef::Operation(id) => &self.operations[id.0].name,
        }
    }
}
