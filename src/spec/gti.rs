//! Communication Building Blocks
//!
//! The infrastructure side of the spec model: generic modules, inter/intra
//! communication strategies, communication protocols, places and enumeration
//! lists. These are referenced by the layout specification and materialized
//! by the module-configuration emitter.

use crate::spec::settings::SettingsDescription;

/// Common description of a loadable module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInfo {
    /// Name the module-stacking runtime loads the module under
    pub module_name: String,
    /// Name used in module-configuration documents
    pub config_name: String,
    pub instance_type: String,
    pub header_name: String,
    pub include_dir: String,
    /// Modules that must be loaded before this one, by module name
    pub prepended: Vec<String>,
    /// APIs this module requires to be present on its layer
    pub required_apis: Vec<String>,
}

/// A communication strategy: how records move along one channel
#[derive(Debug, Clone, PartialEq)]
pub enum CommStrategy {
    /// Between two layers; split into an upward and a downward half
    Inter {
        name: String,
        up: ModuleInfo,
        down: ModuleInfo,
        settings: SettingsDescription,
    },
    /// Within one layer
    Intra {
        name: String,
        module: ModuleInfo,
        settings: SettingsDescription,
    },
}

impl CommStrategy {
    pub fn name(&self) -> &str {
        match self {
            CommStrategy::Inter { name, .. } => name,
            CommStrategy::Intra { name, .. } => name,
        }
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, CommStrategy::Intra { .. })
    }

    pub fn settings(&self) -> &SettingsDescription {
        match self {
            CommStrategy::Inter { settings, .. } => settings,
            CommStrategy::Intra { settings, .. } => settings,
        }
    }
}

/// A communication protocol: the transport below a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct CommProtocol {
    pub name: String,
    pub module: ModuleInfo,
    /// Whether the protocol may carry intra-layer channels
    pub supports_intra: bool,
    pub settings: SettingsDescription,
}

/// What kind of process hosts a layer
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceKind {
    /// A standalone executable started by the runtime
    Executable { command: String },
    /// A module loaded into an existing process
    Module(ModuleInfo),
}

/// An execution place for a tool layer
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub kind: PlaceKind,
    pub required_apis: Vec<String>,
    pub settings: SettingsDescription,
}

/// A named list of enumeration entries, referenced by enum settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumList {
    pub name: String,
    pub entries: Vec<String>,
}
