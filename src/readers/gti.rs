//! GTI Specification Reader
//!
//! Loads the infrastructure catalog: enumeration lists, communication
//! protocols, inter/intra communication strategies and places.

use std::path::Path;

use crate::error::{Result, WeaverError};
use crate::readers::{parse_document, parse_file, SpecNode};
use crate::spec::{
    CommProtocol, CommStrategy, EnumList, FilePathIntent, ModuleInfo, Place, PlaceKind,
    SettingDescription, SettingKind, SettingsDescription, SpecModel,
};

/// Load a GTI specification file into the model
pub fn load_gti(path: &Path, model: &mut SpecModel) -> Result<()> {
    let root = parse_file(path)?;
    load_gti_node(&root, &path.display().to_string(), model)
}

/// Load a GTI specification from an in-memory document
pub fn load_gti_str(input: &str, file: &str, model: &mut SpecModel) -> Result<()> {
    let root = parse_document(input, file)?;
    load_gti_node(&root, file, model)
}

fn load_gti_node(root: &SpecNode, file: &str, model: &mut SpecModel) -> Result<()> {
    if root.name != "gti-specification" {
        return Err(WeaverError::parse(
            file,
            format!("expected <gti-specification>, found <{}>", root.name),
        ));
    }

    if let Some(enums) = root.child("enums") {
        for node in enums.children_named("enum") {
            let name = node.required_attr("name", file)?.to_string();
            let entries = node
                .children_named("entry")
                .map(|e| e.text.trim().to_string())
                .collect();
            model.register_enum(EnumList { name, entries })?;
        }
    }

    if let Some(protocols) = root.child("protocols") {
        for node in protocols.children_named("protocol") {
            let name = node.required_attr("name", file)?.to_string();
            let module = read_module_info(
                node.child("module").ok_or_else(|| {
                    WeaverError::parse(file, format!("protocol '{}' misses <module>", name))
                })?,
                file,
            )?;
            let settings = read_settings_description(node.child("settings"), file)?;
            model.register_protocol(CommProtocol {
                name,
                module,
                supports_intra: node.bool_attr("supports-intra"),
                settings,
            })?;
        }
    }

    if let Some(strategies) = root.child("strategies") {
        for node in strategies.children_named("strategy") {
            let name = node.required_attr("name", file)?.to_string();
            let settings = read_settings_description(node.child("settings"), file)?;
            let strategy = match node.required_attr("kind", file)? {
                "inter" => {
                    let up = read_module_info(
                        node.child("up").ok_or_else(|| {
                            WeaverError::parse(file, format!("strategy '{}' misses <up>", name))
                        })?,
                        file,
                    )?;
                    let down = read_module_info(
                        node.child("down").ok_or_else(|| {
                            WeaverError::parse(file, format!("strategy '{}' misses <down>", name))
                        })?,
                        file,
                    )?;
                    CommStrategy::Inter {
                        name,
                        up,
                        down,
                        settings,
                    }
                }
                "intra" => {
                    let module = read_module_info(
                        node.child("module").ok_or_else(|| {
                            WeaverError::parse(
                                file,
                                format!("strategy '{}' misses <module>", name),
                            )
                        })?,
                        file,
                    )?;
                    CommStrategy::Intra {
                        name,
                        module,
                        settings,
                    }
                }
                other => {
                    return Err(WeaverError::parse(
                        file,
                        format!("unknown strategy kind '{}'", other),
                    ))
                }
            };
            model.register_strategy(strategy)?;
        }
    }

    if let Some(places) = root.child("places") {
        for node in places.children_named("place") {
            let name = node.required_attr("name", file)?.to_string();
            let kind = match node.required_attr("kind", file)? {
                "executable" => PlaceKind::Executable {
                    command: node.required_attr("command", file)?.to_string(),
                },
                "module" => PlaceKind::Module(read_module_info(
                    node.child("module").ok_or_else(|| {
                        WeaverError::parse(file, format!("place '{}' misses <module>", name))
                    })?,
                    file,
                )?),
                other => {
                    return Err(WeaverError::parse(
                        file,
                        format!("unknown place kind '{}'", other),
                    ))
                }
            };
            let required_apis = read_required_apis(node);
            let settings = read_settings_description(node.child("settings"), file)?;
            model.register_place(Place {
                name,
                kind,
                required_apis,
                settings,
            })?;
        }
    }

    Ok(())
}

/// Read the common module description element
pub fn read_module_info(node: &SpecNode, file: &str) -> Result<ModuleInfo> {
    let prepended = node
        .child("prepended")
        .map(|p| {
            p.children_named("module")
                .filter_map(|m| m.attr("name").map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Ok(ModuleInfo {
        module_name: node.required_attr("module-name", file)?.to_string(),
        config_name: node.required_attr("config-name", file)?.to_string(),
        instance_type: node.attr("instance-type").unwrap_or_default().to_string(),
        header_name: node.attr("header-name").unwrap_or_default().to_string(),
        include_dir: node.attr("include-dir").unwrap_or_default().to_string(),
        prepended,
        required_apis: read_required_apis(node),
    })
}

fn read_required_apis(node: &SpecNode) -> Vec<String> {
    node.child("required-apis")
        .map(|r| {
            r.children_named("api")
                .map(|a| a.text.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Read a `<settings>` block of setting descriptions
pub fn read_settings_description(
    node: Option<&SpecNode>,
    file: &str,
) -> Result<SettingsDescription> {
    let mut result = SettingsDescription::new();
    let Some(node) = node else {
        return Ok(result);
    };
    for setting in node.children_named("setting") {
        let name = setting.required_attr("name", file)?.to_string();
        let default = setting.attr("default").unwrap_or_default().to_string();
        let kind = match setting.required_attr("type", file)? {
            "bool" => SettingKind::Bool,
            "integer" => SettingKind::Integer {
                min: parse_opt_attr(setting, "min", file)?,
                max: parse_opt_attr(setting, "max", file)?,
            },
            "float" => SettingKind::Float {
                min: parse_opt_attr(setting, "min", file)?,
                max: parse_opt_attr(setting, "max", file)?,
            },
            "string" => SettingKind::String,
            "path" => SettingKind::Path,
            "file-path" => SettingKind::FilePath {
                intent: match setting.attr("intent") {
                    Some("read") | None => FilePathIntent::Read,
                    Some("write") => FilePathIntent::Write,
                    Some("read-write") => FilePathIntent::ReadWrite,
                    Some(other) => {
                        return Err(WeaverError::parse(
                            file,
                            format!("unknown file-path intent '{}'", other),
                        ))
                    }
                },
            },
            "enum" => SettingKind::Enum {
                list: setting.required_attr("list", file)?.to_string(),
            },
            "enum-selection" => SettingKind::EnumSelection {
                list: setting.required_attr("list", file)?.to_string(),
                at_least_one: setting.bool_attr("at-least-one"),
            },
            other => {
                return Err(WeaverError::parse(
                    file,
                    format!("unknown setting type '{}'", other),
                ))
            }
        };
        result.add(SettingDescription::new(name, kind, default))?;
    }
    Ok(result)
}

fn parse_opt_attr<T: std::str::FromStr>(
    node: &SpecNode,
    name: &str,
    file: &str,
) -> Result<Option<T>> {
    match node.attr(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            WeaverError::parse(
                file,
                format!("attribute '{}' has invalid value '{}'", name, raw),
            )
        }),
    }
}
