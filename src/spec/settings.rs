//! Setting Descriptions and Values
//!
//! A module, strategy, protocol or place declares the settings it accepts as
//! a set of [`SettingDescription`]s. Concrete [`Setting`] values from the
//! layout specification are validated against those descriptions.

use std::collections::HashMap;

use crate::error::{Result, WeaverError};

/// Usage intent of a file-path setting; decides whether the file must exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePathIntent {
    Read,
    Write,
    ReadWrite,
}

/// The kind of value a setting accepts
#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    Bool,
    /// Integer with optional inclusive range
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Float with optional inclusive range
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    String,
    Path,
    FilePath {
        intent: FilePathIntent,
    },
    /// Single selection out of a named enumeration list
    Enum {
        list: String,
    },
    /// Multi selection out of a named enumeration list
    EnumSelection {
        list: String,
        at_least_one: bool,
    },
}

/// Declares one accepted setting with its default value
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDescription {
    pub name: String,
    pub kind: SettingKind,
    pub default: String,
}

impl SettingDescription {
    pub fn new(name: impl Into<String>, kind: SettingKind, default: impl Into<String>) -> Self {
        SettingDescription {
            name: name.into(),
            kind,
            default: default.into(),
        }
    }

    /// Validate a raw value against this description.
    ///
    /// Enum kinds need the enumeration lists of the spec model; the caller
    /// passes the resolved entries for the referenced list.
    pub fn validate(&self, value: &str, enum_entries: Option<&[String]>) -> Result<()> {
        match &self.kind {
            SettingKind::Bool => match value {
                "0" | "1" | "true" | "false" => Ok(()),
                _ => Err(WeaverError::constraint(format!(
                    "setting '{}' expects a boolean, got '{}'",
                    self.name, value
                ))),
            },
            SettingKind::Integer { min, max } => {
                let v: i64 = value.parse().map_err(|_| {
                    WeaverError::constraint(format!(
                        "setting '{}' expects an integer, got '{}'",
                        self.name, value
                    ))
                })?;
                if min.map_or(false, |m| v < m) || max.map_or(false, |m| v > m) {
                    return Err(WeaverError::constraint(format!(
                        "setting '{}' value {} outside allowed range",
                        self.name, v
                    )));
                }
                Ok(())
            }
            SettingKind::Float { min, max } => {
                let v: f64 = value.parse().map_err(|_| {
                    WeaverError::constraint(format!(
                        "setting '{}' expects a float, got '{}'",
                        self.name, value
                    ))
                })?;
                if min.map_or(false, |m| v < m) || max.map_or(false, |m| v > m) {
                    return Err(WeaverError::constraint(format!(
                        "setting '{}' value {} outside allowed range",
                        self.name, v
                    )));
                }
                Ok(())
            }
            // Paths and strings carry no further static constraints; file
            // existence is a run-time concern of the generated system.
            SettingKind::String | SettingKind::Path | SettingKind::FilePath { .. } => Ok(()),
            SettingKind::Enum { list } => {
                let entries = enum_entries.ok_or_else(|| {
                    WeaverError::unresolved("enumeration", list.clone())
                })?;
                if entries.iter().any(|e| e == value) {
                    Ok(())
                } else {
                    Err(WeaverError::constraint(format!(
                        "setting '{}' value '{}' not in enumeration '{}'",
                        self.name, value, list
                    )))
                }
            }
            SettingKind::EnumSelection { list, at_least_one } => {
                let entries = enum_entries.ok_or_else(|| {
                    WeaverError::unresolved("enumeration", list.clone())
                })?;
                let selected: Vec<&str> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if *at_least_one && selected.is_empty() {
                    return Err(WeaverError::constraint(format!(
                        "setting '{}' requires at least one selection",
                        self.name
                    )));
                }
                for s in &selected {
                    if !entries.iter().any(|e| e == s) {
                        return Err(WeaverError::constraint(format!(
                            "setting '{}' selection '{}' not in enumeration '{}'",
                            self.name, s, list
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// The settings a configurable entity accepts, looked up by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDescription {
    descriptions: Vec<SettingDescription>,
    by_name: HashMap<String, usize>,
}

impl SettingsDescription {
    pub fn new() -> Self {
        SettingsDescription::default()
    }

    pub fn add(&mut self, description: SettingDescription) -> Result<()> {
        if self.by_name.contains_key(&description.name) {
            return Err(WeaverError::constraint(format!(
                "duplicate setting description '{}'",
                description.name
            )));
        }
        self.by_name
            .insert(description.name.clone(), self.descriptions.len());
        self.descriptions.push(description);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&SettingDescription> {
        self.by_name.get(name).map(|&i| &self.descriptions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SettingDescription> {
        self.descriptions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

/// A concrete (name, value) pair from the layout specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

impl Setting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Setting {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_range_is_enforced() {
        let d = SettingDescription::new(
            "buffer_size",
            SettingKind::Integer {
                min: Some(1),
                max: Some(1024),
            },
            "64",
        );
        assert!(d.validate("512", None).is_ok());
        assert!(d.validate("0", None).is_err());
        assert!(d.validate("abc", None).is_err());
    }

    #[test]
    fn enum_selection_checks_entries() {
        let entries = vec!["shm".to_string(), "tcp".to_string()];
        let d = SettingDescription::new(
            "transports",
            SettingKind::EnumSelection {
                list: "transport_kinds".into(),
                at_least_one: true,
            },
            "shm",
        );
        assert!(d.validate("shm,tcp", Some(&entries)).is_ok());
        assert!(d.validate("", Some(&entries)).is_err());
        assert!(d.validate("ib", Some(&entries)).is_err());
    }

    #[test]
    fn duplicate_description_rejected() {
        let mut all = SettingsDescription::new();
        all.add(SettingDescription::new("a", SettingKind::Bool, "0"))
            .unwrap();
        assert!(all
            .add(SettingDescription::new("a", SettingKind::String, ""))
            .is_err());
    }
}
