//! Weaver Error Types
//!
//! One error enum for the whole pipeline. Errors abort the run after the
//! current pass finishes its safe work; warnings are collected separately
//! (see [`crate::diagnostics`]) and never abort.

use std::io;
use thiserror::Error;

/// Errors raised while loading specifications or solving the layout
#[derive(Error, Debug)]
pub enum WeaverError {
    /// Malformed specification document
    #[error("parse error in {file}: {detail}")]
    Parse { file: String, detail: String },

    /// A name that should resolve to a registered entity does not
    #[error("unresolved {kind} reference: '{name}'")]
    UnresolvedReference { kind: &'static str, name: String },

    /// Duplicate names, arity mismatches, mutation after freeze, order
    /// collisions and similar model-level violations
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Structural problem in the layer layout (cycle, orphan, missing
    /// intra-communication, unreachable layer)
    #[error("layout error: {0}")]
    Layout(String),

    /// An analysis module cannot be placed consistently
    #[error("placement error: {0}")]
    Placement(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WeaverError {
    /// Build a parse error with file context
    pub fn parse(file: impl Into<String>, detail: impl Into<String>) -> Self {
        WeaverError::Parse {
            file: file.into(),
            detail: detail.into(),
        }
    }

    /// Build an unresolved-reference error
    pub fn unresolved(kind: &'static str, name: impl Into<String>) -> Self {
        WeaverError::UnresolvedReference {
            kind,
            name: name.into(),
        }
    }

    /// Build a constraint violation
    pub fn constraint(detail: impl Into<String>) -> Self {
        WeaverError::ConstraintViolation(detail.into())
    }

    /// Build a layout error
    pub fn layout(detail: impl Into<String>) -> Self {
        WeaverError::Layout(detail.into())
    }

    /// Build a placement error
    pub fn placement(detail: impl Into<String>) -> Self {
        WeaverError::Placement(detail.into())
    }
}

/// Result type for weaver operations
pub type Result<T> = std::result::Result<T, WeaverError>;
