//! Warning Collection
//!
//! Warnings are accumulated during a pass and printed when the pass ends.
//! They never abort the run; fatal conditions use [`crate::error::WeaverError`]
//! instead.

use tracing::warn;

/// A non-fatal finding recorded during loading or solving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A mapping input's static type does not match the calculation's
    /// input descriptor. The attach still succeeds.
    TypeMismatch {
        calculation: String,
        call: String,
        input_index: usize,
        expected: String,
        actual: String,
    },
    /// More than one reduction-capable analysis was mapped to the same
    /// (call, order); only one may stay a reduction.
    MultipleReductions {
        call: String,
        order: String,
        kept: String,
        removed: String,
    },
    /// A valid reduction had to be demoted to an ordinary analysis.
    ReductionDemoted { module: String, layer: u32 },
}

impl Warning {
    fn render(&self) -> String {
        match self {
            Warning::TypeMismatch {
                calculation,
                call,
                input_index,
                expected,
                actual,
            } => format!(
                "input {} of '{}' mapped to '{}' has type '{}' but the descriptor expects '{}'",
                input_index, calculation, call, actual, expected
            ),
            Warning::MultipleReductions {
                call,
                order,
                kept,
                removed,
            } => format!(
                "multiple reductions mapped to {} ({}): keeping '{}', demoting '{}'",
                call, order, kept, removed
            ),
            Warning::ReductionDemoted { module, layer } => format!(
                "reduction '{}' runs as an ordinary analysis on layer {}",
                module, layer
            ),
        }
    }
}

/// Accumulates warnings; passes flush at their end.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pending: Vec<Warning>,
    emitted: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Record a warning for the current pass
    pub fn record(&mut self, warning: Warning) {
        self.pending.push(warning);
    }

    /// Print all pending warnings and move them to the emitted log
    pub fn flush(&mut self) {
        for w in self.pending.drain(..) {
            warn!("{}", w.render());
            self.emitted.push(w);
        }
    }

    /// All warnings recorded so far, flushed or not
    pub fn all(&self) -> impl Iterator<Item = &Warning> {
        self.emitted.iter().chain(self.pending.iter())
    }

    /// Number of warnings recorded so far
    pub fn len(&self) -> usize {
        self.emitted.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
