//! # TBON Weaver
//!
//! Tool-synthesis build system for a tree-based overlay network (TBON) of
//! correctness-analysis tools. Given declarative descriptions of the
//! intercepted API, the analyses consuming its events, the available
//! communication building blocks, and a layout fixing the overlay's shape,
//! the weaver computes for every layer which inputs each call needs, where
//! they arrive from, which operations derive further inputs, and where
//! reductions may fold events; it then emits the input documents for the
//! downstream code generators.
//!
//! ## Pipeline
//!
//! ```text
//! gti.xml + analysis.xml* + api.xml*
//!     ↓
//! [Readers]               → SpecModel (frozen) + MappingStore
//!     ↓
//! layout.xml → [Readers]  → LayerGraph
//!     ↓
//! [DAG→tree reduction]    → one out-edge per non-root layer
//!     ↓
//! [Solver]                → CallProperties per (layer, call, pre/post)
//!   local use → reduction placement → receive-set propagation
//!   → automagic inclusion → record uids, op schedules, flags
//!     ↓
//! [Channel-id plan]       → bits per sub-id, word count
//!     ↓
//! [Emitters]              → wrapper / receival / module-config /
//!                           buildgen input documents (+ DOT dumps)
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `spec` | Frozen registry of calls, analyses, operations, modules |
//! | `mapping` | Calculation-to-call attachments with input wiring |
//! | `layout` | Layer graph, adjacencies, per-call solver state |
//! | `channel_id` | Binary layout of the record routing identifier |
//! | `solver` | The propagation passes deriving the call properties |
//! | `readers` | XML loaders for the four specification kinds |
//! | `generation` | Output document emitters and DOT dumps |
//! | `driver` | Composition of the whole weave |

pub mod channel_id;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod generation;
pub mod layout;
pub mod mapping;
pub mod readers;
pub mod solver;
pub mod spec;

pub use channel_id::ChannelIdPlan;
pub use config::WeaverConfig;
pub use diagnostics::{Diagnostics, Warning};
pub use error::{Result, WeaverError};
pub use layout::{CallProperties, InputSet, LayerGraph, RecordInput, UidAllocator};
pub use mapping::{CalculationOrder, Mapping, MappingInput, MappingStore};
pub use spec::SpecModel;
