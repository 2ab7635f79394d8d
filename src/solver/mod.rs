//! # Call-Properties Solver
//!
//! Derives, for every (layer, call, pre/post), which inputs are consumed
//! locally, which must travel in records, which operations run where, and
//! whether a wrapper or receival module is needed. Runs as a sequence of
//! passes over the tree-reduced layer graph:
//!
//! 1. local use: mapping inputs of hosted analyses become `used_args`
//!    ([`local_use`]);
//! 2. reduction placement, which needs only module placement
//!    ([`reduction`]);
//! 3. propagation of `args_to_receive` — root-down for ordinary events,
//!    leaves-up for wrap-down events, in-place for wrap-across events
//!    ([`propagation`]);
//! 4. automagic module inclusion, iterated to a fixed point
//!    ([`automagic`]). Included modules mark their analyses as local, so
//!    this must run before the closing pass derives the wrapper and
//!    receival flags; inclusion never grows a receive set, so the
//!    propagation results stay valid;
//! 5. record-uid assignment, operation scheduling and the derived
//!    wrapper/receival flags ([`records`]).

pub mod automagic;
pub mod local_use;
pub mod propagation;
pub mod records;
pub mod reduction;

use petgraph::graph::NodeIndex;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, WeaverError};
use crate::layout::{LayerGraph, UidAllocator};
use crate::mapping::MappingStore;
use crate::spec::{CallId, SpecModel};

/// True if `layer` is a wrap site of `call`: the place where the event is
/// intercepted or created, and hence where records for it originate.
pub fn is_originating(
    model: &SpecModel,
    layout: &LayerGraph,
    layer: NodeIndex,
    call: CallId,
) -> bool {
    let flags = model.call(call).flags;
    let layer = layout.layer(layer);
    if flags.wrap_across || flags.wrap_down {
        return layer
            .props(call, crate::mapping::CalculationOrder::Pre)
            .map(|p| p.wrap_across_created_on_level)
            .or_else(|| {
                layer
                    .props(call, crate::mapping::CalculationOrder::Post)
                    .map(|p| p.wrap_across_created_on_level)
            })
            .unwrap_or(false);
    }
    if flags.wrapped_everywhere {
        return true;
    }
    layer.is_application()
}

/// Run every solver pass in order.
///
/// Expects a tree-reduced layout; fails otherwise.
pub fn solve(
    model: &SpecModel,
    mappings: &MappingStore,
    layout: &mut LayerGraph,
    diags: &mut Diagnostics,
    uids: &mut UidAllocator,
) -> Result<()> {
    if !layout.is_reduced() {
        return Err(WeaverError::layout(
            "solver requires a tree-reduced layer graph",
        ));
    }

    local_use::compute_used_args(model, mappings, layout)?;
    diags.flush();

    reduction::place_reductions(model, mappings, layout, diags)?;
    diags.flush();

    propagation::propagate_upward(model, layout)?;
    propagation::propagate_downward(model, layout)?;
    propagation::compute_wrap_across(model, layout)?;

    // Automagic inclusion cannot grow receive sets, so it may run before
    // the closing pass settles uids and flags.
    automagic::include_automagic_modules(model, mappings, layout)?;
    diags.flush();

    records::finalize(model, mappings, layout, uids)?;

    Ok(())
}
