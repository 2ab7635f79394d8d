//! # Mapping Model
//!
//! Attaches calculations (analyses and operations) to API calls. A mapping
//! fixes when the calculation runs relative to the wrapped call (pre/post),
//! which per-call instance it is (mapping id), its order among the other
//! calculations on the same call, and the wiring of every declared input to
//! concrete call data.
//!
//! Attach-time checks: input arity must match the calculation's descriptor;
//! static type mismatches are recorded as warnings but do not fail the
//! attach; an operation input must reference an operation already mapped to
//! the same call under the given mapping id.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Result, WeaverError};
use crate::spec::{
    AnalysisId, ArrayLength, CalculationRef, CallId, OperationId, SpecModel,
};

/// Whether a calculation runs before or after the wrapped call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalculationOrder {
    Pre,
    Post,
}

impl CalculationOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationOrder::Pre => "pre",
            CalculationOrder::Post => "post",
        }
    }
}

/// One wired input of a mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingInput {
    /// A named argument of the target call, by argument index
    Argument { index: usize },
    /// The result (or length, for array-returning operations) of an
    /// operation mapped to the same call
    Operation {
        op: OperationId,
        mapping_id: i32,
        use_array_len: bool,
    },
    /// The call name as a string literal
    CallName,
    /// The return value of the call; post mappings only
    CallReturn,
    /// The call's globally unique integer id
    CallId,
}

impl MappingInput {
    /// Expression/variable name this input reads from, unique per call
    pub fn display_name(&self, model: &SpecModel, call: CallId) -> String {
        match self {
            MappingInput::Argument { index } => {
                model.call(call).arguments[*index].name.clone()
            }
            MappingInput::Operation {
                op,
                mapping_id,
                use_array_len,
            } => {
                let operation = model.operation(*op);
                if *use_array_len {
                    operation.result_len_var_name(*mapping_id)
                } else {
                    operation.result_var_name(*mapping_id)
                }
            }
            MappingInput::CallName => format!("\"{}\"", model.call(call).name),
            MappingInput::CallReturn => "call_return".to_string(),
            MappingInput::CallId => model.call(call).unique_id.to_string(),
        }
    }

    /// Static type of this input
    pub fn type_name(&self, model: &SpecModel, call: CallId) -> Result<String> {
        match self {
            MappingInput::Argument { index } => {
                Ok(model.call(call).arguments[*index].type_name.clone())
            }
            MappingInput::Operation {
                op, use_array_len, ..
            } => {
                let operation = model.operation(*op);
                if *use_array_len {
                    operation.array_len_type.clone().ok_or_else(|| {
                        WeaverError::constraint(format!(
                            "operation '{}' returns no array, its length cannot be an input",
                            operation.name
                        ))
                    })
                } else {
                    Ok(operation.return_type.clone())
                }
            }
            MappingInput::CallName => Ok("const char*".to_string()),
            MappingInput::CallReturn => Ok(model.call(call).return_type.clone()),
            MappingInput::CallId => Ok("int".to_string()),
        }
    }

    /// True if this input is an array value
    pub fn is_array(&self, model: &SpecModel, call: CallId) -> bool {
        match self {
            MappingInput::Argument { index } => model.call(call).arguments[*index].is_array(),
            MappingInput::Operation {
                op, use_array_len, ..
            } => !use_array_len && model.operation(*op).has_array_return(),
            _ => false,
        }
    }

    /// For array inputs: the name of the value holding the element count
    pub fn length_name(&self, model: &SpecModel, call: CallId) -> Option<String> {
        match self {
            MappingInput::Argument { index } => {
                match model.call(call).arguments[*index].length.as_ref()? {
                    ArrayLength::Argument(name) => Some(name.clone()),
                    ArrayLength::Operation {
                        op,
                        mapping_id,
                        use_array_len,
                    } => {
                        let operation = model.operation(*op);
                        Some(if *use_array_len {
                            operation.result_len_var_name(*mapping_id)
                        } else {
                            operation.result_var_name(*mapping_id)
                        })
                    }
                }
            }
            MappingInput::Operation {
                op,
                mapping_id,
                use_array_len,
            } if !use_array_len && model.operation(*op).has_array_return() => {
                Some(model.operation(*op).result_len_var_name(*mapping_id))
            }
            _ => None,
        }
    }
}

/// An attachment of a calculation to a call
#[derive(Debug, Clone)]
pub struct Mapping {
    pub call: CallId,
    pub calculation: CalculationRef,
    pub order: CalculationOrder,
    /// Distinguishes multiple mappings of the same calculation to one call
    pub mapping_id: i32,
    /// Lower runs first among calculations of the same kind on the same
    /// call; negative values are reserved for internal calculations
    pub intra_call_order: i32,
    pub inputs: Vec<MappingInput>,
    /// Set when this mapping is a reduction attachment
    pub is_reduction: bool,
}

/// All mappings of the weave, with by-call and by-calculation indexes
#[derive(Debug, Default)]
pub struct MappingStore {
    mappings: Vec<Mapping>,
    by_call_order: HashMap<(CallId, CalculationOrder), Vec<usize>>,
    by_calc_call: HashMap<(CalculationRef, CallId), Vec<usize>>,
}

impl MappingStore {
    pub fn new() -> Self {
        MappingStore::default()
    }

    /// Attach an analysis to a call. Returns the assigned mapping id.
    pub fn attach_analysis(
        &mut self,
        model: &SpecModel,
        diags: &mut Diagnostics,
        call: CallId,
        analysis: AnalysisId,
        order: CalculationOrder,
        inputs: Vec<MappingInput>,
        intra_call_order: i32,
    ) -> Result<i32> {
        self.attach(
            model,
            diags,
            call,
            CalculationRef::Analysis(analysis),
            order,
            inputs,
            intra_call_order,
            false,
        )
    }

    /// Attach an operation to a call. Returns the assigned mapping id.
    pub fn attach_operation(
        &mut self,
        model: &SpecModel,
        diags: &mut Diagnostics,
        call: CallId,
        op: OperationId,
        order: CalculationOrder,
        inputs: Vec<MappingInput>,
        intra_call_order: i32,
    ) -> Result<i32> {
        self.attach(
            model,
            diags,
            call,
            CalculationRef::Operation(op),
            order,
            inputs,
            intra_call_order,
            false,
        )
    }

    /// Attach a reduction-capable analysis as a reduction.
    ///
    /// The analysis module must declare reduction support; where the
    /// reduction is instantiated is decided later by the placement pass.
    pub fn attach_reduction(
        &mut self,
        model: &SpecModel,
        diags: &mut Diagnostics,
        call: CallId,
        analysis: AnalysisId,
        order: CalculationOrder,
        inputs: Vec<MappingInput>,
        intra_call_order: i32,
    ) -> Result<i32> {
        let module = model.module(model.analysis(analysis).module);
        if !module.is_reduction {
            return Err(WeaverError::constraint(format!(
                "module '{}' declares no reduction support",
                module.name
            )));
        }
        self.attach(
            model,
            diags,
            call,
            CalculationRef::Analysis(analysis),
            order,
            inputs,
            intra_call_order,
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn attach(
        &mut self,
        model: &SpecModel,
        diags: &mut Diagnostics,
        call: CallId,
        calculation: CalculationRef,
        order: CalculationOrder,
        inputs: Vec<MappingInput>,
        intra_call_order: i32,
        is_reduction: bool,
    ) -> Result<i32> {
        let descriptors = model.calculation_inputs(calculation);
        let calc_name = model.calculation_name(calculation).to_string();
        if inputs.len() != descriptors.len() {
            return Err(WeaverError::constraint(format!(
                "'{}' declares {} inputs but the mapping to '{}' wires {}",
                calc_name,
                descriptors.len(),
                model.call(call).name,
                inputs.len()
            )));
        }

        for (i, input) in inputs.iter().enumerate() {
            if matches!(input, MappingInput::CallReturn) && order != CalculationOrder::Post {
                return Err(WeaverError::constraint(format!(
                    "'{}' uses the return value of '{}' in a pre mapping",
                    calc_name,
                    model.call(call).name
                )));
            }
            if let MappingInput::Operation { op, mapping_id, .. } = input {
                if self.operation_mapping(call, *op, *mapping_id).is_none() {
                    return Err(WeaverError::unresolved(
                        "operation mapping",
                        format!(
                            "{}@{} on call '{}'",
                            model.operation(*op).name,
                            mapping_id,
                            model.call(call).name
                        ),
                    ));
                }
            }

            // Static type check is advisory only; generated code may rely
            // on implicit conversions the descriptor does not spell out.
            let actual = input.type_name(model, call)?;
            if actual.trim() != descriptors[i].type_name.trim() {
                diags.record(Warning::TypeMismatch {
                    calculation: calc_name.clone(),
                    call: model.call(call).name.clone(),
                    input_index: i,
                    expected: descriptors[i].type_name.clone(),
                    actual,
                });
            }
        }

        let mapping_id = self
            .by_calc_call
            .get(&(calculation, call))
            .map_or(0, |v| v.len()) as i32;

        let index = self.mappings.len();
        self.mappings.push(Mapping {
            call,
            calculation,
            order,
            mapping_id,
            intra_call_order,
            inputs,
            is_reduction,
        });
        self.by_call_order
            .entry((call, order))
            .or_default()
            .push(index);
        self.by_calc_call
            .entry((calculation, call))
            .or_default()
            .push(index);
        Ok(mapping_id)
    }

    /// Mappings of a call for one order, sorted by intra-call order
    /// (attachment order breaks ties)
    pub fn mappings_of(&self, call: CallId, order: CalculationOrder) -> Vec<&Mapping> {
        let mut result: Vec<&Mapping> = self
            .by_call_order
            .get(&(call, order))
            .map(|v| v.iter().map(|&i| &self.mappings[i]).collect())
            .unwrap_or_default();
        result.sort_by_key(|m| m.intra_call_order);
        result
    }

    /// All mappings of one calculation to one call
    pub fn mappings_for(&self, calculation: CalculationRef, call: CallId) -> Vec<&Mapping> {
        self.by_calc_call
            .get(&(calculation, call))
            .map(|v| v.iter().map(|&i| &self.mappings[i]).collect())
            .unwrap_or_default()
    }

    /// The mapping of an operation to a call under a specific mapping id
    pub fn operation_mapping(
        &self,
        call: CallId,
        op: OperationId,
        mapping_id: i32,
    ) -> Option<&Mapping> {
        self.by_calc_call
            .get(&(CalculationRef::Operation(op), call))
            .and_then(|v| {
                v.iter()
                    .map(|&i| &self.mappings[i])
                    .find(|m| m.mapping_id == mapping_id)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
