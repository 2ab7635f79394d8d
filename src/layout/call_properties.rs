//! Per-(layer, call, order) Solver State
//!
//! [`CallProperties`] is the central derived datum of the weave: which inputs
//! a layer consumes locally (`used_args`), which inputs it must pack into the
//! record it sends on (`args_to_receive`), the unique id of that record
//! format, and the operations to execute before analyses run or records are
//! built.
//!
//! Orientation: `args_to_receive` of a layer describes the record *leaving*
//! that layer; the record arriving at a layer is its child's set. Record uids
//! are assigned per distinct non-empty shape within a layer.

use std::collections::HashMap;

use crate::mapping::MappingInput;
use crate::spec::{CallId, OperationId, SpecModel};

/// Where a record input originates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOrigin {
    /// An argument of the intercepted call
    CallArgument { index: usize },
    /// The result value of an operation instantiation
    OperationResult { op: OperationId, mapping_id: i32 },
    /// The length value of an array-returning operation instantiation
    OperationLen { op: OperationId, mapping_id: i32 },
    /// The return value of the intercepted call (post events)
    CallReturn,
}

/// One element of `used_args` / `args_to_receive`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInput {
    /// Unique name within its set; doubles as the serialized field name
    pub name: String,
    pub type_name: String,
    /// For arrays: name of the value holding the element count. The length
    /// value itself is a separate (scalar) member of the same set.
    pub array_length: Option<String>,
    pub origin: InputOrigin,
}

impl RecordInput {
    pub fn is_array(&self) -> bool {
        self.array_length.is_some()
    }

    /// Build a record input from a wired mapping input
    pub fn from_mapping_input(
        model: &SpecModel,
        call: CallId,
        input: &MappingInput,
    ) -> Option<RecordInput> {
        let origin = match input {
            MappingInput::Argument { index } => InputOrigin::CallArgument { index: *index },
            MappingInput::Operation {
                op,
                mapping_id,
                use_array_len,
            } => {
                if *use_array_len {
                    InputOrigin::OperationLen {
                        op: *op,
                        mapping_id: *mapping_id,
                    }
                } else {
                    InputOrigin::OperationResult {
                        op: *op,
                        mapping_id: *mapping_id,
                    }
                }
            }
            MappingInput::CallReturn => InputOrigin::CallReturn,
            // Call names and call ids are synthesized at every layer and
            // never enter a record.
            MappingInput::CallName | MappingInput::CallId => return None,
        };
        Some(RecordInput {
            name: input.display_name(model, call),
            type_name: input.type_name(model, call).ok()?,
            array_length: input.length_name(model, call),
            origin,
        })
    }
}

/// An insertion-ordered set of record inputs, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSet {
    items: Vec<RecordInput>,
}

impl InputSet {
    pub fn new() -> Self {
        InputSet::default()
    }

    /// Insert unless an input of the same name is already present
    pub fn insert(&mut self, input: RecordInput) {
        if !self.contains(&input.name) {
            self.items.push(input);
        }
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = RecordInput>) {
        for input in other {
            self.insert(input);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&RecordInput> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordInput> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.name.as_str()).collect()
    }

    /// Serialization order: scalars first (lengths before the arrays they
    /// measure), then arrays, both in insertion order.
    pub fn record_shape(&self) -> Vec<&RecordInput> {
        let mut shape: Vec<&RecordInput> =
            self.items.iter().filter(|i| !i.is_array()).collect();
        shape.extend(self.items.iter().filter(|i| i.is_array()));
        shape
    }

    /// Canonical signature of the record shape; identical shapes within a
    /// layer share one record uid.
    pub fn shape_signature(&self) -> Vec<(String, String, bool)> {
        self.record_shape()
            .iter()
            .map(|i| (i.name.clone(), i.type_name.clone(), i.is_array()))
            .collect()
    }
}

impl IntoIterator for InputSet {
    type Item = RecordInput;
    type IntoIter = std::vec::IntoIter<RecordInput>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a InputSet {
    type Item = &'a RecordInput;
    type IntoIter = std::slice::Iter<'a, RecordInput>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<RecordInput> for InputSet {
    fn from_iter<T: IntoIterator<Item = RecordInput>>(iter: T) -> Self {
        let mut set = InputSet::new();
        set.extend(iter);
        set
    }
}

/// Monotonic allocator for record unique ids
#[derive(Debug)]
pub struct UidAllocator {
    next: u64,
}

impl UidAllocator {
    pub fn new() -> Self {
        // 0 is reserved as "unset"
        UidAllocator { next: 1 }
    }

    pub fn next(&mut self) -> u64 {
        let uid = self.next;
        self.next += 1;
        uid
    }
}

impl Default for UidAllocator {
    fn default() -> Self {
        UidAllocator::new()
    }
}

/// Solver output for one (layer, call, order)
#[derive(Debug, Clone, Default)]
pub struct CallProperties {
    /// True if this layer must see the event at all (possibly only its
    /// occurrence, without any payload)
    pub information_required: bool,
    /// True if an analysis hosted on this layer is mapped to the event
    pub has_local_analyses: bool,
    /// Inputs consumed by calculations on this layer
    pub used_args: InputSet,
    /// Inputs this layer packs into the record it sends on
    pub args_to_receive: InputSet,
    /// Uid of the record format described by `args_to_receive`
    pub in_record_uid: Option<u64>,
    /// Operations (with mapping id) to run before analyses and record
    /// construction, in execution order
    pub ops_to_execute: Vec<(OperationId, i32)>,
    /// Set when a wrap-across call is created by a module on this layer
    pub wrap_across_created_on_level: bool,
    pub needs_wrapper: bool,
    pub needs_receival: bool,
}

impl CallProperties {
    pub fn executes_operation(&self, op: OperationId, mapping_id: i32) -> bool {
        self.ops_to_execute.contains(&(op, mapping_id))
    }
}

/// Assign record uids for one layer: identical shapes share a uid.
///
/// `sets` are (call, order-tag, shape) triples; returns one uid per entry in
/// input order. Only non-empty shapes receive a uid.
pub fn assign_uids(
    allocator: &mut UidAllocator,
    sets: &[Vec<(String, String, bool)>],
) -> Vec<Option<u64>> {
    let mut by_shape: HashMap<Vec<(String, String, bool)>, u64> = HashMap::new();
    sets.iter()
        .map(|shape| {
            if shape.is_empty() {
                None
            } else {
                Some(
                    *by_shape
                        .entry(shape.clone())
                        .or_insert_with(|| allocator.next()),
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str) -> RecordInput {
        RecordInput {
            name: name.into(),
            type_name: "int".into(),
            array_length: None,
            origin: InputOrigin::CallArgument { index: 0 },
        }
    }

    fn array(name: &str, len: &str) -> RecordInput {
        RecordInput {
            name: name.into(),
            type_name: "int*".into(),
            array_length: Some(len.into()),
            origin: InputOrigin::CallArgument { index: 1 },
        }
    }

    #[test]
    fn insert_dedupes_by_name() {
        let mut set = InputSet::new();
        set.insert(scalar("dest"));
        set.insert(scalar("dest"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn record_shape_puts_lengths_before_arrays() {
        let mut set = InputSet::new();
        set.insert(array("counts", "size"));
        set.insert(scalar("size"));
        let names: Vec<&str> = set.record_shape().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["size", "counts"]);
    }

    #[test]
    fn identical_shapes_share_uids() {
        let mut alloc = UidAllocator::new();
        let shape = vec![("a".to_string(), "int".to_string(), false)];
        let other = vec![("b".to_string(), "int".to_string(), false)];
        let uids = assign_uids(&mut alloc, &[shape.clone(), other, shape, vec![]]);
        assert_eq!(uids[0], uids[2]);
        assert_ne!(uids[0], uids[1]);
        assert_eq!(uids[3], None);
    }
}
