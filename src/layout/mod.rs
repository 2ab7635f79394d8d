//! # Layer Graph
//!
//! The typed DAG of overlay layers. Nodes are layers (order, size, place,
//! assigned analysis modules, solved call properties); edges are adjacencies
//! carrying a communication implementation and a distribution policy, and
//! point in the direction records travel for ordinary events: from the
//! application layer (order 0) toward the root of the overlay.
//!
//! Before code synthesis the DAG is reduced to a tree: a layer with several
//! in-edges keeps only the one from the predecessor with the highest order
//! (the predecessor closest to the root); afterwards every layer except the
//! root has exactly one out-edge.

pub mod call_properties;

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

pub use call_properties::{
    assign_uids, CallProperties, InputOrigin, InputSet, RecordInput, UidAllocator,
};

use crate::error::{Result, WeaverError};
use crate::mapping::CalculationOrder;
use crate::spec::{AnalysisModuleId, CallId, PlaceId, ProtocolId, Setting, SpecModel, StrategyId};

/// A configured communication: strategy + protocol with their settings
#[derive(Debug, Clone, PartialEq)]
pub struct Communication {
    pub strategy: StrategyId,
    pub protocol: ProtocolId,
    pub strategy_settings: Vec<Setting>,
    pub protocol_settings: Vec<Setting>,
}

impl Communication {
    pub fn new(strategy: StrategyId, protocol: ProtocolId) -> Self {
        Communication {
            strategy,
            protocol,
            strategy_settings: Vec::new(),
            protocol_settings: Vec::new(),
        }
    }
}

/// How source processes of an adjacency map onto target processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Uniform,
    ByBlock(u64),
}

/// A directed inter-layer connection
#[derive(Debug, Clone)]
pub struct Adjacency {
    pub comm: Communication,
    pub distribution: Distribution,
}

/// An outgoing channel of a layer, as seen by forwarding code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardChannel {
    /// The (single, after tree reduction) upward adjacency
    Up,
    /// The layer's intra-communication
    Intra,
}

/// One tier of the overlay
#[derive(Debug, Clone)]
pub struct Layer {
    pub order: u32,
    /// Number of processes in this layer
    pub size: u64,
    /// Execution place; `None` for the application layer
    pub place: Option<PlaceId>,
    /// Analysis modules assigned to this layer (placement plus transitive
    /// hard dependencies)
    pub modules: Vec<AnalysisModuleId>,
    /// Modules allowed to run as reductions here; filled by the placement
    /// pass, never directly from the layout spec
    pub reductions: Vec<AnalysisModuleId>,
    pub intra_comm: Option<Communication>,
    /// Solved per-call properties, pre and post
    pub properties: HashMap<(CallId, CalculationOrder), CallProperties>,
    /// For events reduced above this layer: the channels over which the
    /// partially reduced record leaves
    pub reduction_forwards: HashMap<(CallId, CalculationOrder), Vec<ForwardChannel>>,
}

impl Layer {
    fn new(order: u32, size: u64, place: Option<PlaceId>) -> Self {
        Layer {
            order,
            size,
            place,
            modules: Vec::new(),
            reductions: Vec::new(),
            intra_comm: None,
            properties: HashMap::new(),
            reduction_forwards: HashMap::new(),
        }
    }

    pub fn is_application(&self) -> bool {
        self.order == 0
    }

    pub fn props(&self, call: CallId, order: CalculationOrder) -> Option<&CallProperties> {
        self.properties.get(&(call, order))
    }

    pub fn props_mut(&mut self, call: CallId, order: CalculationOrder) -> &mut CallProperties {
        self.properties.entry((call, order)).or_default()
    }

    pub fn hosts_module(&self, module: AnalysisModuleId) -> bool {
        self.modules.contains(&module)
    }

    pub fn may_reduce(&self, module: AnalysisModuleId) -> bool {
        self.reductions.contains(&module)
    }
}

/// The layer DAG plus layout-level directives
#[derive(Debug, Default)]
pub struct LayerGraph {
    graph: DiGraph<Layer, Adjacency>,
    by_order: HashMap<u32, NodeIndex>,
    /// Default communication for connections that configure none
    pub default_comm: Option<Communication>,
    /// (higher, lower) layer orders whose module-config documents merge;
    /// the higher layer's instances move into the lower layer's document
    pub merges: Vec<(u32, u32)>,
    reduced: bool,
}

impl LayerGraph {
    pub fn new() -> Self {
        LayerGraph::default()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn add_layer(&mut self, order: u32, size: u64, place: Option<PlaceId>) -> Result<NodeIndex> {
        if self.by_order.contains_key(&order) {
            return Err(WeaverError::layout(format!(
                "duplicate layer order {}",
                order
            )));
        }
        if size == 0 {
            return Err(WeaverError::layout(format!("layer {} has size 0", order)));
        }
        let node = self.graph.add_node(Layer::new(order, size, place));
        self.by_order.insert(order, node);
        Ok(node)
    }

    /// Connect `from` to `to` in record-flow direction (toward the root)
    pub fn connect(
        &mut self,
        from: u32,
        to: u32,
        comm: Communication,
        distribution: Distribution,
    ) -> Result<()> {
        let from_node = self.node(from)?;
        let to_node = self.node(to)?;
        if from == to {
            return Err(WeaverError::layout(format!(
                "layer {} connects to itself",
                from
            )));
        }
        if self.graph.find_edge(from_node, to_node).is_some() {
            return Err(WeaverError::layout(format!(
                "duplicate connection {} -> {}",
                from, to
            )));
        }
        self.graph
            .add_edge(from_node, to_node, Adjacency { comm, distribution });
        Ok(())
    }

    pub fn set_intra_comm(&mut self, order: u32, comm: Communication) -> Result<()> {
        let node = self.node(order)?;
        self.graph[node].intra_comm = Some(comm);
        Ok(())
    }

    /// Assign a module to a layer, pulling in its transitive hard
    /// dependencies.
    pub fn assign_module(
        &mut self,
        model: &SpecModel,
        order: u32,
        module: AnalysisModuleId,
    ) -> Result<()> {
        let node = self.node(order)?;
        let mut queue = vec![module];
        while let Some(m) = queue.pop() {
            let layer = &mut self.graph[node];
            if layer.modules.contains(&m) {
                continue;
            }
            layer.modules.push(m);
            queue.extend(model.module(m).hard_dependencies());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn node(&self, order: u32) -> Result<NodeIndex> {
        self.by_order
            .get(&order)
            .copied()
            .ok_or_else(|| WeaverError::layout(format!("no layer with order {}", order)))
    }

    pub fn layer(&self, node: NodeIndex) -> &Layer {
        &self.graph[node]
    }

    pub fn layer_mut(&mut self, node: NodeIndex) -> &mut Layer {
        &mut self.graph[node]
    }

    /// The unique application layer (order 0)
    pub fn application(&self) -> Result<NodeIndex> {
        self.node(0).map_err(|_| {
            WeaverError::layout("layout declares no application layer (order 0)")
        })
    }

    /// All layers, ascending by order
    pub fn layers(&self) -> Vec<NodeIndex> {
        let mut orders: Vec<u32> = self.by_order.keys().copied().collect();
        orders.sort_unstable();
        orders.into_iter().map(|o| self.by_order[&o]).collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The layer this one forwards to, if any (unique after reduction)
    pub fn parent_of(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .next()
    }

    /// Layers forwarding into this one, ascending by order
    pub fn children_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        children.sort_by_key(|&n| self.graph[n].order);
        children
    }

    /// The adjacency on the (unique) out-edge of a layer
    pub fn out_adjacency(&self, node: NodeIndex) -> Option<&Adjacency> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .next()
            .map(|e| e.weight())
    }

    /// The overlay root: the unique layer without an out-edge
    pub fn root(&self) -> Result<NodeIndex> {
        let mut roots = self
            .graph
            .node_indices()
            .filter(|&n| self.graph.edges_directed(n, Direction::Outgoing).count() == 0);
        match (roots.next(), roots.next()) {
            (Some(root), None) => Ok(root),
            _ => Err(WeaverError::layout(
                "layout has no unique root layer after tree reduction",
            )),
        }
    }

    pub fn is_reduced(&self) -> bool {
        self.reduced
    }

    // ------------------------------------------------------------------
    // Validation and reduction
    // ------------------------------------------------------------------

    /// Fatal if the layout contains a cycle
    pub fn check_acyclic(&self) -> Result<()> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            Err(WeaverError::layout("layer layout contains a cycle"))
        } else {
            Ok(())
        }
    }

    /// Fatal if any layer is not reachable from the application layer
    pub fn check_reachable(&self) -> Result<()> {
        let app = self.application()?;
        let mut dfs = petgraph::visit::Dfs::new(&self.graph, app);
        let mut seen = vec![false; self.graph.node_count()];
        while let Some(n) = dfs.next(&self.graph) {
            seen[n.index()] = true;
        }
        for n in self.graph.node_indices() {
            if !seen[n.index()] {
                return Err(WeaverError::layout(format!(
                    "layer {} is not reachable from the application layer",
                    self.graph[n].order
                )));
            }
        }
        Ok(())
    }

    /// Reduce the DAG to a tree: a layer with several in-edges keeps only
    /// the one from the predecessor with the highest order. Validates that
    /// afterwards every non-root layer has exactly one out-edge.
    pub fn reduce_to_tree(&mut self) -> Result<()> {
        self.check_acyclic()?;
        self.check_reachable()?;

        for node in self.graph.node_indices().collect::<Vec<_>>() {
            // Edge indices shift on removal, so re-query after every drop.
            loop {
                let in_edges: Vec<(petgraph::graph::EdgeIndex, u32)> = self
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .map(|e| (e.id(), self.graph[e.source()].order))
                    .collect();
                if in_edges.len() <= 1 {
                    break;
                }
                let keep_order = in_edges.iter().map(|(_, order)| *order).max().unwrap_or(0);
                let drop = in_edges
                    .iter()
                    .find(|(_, order)| *order != keep_order)
                    .map(|(id, _)| *id)
                    .unwrap_or(in_edges[0].0);
                self.graph.remove_edge(drop);
            }
        }

        // The trim must leave a tree: one root, one out-edge everywhere else.
        let root = self.root()?;
        for node in self.graph.node_indices() {
            if node == root {
                continue;
            }
            let out = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .count();
            if out != 1 {
                return Err(WeaverError::layout(format!(
                    "layer {} has {} out-edges after tree reduction",
                    self.graph[node].order, out
                )));
            }
        }
        self.reduced = true;
        Ok(())
    }

    /// A layer hosting modules that create wrap-across calls must have an
    /// intra-communication.
    pub fn check_wrap_across_usage(&self, model: &SpecModel) -> Result<()> {
        for node in self.graph.node_indices() {
            let layer = &self.graph[node];
            if layer.intra_comm.is_some() {
                continue;
            }
            for &module in &layer.modules {
                for &call in &model.module(module).creates {
                    if model.call(call).flags.wrap_across {
                        return Err(WeaverError::layout(format!(
                            "module '{}' creates wrap-across call '{}' on layer {} \
                             which has no intra-communication",
                            model.module(module).name,
                            model.call(call).name,
                            layer.order
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channel-id inputs
    // ------------------------------------------------------------------

    /// Maximum runtime fan-in over all layers: for each layer, the number of
    /// processes that may send into one of its processes.
    pub fn max_fan_in(&self) -> u64 {
        let mut max = 1;
        for node in self.graph.node_indices() {
            let target_size = self.graph[node].size.max(1);
            let mut fan_in: u64 = 0;
            for edge in self.graph.edges_directed(node, Direction::Incoming) {
                let source_size = self.graph[edge.source()].size;
                fan_in += match edge.weight().distribution {
                    Distribution::Uniform => source_size.div_ceil(target_size),
                    Distribution::ByBlock(block) => block.max(1),
                };
            }
            max = max.max(fan_in);
        }
        max
    }

    /// Longest chain length (in edges) from any leaf to the root
    pub fn depth(&self) -> u32 {
        let mut depth = 0;
        for node in self.graph.node_indices() {
            let mut length = 0;
            let mut current = node;
            while let Some(parent) = self.parent_of(current) {
                length += 1;
                current = parent;
            }
            depth = depth.max(length);
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comm() -> Communication {
        Communication::new(StrategyId(0), ProtocolId(0))
    }

    fn chain(orders: &[(u32, u64)]) -> LayerGraph {
        let mut g = LayerGraph::new();
        for &(order, size) in orders {
            g.add_layer(order, size, None).unwrap();
        }
        for w in orders.windows(2) {
            g.connect(w[0].0, w[1].0, comm(), Distribution::Uniform)
                .unwrap();
        }
        g
    }

    #[test]
    fn cycle_is_fatal() {
        let mut g = chain(&[(0, 4), (1, 2), (2, 1)]);
        g.connect(2, 1, comm(), Distribution::Uniform).unwrap();
        assert!(matches!(g.check_acyclic(), Err(WeaverError::Layout(_))));
    }

    #[test]
    fn shortcut_edges_are_trimmed() {
        let mut g = chain(&[(0, 4), (1, 2), (2, 1)]);
        g.connect(0, 2, comm(), Distribution::Uniform).unwrap();
        g.reduce_to_tree().unwrap();

        let l2 = g.node(2).unwrap();
        let children = g.children_of(l2);
        assert_eq!(children.len(), 1);
        assert_eq!(g.layer(children[0]).order, 1);
        assert_eq!(g.layer(g.root().unwrap()).order, 2);
    }

    #[test]
    fn fan_in_accounts_for_sizes() {
        let g = chain(&[(0, 8), (1, 2), (2, 1)]);
        // layer 1 receives from 8 processes spread over 2: fan-in 4
        assert_eq!(g.max_fan_in(), 4);
        assert_eq!(g.depth(), 2);
    }

    #[test]
    fn unreachable_layer_is_fatal() {
        let mut g = chain(&[(0, 4), (1, 2)]);
        g.add_layer(5, 1, None).unwrap();
        assert!(matches!(g.check_reachable(), Err(WeaverError::Layout(_))));
    }
}
