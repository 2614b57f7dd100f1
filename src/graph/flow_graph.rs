// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The object flow graph: the context-collapsed projection of the pointer
//! flow edges the solver creates, used by post-solve consumers.

use petgraph::graph::{DefaultIx, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::ir::{FieldId, VarId};
use crate::pta::heap::ObjId;

pub type FlowNodeId = NodeIndex<DefaultIx>;

/// Abstract locations at the context-insensitive level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowNode {
    Var(VarId),
    InstanceField(ObjId, FieldId),
    ArrayIndex(ObjId),
    StaticField(FieldId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    LocalAssign,
    Cast,
    InstanceLoad,
    InstanceStore,
    ArrayLoad,
    ArrayStore,
    StaticLoad,
    StaticStore,
    ThisPassing,
    ParameterPassing,
    Return,
}

impl FlowKind {
    /// Unconditional kinds always carry whatever flows into their source;
    /// conditional kinds (casts, loads, returns) only pass values the
    /// target was actually observed to hold.
    pub fn is_unconditional(self) -> bool {
        matches!(
            self,
            FlowKind::LocalAssign
                | FlowKind::InstanceStore
                | FlowKind::ArrayStore
                | FlowKind::StaticStore
                | FlowKind::ThisPassing
                | FlowKind::ParameterPassing
        )
    }
}

pub struct ObjectFlowGraph {
    graph: Graph<FlowNode, FlowKind>,
    nodes: HashMap<FlowNode, FlowNodeId>,
    edge_set: HashSet<(FlowNodeId, FlowNodeId, FlowKind)>,
}

impl ObjectFlowGraph {
    pub fn new() -> Self {
        ObjectFlowGraph {
            graph: Graph::new(),
            nodes: HashMap::new(),
            edge_set: HashSet::new(),
        }
    }

    pub fn get_or_insert_node(&mut self, node: FlowNode) -> FlowNodeId {
        match self.nodes.entry(node) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => *v.insert(self.graph.add_node(node)),
        }
    }

    pub fn node_id(&self, node: FlowNode) -> Option<FlowNodeId> {
        self.nodes.get(&node).copied()
    }

    #[inline]
    pub fn node(&self, id: FlowNodeId) -> FlowNode {
        *self.graph.node_weight(id).unwrap()
    }

    /// Adds an edge unless the same (src, dst, kind) triple already exists.
    pub fn add_edge(&mut self, src: FlowNode, dst: FlowNode, kind: FlowKind) {
        let src_id = self.get_or_insert_node(src);
        let dst_id = self.get_or_insert_node(dst);
        if self.edge_set.insert((src_id, dst_id, kind)) {
            self.graph.add_edge(src_id, dst_id, kind);
        }
    }

    pub fn out_edges(&self, id: FlowNodeId) -> impl Iterator<Item = (FlowNode, FlowKind)> + '_ {
        self.graph
            .edges(id)
            .map(move |e| (*self.graph.node_weight(e.target()).unwrap(), *e.weight()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = FlowNode> + '_ {
        self.graph.node_weights().copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for ObjectFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
