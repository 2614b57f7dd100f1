// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Post-solve construction of the taint flow graph: the source-to-sink
//! slice of the object flow graph, extended with transfer edges and pruned
//! to flows that reach a sink.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::graph::flow_graph::FlowNode;
use crate::ir::{TypeId, VarId};
use crate::pta::plugin::invoke_var;
use crate::pta::result::PointerAnalysisResult;
use crate::taint::manager::TaintManager;
use crate::taint::{SourcePoint, TaintFlow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TfgEdgeKind {
    /// Backed by an object flow graph edge of the given kind.
    Flow(crate::graph::flow_graph::FlowKind),
    /// Synthesized from a recorded variable transfer.
    Transfer,
}

/// The immutable result graph: sources, sinks, and the tainted flows
/// connecting them.
pub struct TaintFlowGraph {
    graph: DiGraph<FlowNode, TfgEdgeKind>,
    nodes: HashMap<FlowNode, NodeIndex>,
    edge_set: HashSet<(FlowNode, FlowNode, TfgEdgeKind)>,
    sources: BTreeSet<FlowNode>,
    sinks: BTreeSet<FlowNode>,
}

impl TaintFlowGraph {
    fn new(sources: BTreeSet<FlowNode>, sinks: BTreeSet<FlowNode>) -> Self {
        let mut tfg = TaintFlowGraph {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            edge_set: HashSet::new(),
            sources,
            sinks,
        };
        for node in tfg.sources.clone() {
            tfg.get_or_insert_node(node);
        }
        for node in tfg.sinks.clone() {
            tfg.get_or_insert_node(node);
        }
        tfg
    }

    fn get_or_insert_node(&mut self, node: FlowNode) -> NodeIndex {
        if let Some(id) = self.nodes.get(&node) {
            return *id;
        }
        let id = self.graph.add_node(node);
        self.nodes.insert(node, id);
        id
    }

    fn add_edge(&mut self, src: FlowNode, dst: FlowNode, kind: TfgEdgeKind) {
        if self.edge_set.insert((src, dst, kind)) {
            let src_id = self.get_or_insert_node(src);
            let dst_id = self.get_or_insert_node(dst);
            self.graph.add_edge(src_id, dst_id, kind);
        }
    }

    pub fn source_nodes(&self) -> &BTreeSet<FlowNode> {
        &self.sources
    }

    pub fn sink_nodes(&self) -> &BTreeSet<FlowNode> {
        &self.sinks
    }

    pub fn contains_node(&self, node: FlowNode) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = FlowNode> + '_ {
        self.graph.node_weights().copied()
    }

    pub fn out_edges(&self, node: FlowNode) -> Vec<(FlowNode, TfgEdgeKind)> {
        match self.nodes.get(&node) {
            Some(id) => self
                .graph
                .edges(*id)
                .map(|e| (*self.graph.node_weight(e.target()).unwrap(), *e.weight()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = (FlowNode, FlowNode, TfgEdgeKind)> + '_ {
        self.edge_set.iter().copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Can `node` reach some sink inside this graph?
    pub fn reaches_sink(&self, node: FlowNode) -> bool {
        if !self.contains_node(node) {
            return false;
        }
        let mut visited = HashSet::new();
        let mut worklist = VecDeque::from([node]);
        while let Some(n) = worklist.pop_front() {
            if self.sinks.contains(&n) {
                return true;
            }
            if !visited.insert(n) {
                continue;
            }
            for (target, _) in self.out_edges(n) {
                worklist.push_back(target);
            }
        }
        false
    }
}

pub struct TFGBuilder<'a> {
    pta: &'a PointerAnalysisResult,
    var_transfers: &'a HashMap<VarId, Vec<(VarId, TypeId)>>,
    taint_flows: &'a BTreeSet<TaintFlow>,
    manager: &'a TaintManager,
    /// Whether only flows into application code are tracked.
    only_app: bool,
    /// Whether only flows that reach some sink are kept.
    only_reach_sink: bool,
}

impl<'a> TFGBuilder<'a> {
    pub fn new(
        pta: &'a PointerAnalysisResult,
        var_transfers: &'a HashMap<VarId, Vec<(VarId, TypeId)>>,
        taint_flows: &'a BTreeSet<TaintFlow>,
        manager: &'a TaintManager,
        only_app: bool,
        only_reach_sink: bool,
    ) -> Self {
        TFGBuilder {
            pta,
            var_transfers,
            taint_flows,
            manager,
            only_app,
            only_reach_sink,
        }
    }

    pub fn build(&self) -> TaintFlowGraph {
        let complete = self.build_complete();
        if !self.only_reach_sink {
            return complete;
        }
        // nodes that can reach a sink in the complete graph
        let reach_sink = self.nodes_reaching_sinks(&complete);
        let sources: BTreeSet<FlowNode> = complete
            .source_nodes()
            .iter()
            .filter(|n| reach_sink.contains(*n))
            .copied()
            .collect();
        let mut tfg = TaintFlowGraph::new(sources.clone(), complete.sink_nodes().clone());
        let mut visited: HashSet<FlowNode> = HashSet::new();
        let mut worklist: VecDeque<FlowNode> = sources.into_iter().collect();
        while let Some(node) = worklist.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for (target, kind) in complete.out_edges(node) {
                if reach_sink.contains(&target) {
                    tfg.add_edge(node, target, kind);
                    if !visited.contains(&target) {
                        worklist.push_back(target);
                    }
                }
            }
        }
        tfg
    }

    /// Forward closure from the source nodes over object flow and transfer
    /// edges, with the conditional-kind taint check.
    fn build_complete(&self) -> TaintFlowGraph {
        let mut sources = BTreeSet::new();
        for obj in self.manager.taint_objs() {
            let Some(point) = self.manager.source_point(obj) else {
                continue;
            };
            if let Some(var) = self.source_var(point) {
                sources.insert(FlowNode::Var(var));
            }
        }
        let mut sinks = BTreeSet::new();
        for flow in self.taint_flows {
            if let Some(var) =
                invoke_var(self.pta.program(), flow.sink.invoke, flow.sink.index)
            {
                sinks.insert(FlowNode::Var(var));
            }
        }

        let mut tfg = TaintFlowGraph::new(sources.clone(), sinks);
        let mut visited: HashSet<FlowNode> = HashSet::new();
        let mut worklist: VecDeque<FlowNode> = sources.into_iter().collect();
        while let Some(node) = worklist.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for (target, kind) in self.out_edges(node) {
                if !self.only_app || self.is_app(target) {
                    tfg.add_edge(node, target, kind);
                    if !visited.contains(&target) {
                        worklist.push_back(target);
                    }
                }
            }
        }
        tfg
    }

    fn out_edges(&self, node: FlowNode) -> Vec<(FlowNode, TfgEdgeKind)> {
        let mut edges = Vec::new();
        let ofg = self.pta.object_flow_graph();
        if let Some(id) = ofg.node_id(node) {
            for (target, kind) in ofg.out_edges(id) {
                if kind.is_unconditional() {
                    edges.push((target, TfgEdgeKind::Flow(kind)));
                } else {
                    // conditional kinds only pass taint the target was
                    // actually observed to hold
                    let tainted = self
                        .pta
                        .points_to_node(target)
                        .iter()
                        .any(|obj| self.manager.is_taint(*obj));
                    if tainted {
                        edges.push((target, TfgEdgeKind::Flow(kind)));
                    }
                }
            }
        }
        if let FlowNode::Var(var) = node {
            if let Some(targets) = self.var_transfers.get(&var) {
                for (to, _ty) in targets {
                    edges.push((FlowNode::Var(*to), TfgEdgeKind::Transfer));
                }
            }
        }
        edges
    }

    fn source_var(&self, point: SourcePoint) -> Option<VarId> {
        match point {
            SourcePoint::Call { invoke, index } => {
                invoke_var(self.pta.program(), invoke, index)
            }
            SourcePoint::Param { method, index } => self
                .pta
                .program()
                .method(method)
                .params
                .get(index)
                .copied(),
        }
    }

    fn is_app(&self, node: FlowNode) -> bool {
        let program = self.pta.program();
        match node {
            FlowNode::Var(var) => program.method(program.var(var).method).is_application,
            FlowNode::InstanceField(obj, _) | FlowNode::ArrayIndex(obj) => self
                .pta
                .heap()
                .obj(obj)
                .container_method()
                .map_or(false, |m| program.method(m).is_application),
            FlowNode::StaticField(_) => false,
        }
    }

    fn nodes_reaching_sinks(&self, complete: &TaintFlowGraph) -> HashSet<FlowNode> {
        // reverse adjacency over the complete graph
        let mut preds: HashMap<FlowNode, Vec<FlowNode>> = HashMap::new();
        for (src, dst, _) in complete.edges() {
            preds.entry(dst).or_default().push(src);
        }
        let mut reach: HashSet<FlowNode> = complete.sink_nodes().iter().copied().collect();
        let mut worklist: VecDeque<FlowNode> = reach.iter().copied().collect();
        while let Some(node) = worklist.pop_front() {
            if let Some(sources) = preds.get(&node) {
                for src in sources {
                    if reach.insert(*src) {
                        worklist.push_back(*src);
                    }
                }
            }
        }
        reach
    }
}
