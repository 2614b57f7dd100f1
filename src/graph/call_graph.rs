// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use petgraph::graph::{DefaultIx, EdgeIndex, Graph, NodeIndex};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::pta::cs_manager::{CSCallSiteId, CSMethodId};
use crate::util::chunked_queue::{ChunkedQueue, QueueCursor};

/// Unique identifiers for call graph nodes.
pub type CGNodeId = NodeIndex<DefaultIx>;
/// Unique identifiers for call graph edges.
pub type CGEdgeId = EdgeIndex<DefaultIx>;

/// The kind triple shared between call graph edges and the
/// interprocedural control flow edges handed to downstream consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Intra-procedural edge.
    Local,
    /// Resolved call edge.
    Call,
    /// Return edge.
    Return,
    /// Edges the solver cannot attribute to ordinary dispatch, e.g.
    /// reflection-induced calls.
    Other,
}

#[derive(Clone, Copy, Debug)]
pub struct CallGraphEdge {
    pub call_site: CSCallSiteId,
    pub kind: EdgeKind,
}

/// The context-sensitive call graph, built incrementally as the solver
/// resolves dispatch. Nodes double as the reachable-method stream.
pub struct CallGraph {
    pub graph: Graph<CSMethodId, CallGraphEdge>,
    method_nodes: HashMap<CSMethodId, CGNodeId>,
    callsite_to_edges: HashMap<CSCallSiteId, HashSet<CGEdgeId>>,
    reach_methods: ChunkedQueue<CSMethodId>,
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::new(),
            method_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
            reach_methods: ChunkedQueue::new(),
        }
    }

    /// Adds a new node to the call graph, marking the method reachable.
    pub fn add_node(&mut self, method: CSMethodId) -> CGNodeId {
        match self.method_nodes.entry(method) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let node_id = self.graph.add_node(method);
                v.insert(node_id);
                self.reach_methods.push(method);
                node_id
            }
        }
    }

    pub fn contains(&self, method: CSMethodId) -> bool {
        self.method_nodes.contains_key(&method)
    }

    /// All callees already resolved for a call site.
    pub fn get_callees(&self, call_site: CSCallSiteId) -> HashSet<CSMethodId> {
        match self.callsite_to_edges.get(&call_site) {
            Some(edges) => edges
                .iter()
                .filter_map(|edge_id| {
                    let (_, target) = self.graph.edge_endpoints(*edge_id)?;
                    Some(*self.graph.node_weight(target).unwrap())
                })
                .collect(),
            None => HashSet::new(),
        }
    }

    pub fn has_edge(&self, call_site: CSCallSiteId, callee: CSMethodId) -> bool {
        self.get_callees(call_site).contains(&callee)
    }

    /// Adds a call edge; returns false if it already existed.
    pub fn add_edge(
        &mut self,
        call_site: CSCallSiteId,
        caller: CSMethodId,
        callee: CSMethodId,
        kind: EdgeKind,
    ) -> bool {
        if self.has_edge(call_site, callee) {
            return false;
        }
        let caller_node = self.add_node(caller);
        let callee_node = self.add_node(callee);
        let edge_id = self
            .graph
            .add_edge(caller_node, callee_node, CallGraphEdge { call_site, kind });
        self.callsite_to_edges
            .entry(call_site)
            .or_default()
            .insert(edge_id);
        true
    }

    /// A cursor over the reachable-method stream; new methods discovered
    /// after the cursor position are still seen.
    pub fn reach_methods_cursor(&self) -> QueueCursor {
        self.reach_methods.cursor()
    }

    pub fn next_reach_method(&self, cursor: &mut QueueCursor) -> Option<CSMethodId> {
        cursor.next(&self.reach_methods)
    }

    pub fn reach_methods(&self) -> impl Iterator<Item = CSMethodId> + '_ {
        self.reach_methods.iter().copied()
    }

    pub fn num_methods(&self) -> usize {
        self.method_nodes.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (CSMethodId, CSMethodId, CallGraphEdge)> + '_ {
        self.graph.edge_indices().map(move |e| {
            let (s, t) = self.graph.edge_endpoints(e).unwrap();
            (
                *self.graph.node_weight(s).unwrap(),
                *self.graph.node_weight(t).unwrap(),
                *self.graph.edge_weight(e).unwrap(),
            )
        })
    }
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{CallGraph, EdgeKind};
    use crate::pta::cs_manager::{CSCallSiteId, CSMethodId};

    #[test]
    fn edges_deduplicate_per_callsite() {
        let mut cg = CallGraph::new();
        let (caller, callee) = (CSMethodId(0), CSMethodId(1));
        let cs = CSCallSiteId(0);
        assert!(cg.add_edge(cs, caller, callee, EdgeKind::Call));
        assert!(!cg.add_edge(cs, caller, callee, EdgeKind::Call));
        assert!(cg.has_edge(cs, callee));
        assert_eq!(cg.num_methods(), 2);

        let mut cursor = cg.reach_methods_cursor();
        assert_eq!(cg.next_reach_method(&mut cursor), Some(caller));
        assert_eq!(cg.next_reach_method(&mut cursor), Some(callee));
        assert_eq!(cg.next_reach_method(&mut cursor), None);
    }
}
