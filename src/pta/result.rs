// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The result surface handed to downstream consumers once the solve
//! finishes: context-collapsed points-to sets, the object flow graph, and
//! call graph accessors.

use std::collections::{BTreeSet, HashMap};

use crate::graph::call_graph::CallGraph;
use crate::graph::flow_graph::{FlowNode, ObjectFlowGraph};
use crate::ir::{FieldId, InvokeId, MethodId, Program, VarId};
use crate::pta::cs_manager::{CSManager, Pointer};
use crate::pta::heap::{HeapModel, ObjId};
use crate::pta::solver::Solver;

pub struct PointerAnalysisResult {
    program: Program,
    csm: CSManager,
    heap: HeapModel,
    call_graph: CallGraph,
    ofg: ObjectFlowGraph,
    node_pts: HashMap<FlowNode, BTreeSet<ObjId>>,
    reachable_methods: BTreeSet<MethodId>,
    unsound_invokes: BTreeSet<InvokeId>,
    empty: BTreeSet<ObjId>,
}

impl PointerAnalysisResult {
    /// Collapses the solver's context-sensitive points-to data into the
    /// per-location view downstream consumers read.
    pub fn new(solver: Solver) -> Self {
        let (program, csm, heap, pt_data, call_graph, ofg, unsound_invokes) = solver.into_parts();
        let mut node_pts: HashMap<FlowNode, BTreeSet<ObjId>> = HashMap::new();
        for pointer in csm.pointer_ids() {
            let node = match csm.pointer(pointer) {
                Pointer::Var { var, .. } => FlowNode::Var(var),
                Pointer::InstanceField { base, field } => {
                    FlowNode::InstanceField(csm.obj_of(base), field)
                }
                Pointer::ArrayIndex { array } => FlowNode::ArrayIndex(csm.obj_of(array)),
                Pointer::StaticField { field } => FlowNode::StaticField(field),
            };
            let pts = pt_data.full_pts(pointer);
            if !pts.is_empty() {
                let entry = node_pts.entry(node).or_default();
                for cs_obj in &pts {
                    entry.insert(csm.obj_of(cs_obj));
                }
            }
        }
        let reachable_methods = call_graph
            .reach_methods()
            .map(|cs| csm.cs_method(cs).method)
            .collect();
        PointerAnalysisResult {
            program,
            csm,
            heap,
            call_graph,
            ofg,
            node_pts,
            reachable_methods,
            unsound_invokes,
            empty: BTreeSet::new(),
        }
    }

    /// The objects a variable may point to, over all contexts.
    pub fn points_to(&self, var: VarId) -> &BTreeSet<ObjId> {
        self.points_to_node(FlowNode::Var(var))
    }

    /// The objects an instance field slot may hold.
    pub fn points_to_field(&self, base: ObjId, field: FieldId) -> &BTreeSet<ObjId> {
        self.points_to_node(FlowNode::InstanceField(base, field))
    }

    /// The objects an array's collapsed element slot may hold.
    pub fn points_to_array(&self, array: ObjId) -> &BTreeSet<ObjId> {
        self.points_to_node(FlowNode::ArrayIndex(array))
    }

    pub fn points_to_static(&self, field: FieldId) -> &BTreeSet<ObjId> {
        self.points_to_node(FlowNode::StaticField(field))
    }

    pub fn points_to_node(&self, node: FlowNode) -> &BTreeSet<ObjId> {
        self.node_pts.get(&node).unwrap_or(&self.empty)
    }

    pub fn object_flow_graph(&self) -> &ObjectFlowGraph {
        &self.ofg
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn heap(&self) -> &HeapModel {
        &self.heap
    }

    pub fn cs_manager(&self) -> &CSManager {
        &self.csm
    }

    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.reachable_methods.contains(&method)
    }

    pub fn reachable_methods(&self) -> &BTreeSet<MethodId> {
        &self.reachable_methods
    }

    /// Call sites whose resolution was unsound (e.g. opaque reflection).
    pub fn unsound_invokes(&self) -> &BTreeSet<InvokeId> {
        &self.unsound_invokes
    }
}
