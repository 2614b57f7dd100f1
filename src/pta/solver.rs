// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The fixed-point engine: a worklist-driven monotone solve over a pointer
//! flow graph built on the fly, with an on-the-fly call graph and
//! synchronous plugin hooks.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use itertools::Itertools;
use log::{debug, info, warn};

use crate::graph::call_graph::{CallGraph, EdgeKind};
use crate::graph::flow_graph::{FlowKind, FlowNode, ObjectFlowGraph};
use crate::ir::{
    DispatchMode, FieldId, InvokeId, Literal, MethodId, MethodRefId, Program, Stmt, TypeId, VarId,
};
use crate::pta::context::{ContextId, EMPTY_CONTEXT};
use crate::pta::context_selector::{make_selector, ContextSelector};
use crate::pta::cs_manager::{
    CSCallSiteData, CSManager, CSMethodId, CSMethodData, CSCallSiteId, CSObjData, Pointer,
    PointerId,
};
use crate::pta::heap::{HeapModel, ObjId};
use crate::pta::plugin::{CallEdgeInfo, Plugin, PluginResult};
use crate::pta::{AnalysisError, AnalysisResult, DiffPTDataTy, PointsTo};
use crate::util::chunked_queue::QueueCursor;
use crate::util::options::AnalysisOptions;

/// Rejects objects from a variable's points-to set; returns true when the
/// object must be dropped.
pub type ObjGuard = fn(&HeapModel, ObjId) -> bool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PfgEdge {
    dst: PointerId,
    kind: FlowKind,
    /// Cast edges drop objects not assignable to the filter type.
    filter: Option<TypeId>,
}

/// Deferred hook invocations. Hooks never run re-entrantly: anything a
/// running hook causes is queued and fired from the main loop.
enum Event {
    NewMethod(CSMethodId),
    NewStmt { cs_method: CSMethodId, stmt: Stmt },
    NewCallEdge(CallEdgeInfo),
    NewPts { cs_var: PointerId, delta: PointsTo },
}

pub struct Solver {
    program: Program,
    options: AnalysisOptions,
    csm: CSManager,
    heap: HeapModel,
    selector: Box<dyn ContextSelector>,
    pt_data: DiffPTDataTy,
    call_graph: CallGraph,
    ofg: ObjectFlowGraph,

    /// Pointer flow graph, out-edges per pointer.
    out_edges: HashMap<PointerId, Vec<PfgEdge>>,

    /// Field/array accesses waiting on their base variable's objects.
    instance_loads: HashMap<PointerId, Vec<(FieldId, PointerId)>>,
    instance_stores: HashMap<PointerId, Vec<(FieldId, PointerId)>>,
    array_loads: HashMap<PointerId, Vec<PointerId>>,
    array_stores: HashMap<PointerId, Vec<PointerId>>,
    /// Virtual call sites waiting on their receiver variable's objects.
    virtual_calls: HashMap<PointerId, Vec<CSCallSiteId>>,

    dispatch_cache: HashMap<(ObjId, MethodRefId), Option<MethodId>>,

    processed_methods: HashSet<CSMethodId>,
    reach_cursor: QueueCursor,

    worklist: VecDeque<PointerId>,
    events: VecDeque<Event>,

    plugins: Vec<Box<dyn Plugin>>,
    obj_guards: HashMap<VarId, Vec<ObjGuard>>,
    injected_stmts: HashMap<CSMethodId, Vec<Stmt>>,

    unsound_invokes: BTreeSet<InvokeId>,
    stop: Arc<AtomicBool>,
}

impl Solver {
    pub fn new(program: Program, options: AnalysisOptions) -> Self {
        let selector = make_selector(&options);
        let call_graph = CallGraph::new();
        let reach_cursor = call_graph.reach_methods_cursor();
        Solver {
            program,
            options,
            csm: CSManager::new(),
            heap: HeapModel::new(),
            selector,
            pt_data: DiffPTDataTy::new(),
            call_graph,
            ofg: ObjectFlowGraph::new(),
            out_edges: HashMap::new(),
            instance_loads: HashMap::new(),
            instance_stores: HashMap::new(),
            array_loads: HashMap::new(),
            array_stores: HashMap::new(),
            virtual_calls: HashMap::new(),
            dispatch_cache: HashMap::new(),
            processed_methods: HashSet::new(),
            reach_cursor,
            worklist: VecDeque::new(),
            events: VecDeque::new(),
            plugins: Vec::new(),
            obj_guards: HashMap::new(),
            injected_stmts: HashMap::new(),
            unsound_invokes: BTreeSet::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// The flag a driver raises to cancel the solve between work items.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[inline]
    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    #[inline]
    pub fn csm(&self) -> &CSManager {
        &self.csm
    }

    #[inline]
    pub fn csm_mut(&mut self) -> &mut CSManager {
        &mut self.csm
    }

    #[inline]
    pub fn heap(&self) -> &HeapModel {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut HeapModel {
        &mut self.heap
    }

    #[inline]
    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    #[inline]
    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    #[inline]
    pub fn ofg(&self) -> &ObjectFlowGraph {
        &self.ofg
    }

    #[inline]
    pub fn pt_data(&self) -> &DiffPTDataTy {
        &self.pt_data
    }

    #[inline]
    pub fn empty_context(&self) -> ContextId {
        self.selector.empty_context()
    }

    pub fn select_callee_context(
        &mut self,
        caller_ctx: ContextId,
        invoke: InvokeId,
        recv: Option<(ContextId, ObjId)>,
        callee: MethodId,
    ) -> ContextId {
        self.selector
            .select_callee_context(caller_ctx, invoke, recv, callee)
    }

    pub fn unsound_invokes(&self) -> &BTreeSet<InvokeId> {
        &self.unsound_invokes
    }

    pub fn record_unsound_invoke(&mut self, invoke: InvokeId) {
        self.unsound_invokes.insert(invoke);
    }

    /// An empty points-to set in the configured representation.
    pub fn make_points_to_set(&self) -> PointsTo {
        PointsTo::new()
    }

    /// Read access to a pointer's current points-to set; never absent.
    pub fn points_to_of(&self, pointer: PointerId) -> PointsTo {
        self.pt_data.full_pts(pointer)
    }

    /// Adds objects to the points-to set of `var` under `ctx`.
    pub fn add_var_points_to(&mut self, ctx: ContextId, var: VarId, objs: &PointsTo) {
        let ptr = self.csm.get_cs_var(ctx, var);
        self.add_pts_and_queue(ptr, objs);
    }

    /// General form of [`Self::add_var_points_to`] for any pointer variant.
    pub fn add_points_to(&mut self, pointer: PointerId, objs: &PointsTo) {
        self.add_pts_and_queue(pointer, objs);
    }

    /// Installs a guard that filters objects out of every context variant of
    /// `var`, before they ever enter its points-to set.
    pub fn add_obj_guard(&mut self, var: VarId, guard: ObjGuard) {
        self.obj_guards.entry(var).or_default().push(guard);
    }

    /// Makes synthesized statements part of the reachable body of
    /// `cs_method`, processing them like original statements and re-firing
    /// statement hooks for them.
    pub fn add_stmts(&mut self, cs_method: CSMethodId, stmts: Vec<Stmt>) -> AnalysisResult<()> {
        let CSMethodData { ctx, method } = self.csm.cs_method(cs_method);
        let base_site = self.program.method(method).body.len()
            + self.injected_stmts.get(&cs_method).map_or(0, Vec::len);
        for (i, stmt) in stmts.iter().enumerate() {
            self.process_stmt(ctx, method, base_site + i, stmt)?;
            self.events.push_back(Event::NewStmt {
                cs_method,
                stmt: stmt.clone(),
            });
        }
        self.injected_stmts.entry(cs_method).or_default().extend(stmts);
        Ok(())
    }

    /// Adds a call edge with an explicit kind; `Other` edges get no
    /// this/param/return wiring.
    pub fn add_call_edge(
        &mut self,
        call_site: CSCallSiteId,
        callee: CSMethodId,
        kind: EdgeKind,
    ) -> AnalysisResult<()> {
        let CSCallSiteData { ctx, invoke } = self.csm.cs_call_site(call_site);
        let caller_method = self.program.invoke(invoke).method;
        let caller = self.csm.get_cs_method(ctx, caller_method);
        if !self.call_graph.add_edge(call_site, caller, callee, kind) {
            return Ok(());
        }
        if kind != EdgeKind::Other {
            self.wire_call_edge(call_site, callee);
        }
        self.events.push_back(Event::NewCallEdge(CallEdgeInfo {
            call_site,
            callee,
            kind,
        }));
        Ok(())
    }

    /// Runs the worklist to quiescence.
    pub fn solve(&mut self) -> AnalysisResult<()> {
        self.fire_all(|p, s| p.on_start(s))?;
        self.initialize();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Err(AnalysisError::Cancelled);
            }
            self.drain_pending()?;
            match self.worklist.pop_front() {
                Some(p) => self.process_pointer(p)?,
                None => break,
            }
        }
        info!(
            "Fixpoint reached: {} reachable methods, {} pointers, {} objects",
            self.call_graph.num_methods(),
            self.csm.num_pointers(),
            self.heap.len(),
        );
        if !self.unsound_invokes.is_empty() {
            warn!(
                "{} call sites were not soundly resolved",
                self.unsound_invokes.len()
            );
        }
        self.fire_all(|p, s| p.on_finish(s))
    }

    fn initialize(&mut self) {
        for method in self.program.entry_points.clone() {
            let cs_method = self.csm.get_cs_method(EMPTY_CONTEXT, method);
            self.call_graph.add_node(cs_method);
        }
    }

    /// Fires queued events and expands newly reachable methods until both
    /// streams are exhausted.
    fn drain_pending(&mut self) -> AnalysisResult<()> {
        loop {
            self.expand_reachable()?;
            let Some(event) = self.events.pop_front() else {
                return Ok(());
            };
            self.fire_event(event)?;
        }
    }

    fn expand_reachable(&mut self) -> AnalysisResult<()> {
        loop {
            let mut cursor = self.reach_cursor;
            let Some(cs_method) = self.call_graph.next_reach_method(&mut cursor) else {
                return Ok(());
            };
            self.reach_cursor = cursor;
            if self.processed_methods.insert(cs_method) {
                let data = self.csm.cs_method(cs_method);
                debug!(
                    "Processing method {:?} under context {:?}",
                    self.program.signature_of(data.method),
                    data.ctx
                );
                self.events.push_back(Event::NewMethod(cs_method));
                self.process_method_stmts(cs_method)?;
            }
        }
    }

    fn process_method_stmts(&mut self, cs_method: CSMethodId) -> AnalysisResult<()> {
        let CSMethodData { ctx, method } = self.csm.cs_method(cs_method);
        let body = self.program.method(method).body.clone();
        for (site, stmt) in body.iter().enumerate() {
            self.process_stmt(ctx, method, site, stmt)?;
            self.events.push_back(Event::NewStmt {
                cs_method,
                stmt: stmt.clone(),
            });
        }
        Ok(())
    }

    fn process_stmt(
        &mut self,
        ctx: ContextId,
        method: MethodId,
        site: usize,
        stmt: &Stmt,
    ) -> AnalysisResult<()> {
        match stmt {
            Stmt::New { lhs, ty } => {
                let obj = self.heap.get_alloc(method, site, *ty);
                let heap_ctx = self.selector.select_heap_context(ctx, obj);
                let cs_obj = self.csm.get_cs_obj(heap_ctx, obj);
                let ptr = self.csm.get_cs_var(ctx, *lhs);
                let objs: PointsTo = [cs_obj].into_iter().collect();
                self.add_pts_and_queue(ptr, &objs);
            }
            Stmt::AssignLiteral { lhs, literal } => {
                let lhs_ty = self.program.var(*lhs).ty;
                let obj = match literal {
                    Literal::Str(value) => self.heap.get_string_constant(value, lhs_ty),
                    Literal::Class(class) => self.heap.get_class_constant(*class, lhs_ty),
                };
                // constants are context-insensitive
                let cs_obj = self.csm.get_cs_obj(EMPTY_CONTEXT, obj);
                let ptr = self.csm.get_cs_var(ctx, *lhs);
                let objs: PointsTo = [cs_obj].into_iter().collect();
                self.add_pts_and_queue(ptr, &objs);
            }
            Stmt::Copy { lhs, rhs } => {
                let src = self.csm.get_cs_var(ctx, *rhs);
                let dst = self.csm.get_cs_var(ctx, *lhs);
                self.add_pfg_edge(src, dst, FlowKind::LocalAssign, None);
            }
            Stmt::Cast { lhs, value, ty } => {
                let src = self.csm.get_cs_var(ctx, *value);
                let dst = self.csm.get_cs_var(ctx, *lhs);
                self.add_pfg_edge(src, dst, FlowKind::Cast, Some(*ty));
            }
            Stmt::LoadField { lhs, base: None, field } => {
                let src = self.csm.get_static_field(*field);
                let dst = self.csm.get_cs_var(ctx, *lhs);
                self.add_pfg_edge(src, dst, FlowKind::StaticLoad, None);
            }
            Stmt::StoreField { base: None, field, rhs } => {
                let src = self.csm.get_cs_var(ctx, *rhs);
                let dst = self.csm.get_static_field(*field);
                self.add_pfg_edge(src, dst, FlowKind::StaticStore, None);
            }
            Stmt::LoadField {
                lhs,
                base: Some(base),
                field,
            } => {
                let base_ptr = self.csm.get_cs_var(ctx, *base);
                let lhs_ptr = self.csm.get_cs_var(ctx, *lhs);
                let entry = self.instance_loads.entry(base_ptr).or_default();
                if !entry.contains(&(*field, lhs_ptr)) {
                    entry.push((*field, lhs_ptr));
                }
                let pts = self.pt_data.full_pts(base_ptr);
                self.process_instance_loads(&pts, *field, lhs_ptr);
            }
            Stmt::StoreField {
                base: Some(base),
                field,
                rhs,
            } => {
                let base_ptr = self.csm.get_cs_var(ctx, *base);
                let rhs_ptr = self.csm.get_cs_var(ctx, *rhs);
                let entry = self.instance_stores.entry(base_ptr).or_default();
                if !entry.contains(&(*field, rhs_ptr)) {
                    entry.push((*field, rhs_ptr));
                }
                let pts = self.pt_data.full_pts(base_ptr);
                self.process_instance_stores(&pts, *field, rhs_ptr);
            }
            Stmt::LoadArray { lhs, array } => {
                let base_ptr = self.csm.get_cs_var(ctx, *array);
                let lhs_ptr = self.csm.get_cs_var(ctx, *lhs);
                let entry = self.array_loads.entry(base_ptr).or_default();
                if !entry.contains(&lhs_ptr) {
                    entry.push(lhs_ptr);
                }
                let pts = self.pt_data.full_pts(base_ptr);
                self.process_array_loads(&pts, lhs_ptr);
            }
            Stmt::StoreArray { array, rhs } => {
                let base_ptr = self.csm.get_cs_var(ctx, *array);
                let rhs_ptr = self.csm.get_cs_var(ctx, *rhs);
                let entry = self.array_stores.entry(base_ptr).or_default();
                if !entry.contains(&rhs_ptr) {
                    entry.push(rhs_ptr);
                }
                let pts = self.pt_data.full_pts(base_ptr);
                self.process_array_stores(&pts, rhs_ptr);
            }
            Stmt::Invoke(invoke) => {
                self.process_invoke(ctx, *invoke)?;
            }
            Stmt::Return { .. } => {
                // wired when call edges to the containing method are added
            }
        }
        Ok(())
    }

    fn process_invoke(&mut self, ctx: ContextId, invoke: InvokeId) -> AnalysisResult<()> {
        let inv = self.program.invoke(invoke).clone();
        let call_site = self.csm.get_cs_call_site(ctx, invoke);
        match inv.mode {
            DispatchMode::Static | DispatchMode::Special => {
                if inv.mode == DispatchMode::Special && inv.base.is_none() {
                    return Err(AnalysisError::MalformedIr(format!(
                        "special invoke {invoke:?} without a receiver"
                    )));
                }
                let Some(callee) = self.program.resolve_ref(inv.callee) else {
                    warn!(
                        "Could not resolve callee of {:?} in {}",
                        invoke,
                        self.program.signature_of(inv.method)
                    );
                    return Ok(());
                };
                let callee_ctx = self
                    .selector
                    .select_callee_context(ctx, invoke, None, callee);
                let cs_callee = self.csm.get_cs_method(callee_ctx, callee);
                self.add_call_edge(call_site, cs_callee, EdgeKind::Call)?;
            }
            DispatchMode::Virtual => {
                let Some(base) = inv.base else {
                    return Err(AnalysisError::MalformedIr(format!(
                        "virtual invoke {invoke:?} without a receiver"
                    )));
                };
                let base_ptr = self.csm.get_cs_var(ctx, base);
                let entry = self.virtual_calls.entry(base_ptr).or_default();
                if !entry.contains(&call_site) {
                    entry.push(call_site);
                }
                let pts = self.pt_data.full_pts(base_ptr);
                self.process_virtual_call_objs(call_site, &pts)?;
            }
        }
        Ok(())
    }

    /// Resolves a virtual call site against newly discovered receiver
    /// objects and adds the induced call edges.
    fn process_virtual_call_objs(
        &mut self,
        call_site: CSCallSiteId,
        recv_objs: &PointsTo,
    ) -> AnalysisResult<()> {
        let CSCallSiteData { ctx: caller_ctx, invoke } = self.csm.cs_call_site(call_site);
        let inv = self.program.invoke(invoke).clone();
        for cs_obj in recv_objs {
            let CSObjData { ctx: heap_ctx, obj } = self.csm.cs_obj(cs_obj);
            let callee = match self.dispatch_cache.get(&(obj, inv.callee)) {
                Some(cached) => *cached,
                None => {
                    let recv_ty = self.heap.obj_ty(obj);
                    let resolved = self.program.dispatch(recv_ty, inv.callee);
                    self.dispatch_cache.insert((obj, inv.callee), resolved);
                    resolved
                }
            };
            let Some(callee) = callee else {
                debug!(
                    "No dispatch target for {:?} on object {:?}",
                    inv.callee, obj
                );
                continue;
            };
            let callee_ctx = self.selector.select_callee_context(
                caller_ctx,
                invoke,
                Some((heap_ctx, obj)),
                callee,
            );
            let cs_callee = self.csm.get_cs_method(callee_ctx, callee);
            self.add_call_edge(call_site, cs_callee, EdgeKind::Call)?;
            // receiver passing: only the dispatching object flows into this
            if let Some(this) = self.program.method(callee).this {
                let this_ptr = self.csm.get_cs_var(callee_ctx, this);
                let objs: PointsTo = [cs_obj].into_iter().collect();
                self.add_pts_and_queue(this_ptr, &objs);
                if let Some(base) = inv.base {
                    self.ofg
                        .add_edge(FlowNode::Var(base), FlowNode::Var(this), FlowKind::ThisPassing);
                }
            }
        }
        Ok(())
    }

    /// Parameter, return and receiver wiring for a resolved call edge.
    fn wire_call_edge(&mut self, call_site: CSCallSiteId, cs_callee: CSMethodId) {
        let CSCallSiteData { ctx: caller_ctx, invoke } = self.csm.cs_call_site(call_site);
        let inv = self.program.invoke(invoke).clone();
        let CSMethodData {
            ctx: callee_ctx,
            method: callee,
        } = self.csm.cs_method(cs_callee);
        let callee_data = self.program.method(callee);
        let params = callee_data.params.clone();
        let this = callee_data.this;
        let ret_vars: Vec<VarId> = callee_data
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Return { value } => *value,
                _ => None,
            })
            .collect();

        if inv.mode != DispatchMode::Virtual {
            if let (Some(base), Some(this)) = (inv.base, this) {
                let src = self.csm.get_cs_var(caller_ctx, base);
                let dst = self.csm.get_cs_var(callee_ctx, this);
                self.add_pfg_edge(src, dst, FlowKind::ThisPassing, None);
            }
        }
        for (i, arg) in inv.args.iter().enumerate() {
            if let Some(param) = params.get(i) {
                let src = self.csm.get_cs_var(caller_ctx, *arg);
                let dst = self.csm.get_cs_var(callee_ctx, *param);
                self.add_pfg_edge(src, dst, FlowKind::ParameterPassing, None);
            }
        }
        if let Some(result) = inv.result {
            for ret in ret_vars {
                let src = self.csm.get_cs_var(callee_ctx, ret);
                let dst = self.csm.get_cs_var(caller_ctx, result);
                self.add_pfg_edge(src, dst, FlowKind::Return, None);
            }
        }
    }

    /// One dequeue step: propagate the pointer's unpropagated delta along
    /// its out-edges, resolve pending accesses and calls keyed on it, and
    /// queue the delta hook.
    fn process_pointer(&mut self, pointer: PointerId) -> AnalysisResult<()> {
        let delta = match self.pt_data.get_diff_pts(pointer) {
            Some(diff) if !diff.is_empty() => diff.clone(),
            _ => return Ok(()),
        };
        // flush before propagating: objects added back to this pointer
        // while it is being processed must land in a fresh delta
        self.pt_data.flush(pointer);

        let edges = self
            .out_edges
            .get(&pointer)
            .into_iter()
            .flatten()
            .copied()
            .collect_vec();
        for edge in edges {
            let objs = self.filter_objs(&delta, edge.filter);
            self.add_pts_and_queue(edge.dst, &objs);
        }

        if let Pointer::Var { .. } = self.csm.pointer(pointer) {
            if let Some(loads) = self.instance_loads.get(&pointer) {
                for (field, lhs) in loads.clone() {
                    self.process_instance_loads(&delta, field, lhs);
                }
            }
            if let Some(stores) = self.instance_stores.get(&pointer) {
                for (field, rhs) in stores.clone() {
                    self.process_instance_stores(&delta, field, rhs);
                }
            }
            if let Some(loads) = self.array_loads.get(&pointer) {
                for lhs in loads.clone() {
                    self.process_array_loads(&delta, lhs);
                }
            }
            if let Some(stores) = self.array_stores.get(&pointer) {
                for rhs in stores.clone() {
                    self.process_array_stores(&delta, rhs);
                }
            }
            if let Some(calls) = self.virtual_calls.get(&pointer) {
                for call_site in calls.clone() {
                    self.process_virtual_call_objs(call_site, &delta)?;
                }
            }
            self.events.push_back(Event::NewPts {
                cs_var: pointer,
                delta: delta.clone(),
            });
        }
        Ok(())
    }

    fn process_instance_loads(&mut self, base_objs: &PointsTo, field: FieldId, lhs: PointerId) {
        for cs_obj in base_objs {
            let src = self.csm.get_instance_field(cs_obj, field);
            self.add_pfg_edge(src, lhs, FlowKind::InstanceLoad, None);
        }
    }

    fn process_instance_stores(&mut self, base_objs: &PointsTo, field: FieldId, rhs: PointerId) {
        for cs_obj in base_objs {
            let dst = self.csm.get_instance_field(cs_obj, field);
            self.add_pfg_edge(rhs, dst, FlowKind::InstanceStore, None);
        }
    }

    fn process_array_loads(&mut self, base_objs: &PointsTo, lhs: PointerId) {
        for cs_obj in base_objs {
            let src = self.csm.get_array_index(cs_obj);
            self.add_pfg_edge(src, lhs, FlowKind::ArrayLoad, None);
        }
    }

    fn process_array_stores(&mut self, base_objs: &PointsTo, rhs: PointerId) {
        for cs_obj in base_objs {
            let dst = self.csm.get_array_index(cs_obj);
            self.add_pfg_edge(rhs, dst, FlowKind::ArrayStore, None);
        }
    }

    /// Adds a pointer flow edge, records its context-collapsed projection in
    /// the object flow graph, and propagates the source's current set.
    fn add_pfg_edge(
        &mut self,
        src: PointerId,
        dst: PointerId,
        kind: FlowKind,
        filter: Option<TypeId>,
    ) {
        if src == dst {
            return;
        }
        let edge = PfgEdge { dst, kind, filter };
        let edges = self.out_edges.entry(src).or_default();
        if edges.contains(&edge) {
            return;
        }
        edges.push(edge);
        let src_node = self.flow_node_of(src);
        let dst_node = self.flow_node_of(dst);
        self.ofg.add_edge(src_node, dst_node, kind);

        let pts = self.pt_data.full_pts(src);
        if !pts.is_empty() {
            let objs = self.filter_objs(&pts, filter);
            self.add_pts_and_queue(dst, &objs);
        }
    }

    fn flow_node_of(&self, pointer: PointerId) -> FlowNode {
        match self.csm.pointer(pointer) {
            Pointer::Var { var, .. } => FlowNode::Var(var),
            Pointer::InstanceField { base, field } => {
                FlowNode::InstanceField(self.csm.obj_of(base), field)
            }
            Pointer::ArrayIndex { array } => FlowNode::ArrayIndex(self.csm.obj_of(array)),
            Pointer::StaticField { field } => FlowNode::StaticField(field),
        }
    }

    /// Drops objects incompatible with a cast target.
    fn filter_objs(&self, objs: &PointsTo, filter: Option<TypeId>) -> PointsTo {
        match filter {
            None => objs.clone(),
            Some(target) => objs
                .iter()
                .filter(|cs_obj| {
                    let ty = self.heap.obj_ty(self.csm.obj_of(*cs_obj));
                    let compatible = self.program.is_subtype(ty, target);
                    if !compatible {
                        debug!("Cast filters object {:?} (not a {:?})", cs_obj, target);
                    }
                    compatible
                })
                .collect(),
        }
    }

    /// The single entry point for points-to growth: applies pointer guards,
    /// merges into the diff set, and schedules the pointer.
    fn add_pts_and_queue(&mut self, pointer: PointerId, objs: &PointsTo) -> bool {
        if objs.is_empty() {
            return false;
        }
        let guarded;
        let objs = match self.csm.pointer(pointer) {
            Pointer::Var { var, .. } if self.obj_guards.contains_key(&var) => {
                let guards = &self.obj_guards[&var];
                guarded = objs
                    .iter()
                    .filter(|cs_obj| {
                        let obj = self.csm.obj_of(*cs_obj);
                        !guards.iter().any(|guard| guard(&self.heap, obj))
                    })
                    .collect::<PointsTo>();
                &guarded
            }
            _ => objs,
        };
        if objs.is_empty() {
            return false;
        }
        let changed = self.pt_data.union_pts_to(pointer, objs);
        if changed {
            self.worklist.push_back(pointer);
        }
        changed
    }

    fn fire_event(&mut self, event: Event) -> AnalysisResult<()> {
        match event {
            Event::NewMethod(cs_method) => {
                self.fire_all(|p, s| p.on_new_method(s, cs_method))
            }
            Event::NewStmt { cs_method, stmt } => {
                self.fire_all(|p, s| p.on_new_stmt(s, cs_method, &stmt))
            }
            Event::NewCallEdge(edge) => self.fire_all(|p, s| p.on_new_call_edge(s, &edge)),
            Event::NewPts { cs_var, delta } => {
                self.fire_all(|p, s| p.on_new_pts(s, cs_var, &delta))
            }
        }
    }

    fn fire_all(
        &mut self,
        f: impl Fn(&mut Box<dyn Plugin>, &mut Solver) -> PluginResult,
    ) -> AnalysisResult<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let mut result = Ok(());
        for plugin in plugins.iter_mut() {
            result = f(plugin, self);
            if result.is_err() {
                break;
            }
        }
        self.plugins = plugins;
        result.map_err(AnalysisError::from)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Program,
        CSManager,
        HeapModel,
        DiffPTDataTy,
        CallGraph,
        ObjectFlowGraph,
        BTreeSet<InvokeId>,
    ) {
        (
            self.program,
            self.csm,
            self.heap,
            self.pt_data,
            self.call_graph,
            self.ofg,
            self.unsound_invokes,
        )
    }
}
