// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Emits taint at configured sources and records flows at configured sinks.

use std::collections::{BTreeSet, HashMap};

use crate::ir::{MethodId, VarId};
use crate::pta::context::EMPTY_CONTEXT;
use crate::pta::cs_manager::{CSMethodId, Pointer, PointerId};
use crate::pta::plugin::{invoke_var, CallEdgeInfo};
use crate::pta::solver::Solver;
use crate::pta::PointsTo;
use crate::taint::config::{CallSource, ParamSource, Sink};
use crate::taint::manager::TaintManager;
use crate::taint::{SinkPoint, SourcePoint, TaintFlow};

pub struct SourceSinkHandler {
    call_sources: HashMap<MethodId, Vec<CallSource>>,
    param_sources: HashMap<MethodId, Vec<ParamSource>>,
    sinks: HashMap<MethodId, Vec<Sink>>,
    /// Sink actuals already seen, so later deltas on them are checked too.
    sink_vars: HashMap<VarId, Vec<SinkPoint>>,
}

impl SourceSinkHandler {
    pub fn new(
        call_sources: &[CallSource],
        param_sources: &[ParamSource],
        sinks: &[Sink],
    ) -> Self {
        let mut handler = SourceSinkHandler {
            call_sources: HashMap::new(),
            param_sources: HashMap::new(),
            sinks: HashMap::new(),
            sink_vars: HashMap::new(),
        };
        for source in call_sources {
            handler
                .call_sources
                .entry(source.method)
                .or_default()
                .push(*source);
        }
        for source in param_sources {
            handler
                .param_sources
                .entry(source.method)
                .or_default()
                .push(*source);
        }
        for sink in sinks {
            handler.sinks.entry(sink.method).or_default().push(*sink);
        }
        handler
    }

    /// Call sources taint the indexed call-site variable; sinks register
    /// their indexed actual and check the objects already there.
    pub fn handle_new_call_edge(
        &mut self,
        solver: &mut Solver,
        manager: &mut TaintManager,
        flows: &mut BTreeSet<TaintFlow>,
        edge: &CallEdgeInfo,
    ) {
        let site = solver.csm().cs_call_site(edge.call_site);
        let callee = solver.csm().cs_method(edge.callee).method;

        if let Some(sources) = self.call_sources.get(&callee) {
            for source in sources.clone() {
                let Some(var) = invoke_var(solver.program(), site.invoke, source.index) else {
                    continue;
                };
                let point = SourcePoint::Call {
                    invoke: site.invoke,
                    index: source.index,
                };
                let taint = manager.make_taint(solver.heap_mut(), point, source.ty);
                let cs_taint = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, taint);
                let taints: PointsTo = [cs_taint].into_iter().collect();
                solver.add_var_points_to(site.ctx, var, &taints);
            }
        }

        if let Some(sinks) = self.sinks.get(&callee) {
            for sink in sinks.clone() {
                let Some(var) = invoke_var(solver.program(), site.invoke, sink.index) else {
                    continue;
                };
                let point = SinkPoint {
                    invoke: site.invoke,
                    index: sink.index,
                };
                let entry = self.sink_vars.entry(var).or_default();
                if !entry.contains(&point) {
                    entry.push(point);
                }
                let ptr = solver.csm_mut().get_cs_var(site.ctx, var);
                let pts = solver.points_to_of(ptr);
                record_flows(solver, manager, flows, &pts, &[point]);
            }
        }
    }

    /// Param sources taint the indexed formal when its method first becomes
    /// reachable in some context.
    pub fn handle_new_method(
        &mut self,
        solver: &mut Solver,
        manager: &mut TaintManager,
        cs_method: CSMethodId,
    ) {
        let data = solver.csm().cs_method(cs_method);
        let Some(sources) = self.param_sources.get(&data.method) else {
            return;
        };
        for source in sources.clone() {
            let Some(param) = solver.program().method(data.method).params.get(source.index).copied()
            else {
                continue;
            };
            let point = SourcePoint::Param {
                method: data.method,
                index: source.index,
            };
            let taint = manager.make_taint(solver.heap_mut(), point, source.ty);
            let cs_taint = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, taint);
            let taints: PointsTo = [cs_taint].into_iter().collect();
            solver.add_var_points_to(data.ctx, param, &taints);
        }
    }

    /// New objects on a registered sink actual are checked for taints.
    pub fn handle_new_pts(
        &mut self,
        solver: &mut Solver,
        manager: &TaintManager,
        flows: &mut BTreeSet<TaintFlow>,
        cs_var: PointerId,
        delta: &PointsTo,
    ) {
        let Pointer::Var { var, .. } = solver.csm().pointer(cs_var) else {
            return;
        };
        let Some(points) = self.sink_vars.get(&var) else {
            return;
        };
        let points = points.clone();
        record_flows(solver, manager, flows, delta, &points);
    }
}

fn record_flows(
    solver: &Solver,
    manager: &TaintManager,
    flows: &mut BTreeSet<TaintFlow>,
    objs: &PointsTo,
    points: &[SinkPoint],
) {
    for cs_obj in objs {
        let obj = solver.csm().obj_of(cs_obj);
        let Some(source) = manager.source_point(obj) else {
            continue;
        };
        for sink in points {
            flows.insert(TaintFlow {
                source,
                sink: *sink,
            });
        }
    }
}
