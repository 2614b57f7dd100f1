// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A hook-based reflection model.
//!
//! `forName`-style calls on non-constant strings and instantiations of
//! unknown class objects produce opaque mock objects instead of failing;
//! the offending call sites are recorded and reported as unsound. Known
//! class constants resolve precisely and their constructors are linked
//! through `Other`-kind call edges.

use crate::graph::call_graph::EdgeKind;
use crate::ir::{InvokeId, Program};
use crate::pta::context::{ContextId, EMPTY_CONTEXT};
use crate::pta::cs_manager::{Pointer, PointerId};
use crate::pta::heap::{
    MockPayload, ObjKind, REFLECTIVE_ALLOC_DESC, UNKNOWN_CLASS_DESC, UNKNOWN_REFLECTIVE_DESC,
};
use crate::pta::plugin::{
    invoke_var, CallEdgeInfo, InvokeHandlerTable, Plugin, PluginError, PluginResult, BASE,
};
use crate::pta::solver::Solver;
use crate::pta::PointsTo;

/// Signatures of the reflective entry points this model intercepts.
#[derive(Clone, Debug)]
pub struct ReflectionSignatures {
    pub for_name: String,
    pub new_instance: String,
}

impl Default for ReflectionSignatures {
    fn default() -> Self {
        ReflectionSignatures {
            for_name: "<java.lang.Class: java.lang.Class forName(java.lang.String)>".to_string(),
            new_instance: "<java.lang.Class: java.lang.Object newInstance()>".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum RefHook {
    ForName,
    NewInstance,
}

impl RefHook {
    fn index(self) -> i32 {
        match self {
            RefHook::ForName => 0,
            RefHook::NewInstance => BASE,
        }
    }
}

pub struct ReflectionModel {
    table: InvokeHandlerTable<RefHook>,
}

impl ReflectionModel {
    pub fn new(program: &Program, signatures: &ReflectionSignatures) -> Self {
        let mut table = InvokeHandlerTable::new();
        if let Some(m) = program.method_by_signature(&signatures.for_name) {
            table.register(m, &[0], RefHook::ForName);
        }
        if let Some(m) = program.method_by_signature(&signatures.new_instance) {
            table.register(m, &[BASE], RefHook::NewInstance);
        }
        ReflectionModel { table }
    }

    fn handle(
        &mut self,
        solver: &mut Solver,
        hook: RefHook,
        invoke: InvokeId,
        ctx: ContextId,
        objs: &PointsTo,
    ) -> PluginResult {
        match hook {
            RefHook::ForName => {
                self.for_name(solver, invoke, ctx, objs);
                Ok(())
            }
            RefHook::NewInstance => self.new_instance(solver, invoke, ctx, objs),
        }
    }

    /// `result = forName(name)`: a constant name resolves to the precise
    /// class object, anything else to an unknown-class mock.
    fn for_name(&mut self, solver: &mut Solver, invoke: InvokeId, ctx: ContextId, objs: &PointsTo) {
        let Some(result) = solver.program().invoke(invoke).result else {
            return;
        };
        let result_ty = solver.program().var(result).ty;
        for cs_obj in objs {
            let obj = solver.csm().obj_of(cs_obj);
            let class = match &solver.heap().obj(obj).kind {
                ObjKind::StringConstant(name) => solver.program().type_by_name(name),
                _ => None,
            };
            let class_obj = match class {
                Some(class) => solver.heap_mut().get_class_constant(class, result_ty),
                None => {
                    solver.record_unsound_invoke(invoke);
                    solver.heap_mut().get_mock(
                        UNKNOWN_CLASS_DESC,
                        MockPayload::Invoke(invoke),
                        result_ty,
                    )
                }
            };
            let cs_class_obj = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, class_obj);
            let class_objs: PointsTo = [cs_class_obj].into_iter().collect();
            solver.add_var_points_to(ctx, result, &class_objs);
        }
    }

    /// `result = clazz.newInstance()`: known classes allocate a reflective
    /// object and link the no-arg constructor with an `Other` edge; unknown
    /// class objects yield a single opaque instance per call site.
    fn new_instance(
        &mut self,
        solver: &mut Solver,
        invoke: InvokeId,
        ctx: ContextId,
        objs: &PointsTo,
    ) -> PluginResult {
        let Some(result) = solver.program().invoke(invoke).result else {
            return Ok(());
        };
        let result_ty = solver.program().var(result).ty;
        for cs_obj in objs {
            let obj = solver.csm().obj_of(cs_obj);
            match solver.heap().obj(obj).kind.clone() {
                ObjKind::ClassConstant(class) => {
                    let alloc = solver.heap_mut().get_mock(
                        REFLECTIVE_ALLOC_DESC,
                        MockPayload::Invoke(invoke),
                        class,
                    );
                    let cs_alloc = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, alloc);
                    let allocated: PointsTo = [cs_alloc].into_iter().collect();
                    solver.add_var_points_to(ctx, result, &allocated);

                    let ctor_ref = solver.program_mut().method_ref(class, "<init>", &[], None);
                    if let Some(ctor) = solver.program().resolve_ref(ctor_ref) {
                        let callee_ctx = solver.select_callee_context(ctx, invoke, None, ctor);
                        let call_site = solver.csm_mut().get_cs_call_site(ctx, invoke);
                        let cs_callee = solver.csm_mut().get_cs_method(callee_ctx, ctor);
                        // reflective edges carry no ordinary wiring
                        solver
                            .add_call_edge(call_site, cs_callee, EdgeKind::Other)
                            .map_err(|e| PluginError(e.to_string()))?;
                        if let Some(this) = solver.program().method(ctor).this {
                            solver.add_var_points_to(callee_ctx, this, &allocated);
                        }
                    }
                }
                ObjKind::Mock { desc, .. } if desc == UNKNOWN_CLASS_DESC => {
                    solver.record_unsound_invoke(invoke);
                    let unknown = solver.heap_mut().get_mock(
                        UNKNOWN_REFLECTIVE_DESC,
                        MockPayload::Invoke(invoke),
                        result_ty,
                    );
                    let cs_unknown = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, unknown);
                    let unknowns: PointsTo = [cs_unknown].into_iter().collect();
                    solver.add_var_points_to(ctx, result, &unknowns);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Plugin for ReflectionModel {
    fn on_new_call_edge(&mut self, solver: &mut Solver, edge: &CallEdgeInfo) -> PluginResult {
        let site = solver.csm().cs_call_site(edge.call_site);
        let callee = solver.csm().cs_method(edge.callee).method;
        let fired = self
            .table
            .handlers_for_call(solver.program(), site.invoke, callee);
        for (hook, invoke) in fired {
            let Some(var) = invoke_var(solver.program(), invoke, hook.index()) else {
                continue;
            };
            let ptr = solver.csm_mut().get_cs_var(site.ctx, var);
            let pts = solver.points_to_of(ptr);
            if !pts.is_empty() {
                self.handle(solver, hook, invoke, site.ctx, &pts)?;
            }
        }
        Ok(())
    }

    fn on_new_pts(
        &mut self,
        solver: &mut Solver,
        cs_var: PointerId,
        delta: &PointsTo,
    ) -> PluginResult {
        let Pointer::Var { ctx, var } = solver.csm().pointer(cs_var) else {
            return Ok(());
        };
        let hooks = self.table.handlers_on_var(var).to_vec();
        for (hook, invoke) in hooks {
            self.handle(solver, hook, invoke, ctx, delta)?;
        }
        Ok(())
    }
}
