// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Applies taint transfer rules on new call edges and new points-to deltas.
//!
//! A transfer into the receiver or an argument mutates an object other
//! pointers may alias. The pointers whose objects come from the written
//! variable are handled by ordinary points-to propagation; for the pointers
//! whose objects flow *into* it, the handler synthesizes field stores
//! (`%taint-temp = base; %taint-temp.field = var`) and injects them into
//! the reachable body, reducing alias updates to ordinary propagation.

use std::collections::HashMap;

use crate::ir::{MethodId, Stmt, TypeId, VarId};
use crate::pta::context::{ContextId, EMPTY_CONTEXT};
use crate::pta::cs_manager::{Pointer, PointerId};
use crate::pta::plugin::{invoke_var, CallEdgeInfo, PluginError, PluginResult, BASE, RESULT};
use crate::pta::solver::Solver;
use crate::pta::PointsTo;
use crate::graph::call_graph::EdgeKind;
use crate::taint::config::TaintTransfer;
use crate::taint::manager::TaintManager;

const TEMP_PREFIX: &str = "%taint-temp-";

pub struct TransferHandler {
    transfers: HashMap<MethodId, Vec<TaintTransfer>>,
    /// Taint objects reaching the key variable transfer to the value
    /// variables under the recorded type.
    var_transfers: HashMap<VarId, Vec<(VarId, TypeId)>>,
    /// Cache of statements generated for back propagation.
    back_prop_stmts: HashMap<VarId, Vec<Stmt>>,
    /// Counter for generating temporary variables.
    counter: usize,
    enable_back_propagate: bool,
}

impl TransferHandler {
    pub fn new(transfers: &[TaintTransfer], enable_back_propagate: bool) -> Self {
        let mut handler = TransferHandler {
            transfers: HashMap::new(),
            var_transfers: HashMap::new(),
            back_prop_stmts: HashMap::new(),
            counter: 0,
            enable_back_propagate,
        };
        for transfer in transfers {
            handler
                .transfers
                .entry(transfer.method)
                .or_default()
                .push(*transfer);
        }
        handler
    }

    pub fn var_transfers(&self) -> &HashMap<VarId, Vec<(VarId, TypeId)>> {
        &self.var_transfers
    }

    pub fn handle_new_call_edge(
        &mut self,
        solver: &mut Solver,
        manager: &mut TaintManager,
        edge: &CallEdgeInfo,
    ) -> PluginResult {
        if edge.kind == EdgeKind::Other {
            // e.g. reflective call edges, which cannot currently be matched
            // against transfer rules
            return Ok(());
        }
        let site = solver.csm().cs_call_site(edge.call_site);
        let callee = solver.csm().cs_method(edge.callee).method;
        let Some(rules) = self.transfers.get(&callee) else {
            return Ok(());
        };
        for rule in rules.clone() {
            let Some(from) = invoke_var(solver.program(), site.invoke, rule.from) else {
                continue;
            };
            // when the rule targets the result variable and the call site
            // discards the result, the rule does not apply there
            let Some(to) = invoke_var(solver.program(), site.invoke, rule.to) else {
                continue;
            };
            let entry = self.var_transfers.entry(from).or_default();
            if !entry.contains(&(to, rule.ty)) {
                entry.push((to, rule.ty));
            }
            let cs_from = solver.csm_mut().get_cs_var(site.ctx, from);
            let pts = solver.points_to_of(cs_from);
            transfer_taint(solver, manager, &pts, site.ctx, to, rule.ty);

            // a transfer into base or an argument mutated an aliased object
            let is_ctor_base =
                rule.to == BASE && solver.program().method(callee).is_constructor;
            if self.enable_back_propagate && rule.to != RESULT && !is_ctor_base {
                self.back_propagate(solver, site.ctx, to)?;
            }
        }
        Ok(())
    }

    pub fn handle_new_pts(
        &mut self,
        solver: &mut Solver,
        manager: &mut TaintManager,
        cs_var: PointerId,
        delta: &PointsTo,
    ) {
        let Pointer::Var { ctx, var } = solver.csm().pointer(cs_var) else {
            return;
        };
        let Some(targets) = self.var_transfers.get(&var) else {
            return;
        };
        for (to, ty) in targets.clone() {
            transfer_taint(solver, manager, delta, ctx, to, ty);
        }
    }

    fn back_propagate(
        &mut self,
        solver: &mut Solver,
        ctx: ContextId,
        var: VarId,
    ) -> PluginResult {
        let container = solver.program().var(var).method;
        let stmts = match self.back_prop_stmts.get(&var) {
            Some(cached) => cached.clone(),
            None => {
                let generated = self.generate_back_prop_stmts(solver, var);
                self.back_prop_stmts.insert(var, generated.clone());
                generated
            }
        };
        if stmts.is_empty() {
            return Ok(());
        }
        let cs_method = solver.csm_mut().get_cs_method(ctx, container);
        solver
            .add_stmts(cs_method, stmts)
            .map_err(|e| PluginError(e.to_string()))
    }

    /// For every instance field load `x = base.field` in the containing
    /// method, emit `%taint-temp = base; %taint-temp.field = var`, casting
    /// through a second temporary when the field type differs from the
    /// variable's.
    fn generate_back_prop_stmts(&mut self, solver: &mut Solver, var: VarId) -> Vec<Stmt> {
        let container = solver.program().var(var).method;
        let var_ty = solver.program().var(var).ty;
        let body = solver.program().method(container).body.clone();
        let mut stmts = Vec::new();
        for stmt in body {
            let Stmt::LoadField {
                lhs: _,
                base: Some(base),
                field,
            } = stmt
            else {
                continue;
            };
            let base_ty = solver.program().var(base).ty;
            let field_ty = solver.program().field(field).ty;
            // a temp base avoids polluting the original base variable
            let temp_base = self.fresh_temp(solver, container, base_ty);
            stmts.push(Stmt::Copy {
                lhs: temp_base,
                rhs: base,
            });
            // var may hold objects that never came from base.field; the
            // field type filters the spurious ones
            let from = if field_ty == var_ty {
                var
            } else {
                let temp_from = self.fresh_temp(solver, container, field_ty);
                stmts.push(Stmt::Cast {
                    lhs: temp_from,
                    value: var,
                    ty: field_ty,
                });
                temp_from
            };
            stmts.push(Stmt::StoreField {
                base: Some(temp_base),
                field,
                rhs: from,
            });
        }
        stmts
    }

    fn fresh_temp(&mut self, solver: &mut Solver, container: MethodId, ty: TypeId) -> VarId {
        let name = format!("{}{}", TEMP_PREFIX, self.counter);
        self.counter += 1;
        solver.program_mut().add_var(container, &name, ty)
    }
}

/// Re-mints the taints in `objs` under `ty` (same source point, new type)
/// and adds them to `to` under `ctx`.
fn transfer_taint(
    solver: &mut Solver,
    manager: &mut TaintManager,
    objs: &PointsTo,
    ctx: ContextId,
    to: VarId,
    ty: TypeId,
) {
    let mut new_taints = solver.make_points_to_set();
    for cs_obj in objs {
        let obj = solver.csm().obj_of(cs_obj);
        let Some(source) = manager.source_point(obj) else {
            continue;
        };
        let taint = manager.make_taint(solver.heap_mut(), source, ty);
        let cs_taint = solver.csm_mut().get_cs_obj(EMPTY_CONTEXT, taint);
        new_taints.insert(cs_taint);
    }
    if !new_taints.is_empty() {
        solver.add_var_points_to(ctx, to, &new_taints);
    }
}
