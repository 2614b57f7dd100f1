// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The solver's extension surface. Plugins observe reachable-method
//! expansion, call edges and points-to deltas, and mutate the solve through
//! the solver's public mutators.

use std::collections::HashMap;

use crate::graph::call_graph::EdgeKind;
use crate::ir::{InvokeId, MethodId, Program, Stmt, VarId};
use crate::pta::cs_manager::{CSCallSiteId, CSMethodId, PointerId};
use crate::pta::solver::Solver;
use crate::pta::PointsTo;

/// Call-site position of the receiver.
pub const BASE: i32 = -1;
/// Call-site position of the result variable.
pub const RESULT: i32 = -2;

/// The variable at a call-site position; `None` when the position does not
/// exist there (e.g. a discarded result).
pub fn invoke_var(program: &Program, invoke: InvokeId, index: i32) -> Option<VarId> {
    let inv = program.invoke(invoke);
    match index {
        BASE => inv.base,
        RESULT => inv.result,
        n if n >= 0 => inv.args.get(n as usize).copied(),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CallEdgeInfo {
    pub call_site: CSCallSiteId,
    pub callee: CSMethodId,
    pub kind: EdgeKind,
}

#[derive(thiserror::Error, Debug)]
#[error("plugin failure: {0}")]
pub struct PluginError(pub String);

pub type PluginResult = Result<(), PluginError>;

/// Hooks are invoked synchronously from the solver loop; a failure aborts
/// the whole solve.
pub trait Plugin {
    fn on_start(&mut self, _solver: &mut Solver) -> PluginResult {
        Ok(())
    }

    /// A context-sensitive method became reachable.
    fn on_new_method(&mut self, _solver: &mut Solver, _cs_method: CSMethodId) -> PluginResult {
        Ok(())
    }

    /// A statement was encountered during reachable-method expansion,
    /// including synthesized statements injected mid-solve.
    fn on_new_stmt(
        &mut self,
        _solver: &mut Solver,
        _cs_method: CSMethodId,
        _stmt: &Stmt,
    ) -> PluginResult {
        Ok(())
    }

    /// A new call edge was added, after its this/param/return wiring.
    fn on_new_call_edge(&mut self, _solver: &mut Solver, _edge: &CallEdgeInfo) -> PluginResult {
        Ok(())
    }

    /// A context-sensitive variable gained new objects.
    fn on_new_pts(
        &mut self,
        _solver: &mut Solver,
        _cs_var: PointerId,
        _delta: &PointsTo,
    ) -> PluginResult {
        Ok(())
    }

    fn on_finish(&mut self, _solver: &mut Solver) -> PluginResult {
        Ok(())
    }
}

/// Per-call-site rule dispatch: handlers registered for a callee signature
/// together with the argument indices of interest. The table is built at
/// plugin construction time; at solve time it maps new call edges and
/// points-to deltas back to the registered handler tokens.
pub struct InvokeHandlerTable<H: Copy> {
    by_callee: HashMap<MethodId, Vec<(Vec<i32>, H)>>,
    by_var: HashMap<VarId, Vec<(H, InvokeId)>>,
}

impl<H: Copy> InvokeHandlerTable<H> {
    pub fn new() -> Self {
        InvokeHandlerTable {
            by_callee: HashMap::new(),
            by_var: HashMap::new(),
        }
    }

    pub fn register(&mut self, callee: MethodId, indices: &[i32], handler: H) {
        self.by_callee
            .entry(callee)
            .or_default()
            .push((indices.to_vec(), handler));
    }

    /// Handlers interested in a new call edge. Also indexes the call site's
    /// variables at the registered positions so later deltas on them are
    /// routed back through [`Self::handlers_on_var`].
    pub fn handlers_for_call(
        &mut self,
        program: &Program,
        invoke: InvokeId,
        callee: MethodId,
    ) -> Vec<(H, InvokeId)> {
        let mut fired = Vec::new();
        let Some(specs) = self.by_callee.get(&callee) else {
            return fired;
        };
        for (indices, handler) in specs.clone() {
            for index in indices {
                if let Some(var) = invoke_var(program, invoke, index) {
                    let entry = self.by_var.entry(var).or_default();
                    if !entry.iter().any(|(_, i)| *i == invoke) {
                        entry.push((handler, invoke));
                    }
                }
            }
            fired.push((handler, invoke));
        }
        fired
    }

    pub fn handlers_on_var(&self, var: VarId) -> &[(H, InvokeId)] {
        self.by_var.get(&var).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<H: Copy> Default for InvokeHandlerTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
