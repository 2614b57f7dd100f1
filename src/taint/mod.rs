// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Whole-program taint analysis as a plugin over the pointer analysis:
//! configuration-driven sources, sinks, transfers and sanitizers, plus the
//! post-solve taint flow graph.

pub mod config;
pub mod manager;
pub mod source_sink;
pub mod tfg;
pub mod transfer;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use log::info;

use crate::ir::{InvokeId, MethodId, Program, TypeId, VarId};
use crate::pta::cs_manager::{CSMethodId, PointerId};
use crate::pta::heap::rejects_taint;
use crate::pta::plugin::{CallEdgeInfo, Plugin, PluginResult};
use crate::pta::result::PointerAnalysisResult;
use crate::pta::solver::Solver;
use crate::pta::{AnalysisResult, PointsTo};
use crate::util::options::AnalysisOptions;

use self::config::{ParamSanitizer, TaintConfig};
use self::manager::TaintManager;
use self::source_sink::SourceSinkHandler;
use self::tfg::{TFGBuilder, TaintFlowGraph};
use self::transfer::TransferHandler;

/// Where a taint was born.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourcePoint {
    /// The returned value or an argument of a source call.
    Call { invoke: InvokeId, index: i32 },
    /// A tainted formal parameter on method entry.
    Param { method: MethodId, index: usize },
}

/// Where a taint was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkPoint {
    pub invoke: InvokeId,
    pub index: i32,
}

/// A witnessed source-to-sink flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaintFlow {
    pub source: SourcePoint,
    pub sink: SinkPoint,
}

/// What the plugin leaves behind for post-solve consumers.
#[derive(Clone, Default)]
pub struct TaintArtifacts {
    pub flows: BTreeSet<TaintFlow>,
    pub var_transfers: HashMap<VarId, Vec<(VarId, TypeId)>>,
    pub manager: TaintManager,
}

pub type TaintArtifactsHandle = Rc<RefCell<Option<TaintArtifacts>>>;

/// The composite taint plugin: dispatches solver events to the source/sink
/// and transfer handlers and collects the flows.
pub struct TaintAnalysis {
    manager: TaintManager,
    source_sink: SourceSinkHandler,
    transfer: TransferHandler,
    sanitizers: Vec<ParamSanitizer>,
    flows: BTreeSet<TaintFlow>,
    artifacts: TaintArtifactsHandle,
}

impl TaintAnalysis {
    pub fn new(config: &TaintConfig, options: &AnalysisOptions) -> (Self, TaintArtifactsHandle) {
        let artifacts: TaintArtifactsHandle = Rc::new(RefCell::new(None));
        let analysis = TaintAnalysis {
            manager: TaintManager::new(),
            source_sink: SourceSinkHandler::new(
                &config.call_sources,
                &config.param_sources,
                &config.sinks,
            ),
            transfer: TransferHandler::new(&config.transfers, options.enable_back_propagate),
            sanitizers: config.sanitizers.clone(),
            flows: BTreeSet::new(),
            artifacts: artifacts.clone(),
        };
        (analysis, artifacts)
    }
}

impl Plugin for TaintAnalysis {
    fn on_start(&mut self, solver: &mut Solver) -> PluginResult {
        // the hook-filter rendition of sanitizers: taint objects never
        // enter the sanitized formal's points-to sets
        for sanitizer in &self.sanitizers {
            let params = &solver.program().method(sanitizer.method).params;
            if let Some(param) = params.get(sanitizer.index).copied() {
                solver.add_obj_guard(param, rejects_taint);
            }
        }
        Ok(())
    }

    fn on_new_method(&mut self, solver: &mut Solver, cs_method: CSMethodId) -> PluginResult {
        self.source_sink
            .handle_new_method(solver, &mut self.manager, cs_method);
        Ok(())
    }

    fn on_new_call_edge(&mut self, solver: &mut Solver, edge: &CallEdgeInfo) -> PluginResult {
        self.source_sink
            .handle_new_call_edge(solver, &mut self.manager, &mut self.flows, edge);
        self.transfer
            .handle_new_call_edge(solver, &mut self.manager, edge)
    }

    fn on_new_pts(
        &mut self,
        solver: &mut Solver,
        cs_var: PointerId,
        delta: &PointsTo,
    ) -> PluginResult {
        self.transfer
            .handle_new_pts(solver, &mut self.manager, cs_var, delta);
        self.source_sink
            .handle_new_pts(solver, &self.manager, &mut self.flows, cs_var, delta);
        Ok(())
    }

    fn on_finish(&mut self, _solver: &mut Solver) -> PluginResult {
        info!(
            "Taint analysis found {} flow(s) from {} taint object(s)",
            self.flows.len(),
            self.manager.count()
        );
        *self.artifacts.borrow_mut() = Some(TaintArtifacts {
            flows: self.flows.clone(),
            var_transfers: self.transfer.var_transfers().clone(),
            manager: self.manager.clone(),
        });
        Ok(())
    }
}

pub struct TaintAnalysisResult {
    pub pta: PointerAnalysisResult,
    pub taint_flows: BTreeSet<TaintFlow>,
    pub tfg: TaintFlowGraph,
}

/// Runs pointer analysis with the taint plugin and builds the pruned taint
/// flow graph.
pub fn analyze(
    program: Program,
    options: AnalysisOptions,
    config: TaintConfig,
) -> AnalysisResult<TaintAnalysisResult> {
    analyze_with(program, options, config, Vec::new())
}

/// Like [`analyze`], with extra plugins (e.g. a reflection model) running
/// in front of the taint plugin.
pub fn analyze_with(
    program: Program,
    options: AnalysisOptions,
    config: TaintConfig,
    extra_plugins: Vec<Box<dyn Plugin>>,
) -> AnalysisResult<TaintAnalysisResult> {
    let mut solver = Solver::new(program, options.clone());
    for plugin in extra_plugins {
        solver.add_plugin(plugin);
    }
    let (taint, artifacts) = TaintAnalysis::new(&config, &options);
    solver.add_plugin(Box::new(taint));
    solver.solve()?;
    let pta = PointerAnalysisResult::new(solver);
    let artifacts = artifacts.borrow_mut().take().unwrap_or_default();
    let tfg = TFGBuilder::new(
        &pta,
        &artifacts.var_transfers,
        &artifacts.flows,
        &artifacts.manager,
        options.taint_only_app,
        options.taint_only_reach_sink,
    )
    .build();
    Ok(TaintAnalysisResult {
        pta,
        taint_flows: artifacts.flows,
        tfg,
    })
}
