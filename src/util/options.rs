// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options.

/// The context-sensitivity variant used by the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Every method and object is analyzed under the empty context.
    Insensitive,
    /// k-CFA: contexts are call-site strings of length `context_depth`.
    CallSiteSensitive,
    /// k-obj: contexts are receiver-allocation strings of length `context_depth`.
    ObjectSensitive,
}

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub context_kind: ContextKind,
    /// The context depth limit for a context-sensitive analysis.
    pub context_depth: usize,
    /// Whether taint transfers into base/argument positions synthesize
    /// alias-updating field stores.
    pub enable_back_propagate: bool,
    /// Whether the taint flow graph keeps edges into application code only.
    pub taint_only_app: bool,
    /// Whether the taint flow graph is pruned to sink-reaching nodes.
    pub taint_only_reach_sink: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            context_kind: ContextKind::CallSiteSensitive,
            context_depth: 1,
            enable_back_propagate: true,
            taint_only_app: true,
            taint_only_reach_sink: true,
        }
    }
}
