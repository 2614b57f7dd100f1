// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Context selection strategies: which heap/method contexts a
//! context-sensitive solve creates.

use super::context::{Context, ContextCache, ContextId, EMPTY_CONTEXT};
use super::heap::ObjId;
use crate::ir::{InvokeId, MethodId};
use crate::util::options::{AnalysisOptions, ContextKind};

pub trait ContextSelector {
    /// The context for the callee of a resolved call. `recv` carries the
    /// receiver object and its heap context for instance calls.
    fn select_callee_context(
        &mut self,
        caller_ctx: ContextId,
        invoke: InvokeId,
        recv: Option<(ContextId, ObjId)>,
        callee: MethodId,
    ) -> ContextId;

    /// The heap context for an allocation in a method analyzed under
    /// `method_ctx`.
    fn select_heap_context(&mut self, method_ctx: ContextId, obj: ObjId) -> ContextId;

    fn empty_context(&self) -> ContextId {
        EMPTY_CONTEXT
    }
}

pub fn make_selector(options: &AnalysisOptions) -> Box<dyn ContextSelector> {
    match options.context_kind {
        ContextKind::Insensitive => Box::new(ContextInsensitive),
        ContextKind::CallSiteSensitive => {
            Box::new(KCallSiteSensitive::new(options.context_depth))
        }
        ContextKind::ObjectSensitive => Box::new(KObjectSensitive::new(options.context_depth)),
    }
}

/// Every method and object lives in the empty context.
pub struct ContextInsensitive;

impl ContextSelector for ContextInsensitive {
    fn select_callee_context(
        &mut self,
        _caller_ctx: ContextId,
        _invoke: InvokeId,
        _recv: Option<(ContextId, ObjId)>,
        _callee: MethodId,
    ) -> ContextId {
        EMPTY_CONTEXT
    }

    fn select_heap_context(&mut self, _method_ctx: ContextId, _obj: ObjId) -> ContextId {
        EMPTY_CONTEXT
    }
}

/// k-CFA: method contexts are the k most recent call sites, heap contexts
/// the k-1 most recent.
pub struct KCallSiteSensitive {
    k: usize,
    cache: ContextCache<InvokeId>,
}

impl KCallSiteSensitive {
    pub fn new(k: usize) -> Self {
        KCallSiteSensitive {
            k,
            cache: ContextCache::new(),
        }
    }
}

impl ContextSelector for KCallSiteSensitive {
    fn select_callee_context(
        &mut self,
        caller_ctx: ContextId,
        invoke: InvokeId,
        _recv: Option<(ContextId, ObjId)>,
        _callee: MethodId,
    ) -> ContextId {
        let old = self.cache.get_context(caller_ctx);
        let new = Context::new_k_limited(&old, invoke, self.k);
        self.cache.get_context_id(&new)
    }

    fn select_heap_context(&mut self, method_ctx: ContextId, _obj: ObjId) -> ContextId {
        let ctx = self.cache.get_context(method_ctx);
        let limited = Context::k_limited(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&limited)
    }
}

/// k-obj: instance method contexts are receiver-allocation strings; static
/// calls inherit the caller's context.
pub struct KObjectSensitive {
    k: usize,
    cache: ContextCache<ObjId>,
}

impl KObjectSensitive {
    pub fn new(k: usize) -> Self {
        KObjectSensitive {
            k,
            cache: ContextCache::new(),
        }
    }
}

impl ContextSelector for KObjectSensitive {
    fn select_callee_context(
        &mut self,
        caller_ctx: ContextId,
        _invoke: InvokeId,
        recv: Option<(ContextId, ObjId)>,
        _callee: MethodId,
    ) -> ContextId {
        match recv {
            Some((heap_ctx, obj)) => {
                let old = self.cache.get_context(heap_ctx);
                let new = Context::new_k_limited(&old, obj, self.k);
                self.cache.get_context_id(&new)
            }
            None => caller_ctx,
        }
    }

    fn select_heap_context(&mut self, method_ctx: ContextId, _obj: ObjId) -> ContextId {
        let ctx = self.cache.get_context(method_ctx);
        let limited = Context::k_limited(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&limited)
    }
}

#[cfg(test)]
mod test {
    use super::{ContextSelector, KCallSiteSensitive};
    use crate::ir::{InvokeId, MethodId};
    use crate::pta::context::EMPTY_CONTEXT;

    #[test]
    fn one_cfa_distinguishes_call_sites() {
        let mut sel = KCallSiteSensitive::new(1);
        let callee = MethodId(0);
        let c1 = sel.select_callee_context(EMPTY_CONTEXT, InvokeId(1), None, callee);
        let c2 = sel.select_callee_context(EMPTY_CONTEXT, InvokeId(2), None, callee);
        let c1_again = sel.select_callee_context(EMPTY_CONTEXT, InvokeId(1), None, callee);
        assert_ne!(c1, c2);
        assert_eq!(c1, c1_again);

        // with k = 1, heap contexts collapse to the empty context
        assert_eq!(sel.select_heap_context(c1, super::ObjId(0)), EMPTY_CONTEXT);
    }
}
