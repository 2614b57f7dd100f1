// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::Hash;
use std::rc::Rc;

use crate::index_type;
use crate::ir::{InvokeId, TypeId};
use crate::pta::heap::ObjId;
use crate::util::bit_vec::Idx;

index_type! {
    /// The unique identifier for each context.
    pub struct ContextId
}

/// The distinguished empty context, interned first in every cache.
pub const EMPTY_CONTEXT: ContextId = ContextId(0);

pub trait ContextElement: Clone + Eq + PartialEq + Debug + Hash {}

impl ContextElement for InvokeId {}
impl ContextElement for ObjId {}
impl ContextElement for TypeId {}

/// An abstraction of calling/allocation history: a bounded string of
/// context elements, most recent first.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context<E: ContextElement> {
    elems: Vec<E>,
}

impl<E: ContextElement> Debug for Context<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.elems.fmt(f)
    }
}

impl<E: ContextElement> Context<E> {
    pub fn new_empty() -> Rc<Self> {
        Rc::new(Context { elems: Vec::new() })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn elems(&self) -> &[E] {
        &self.elems
    }

    /// Compose a new context from a given context and a new context element.
    /// Discards the oldest elements once the length exceeds `k`.
    pub fn new_k_limited(old_ctx: &Rc<Context<E>>, elem: E, k: usize) -> Rc<Self> {
        let mut elems = Vec::with_capacity(k);
        if k > 0 {
            elems.push(elem);
            let keep = (k - 1).min(old_ctx.elems.len());
            elems.extend_from_slice(&old_ctx.elems[..keep]);
        }
        Rc::new(Context { elems })
    }

    /// Truncates a context to its `k` most recent elements.
    pub fn k_limited(ctx: &Rc<Context<E>>, k: usize) -> Rc<Self> {
        if ctx.len() <= k {
            ctx.clone()
        } else {
            Rc::new(Context {
                elems: ctx.elems[..k].to_vec(),
            })
        }
    }
}

/// Interns contexts and hands out dense [`ContextId`]s.
#[derive(Debug)]
pub struct ContextCache<E: ContextElement> {
    context_list: Vec<Rc<Context<E>>>,
    context_to_index: HashMap<Rc<Context<E>>, ContextId>,
}

impl<E: ContextElement> ContextCache<E> {
    pub fn new() -> ContextCache<E> {
        let mut cache = ContextCache {
            context_list: Vec::new(),
            context_to_index: HashMap::new(),
        };
        // the empty context always gets id 0
        cache.get_context_id(&Context::new_empty());
        cache
    }

    pub fn get_context_id(&mut self, context: &Rc<Context<E>>) -> ContextId {
        if let Some(id) = self.context_to_index.get(context) {
            *id
        } else {
            let id = ContextId(self.context_list.len() as u32);
            self.context_list.push(context.clone());
            self.context_to_index.insert(context.clone(), id);
            id
        }
    }

    pub fn get_context(&self, id: ContextId) -> Rc<Context<E>> {
        self.context_list[id.index()].clone()
    }

    pub fn len(&self) -> usize {
        self.context_list.len()
    }
}

impl<E: ContextElement> Default for ContextCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::{Context, ContextCache, EMPTY_CONTEXT};
    use crate::ir::InvokeId;

    #[test]
    fn empty_context_is_id_zero() {
        let mut cache = ContextCache::<InvokeId>::new();
        assert_eq!(cache.get_context_id(&Context::new_empty()), EMPTY_CONTEXT);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn k_limiting_discards_oldest() {
        let empty: Rc<Context<InvokeId>> = Context::new_empty();
        let c1 = Context::new_k_limited(&empty, InvokeId(1), 2);
        let c2 = Context::new_k_limited(&c1, InvokeId(2), 2);
        let c3 = Context::new_k_limited(&c2, InvokeId(3), 2);
        assert_eq!(c3.elems(), &[InvokeId(3), InvokeId(2)]);

        let zero = Context::new_k_limited(&c2, InvokeId(9), 0);
        assert!(zero.is_empty());
    }

    #[test]
    fn interning_is_idempotent() {
        let mut cache = ContextCache::<InvokeId>::new();
        let empty = Context::new_empty();
        let c1 = Context::new_k_limited(&empty, InvokeId(7), 2);
        let c1_again = Context::new_k_limited(&empty, InvokeId(7), 2);
        assert_eq!(cache.get_context_id(&c1), cache.get_context_id(&c1_again));
    }
}
