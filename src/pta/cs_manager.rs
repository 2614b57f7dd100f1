// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Canonicalization of context-sensitive elements.
//!
//! Every (entity, context) pair maps to exactly one dense id, created on
//! first reference and never dropped. Lookups go through a two-level map
//! whose inner level is array-backed while small, since the number of
//! contexts per entity is usually tiny.

use std::collections::HashMap;

use crate::index_type;
use crate::ir::{FieldId, InvokeId, MethodId, VarId};
use crate::pta::context::ContextId;
use crate::pta::heap::ObjId;
use crate::util::bit_vec::Idx;
use crate::util::hybrid_map::HybridMap;

index_type! {
    /// The unique identifier for each context-sensitive object.
    pub struct CSObjId
}
index_type! {
    /// The unique identifier for each context-sensitive call site.
    pub struct CSCallSiteId
}
index_type! {
    /// The unique identifier for each context-sensitive method.
    pub struct CSMethodId
}
index_type! {
    /// The unique identifier for each pointer (any variant).
    pub struct PointerId
}

/// The abstract locations that own points-to sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pointer {
    Var { ctx: ContextId, var: VarId },
    InstanceField { base: CSObjId, field: FieldId },
    ArrayIndex { array: CSObjId },
    StaticField { field: FieldId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CSObjData {
    pub ctx: ContextId,
    pub obj: ObjId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CSCallSiteData {
    pub ctx: ContextId,
    pub invoke: InvokeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CSMethodData {
    pub ctx: ContextId,
    pub method: MethodId,
}

pub struct CSManager {
    pointers: Vec<Pointer>,
    cs_objs: Vec<CSObjData>,
    cs_call_sites: Vec<CSCallSiteData>,
    cs_methods: Vec<CSMethodData>,

    vars: HashMap<VarId, HybridMap<ContextId, PointerId>>,
    objs: HashMap<ObjId, HybridMap<ContextId, CSObjId>>,
    instance_fields: HashMap<CSObjId, HybridMap<FieldId, PointerId>>,
    array_indexes: HashMap<CSObjId, PointerId>,
    static_fields: HashMap<FieldId, PointerId>,
    call_sites: HashMap<InvokeId, HybridMap<ContextId, CSCallSiteId>>,
    methods: HashMap<MethodId, HybridMap<ContextId, CSMethodId>>,
}

impl CSManager {
    pub fn new() -> Self {
        CSManager {
            pointers: Vec::new(),
            cs_objs: Vec::new(),
            cs_call_sites: Vec::new(),
            cs_methods: Vec::new(),
            vars: HashMap::new(),
            objs: HashMap::new(),
            instance_fields: HashMap::new(),
            array_indexes: HashMap::new(),
            static_fields: HashMap::new(),
            call_sites: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn get_cs_var(&mut self, ctx: ContextId, var: VarId) -> PointerId {
        let pointers = &mut self.pointers;
        self.vars
            .entry(var)
            .or_default()
            .get_or_insert_with(ctx, || {
                let id = PointerId(pointers.len() as u32);
                pointers.push(Pointer::Var { ctx, var });
                id
            })
    }

    pub fn get_cs_obj(&mut self, heap_ctx: ContextId, obj: ObjId) -> CSObjId {
        let cs_objs = &mut self.cs_objs;
        self.objs
            .entry(obj)
            .or_default()
            .get_or_insert_with(heap_ctx, || {
                let id = CSObjId(cs_objs.len() as u32);
                cs_objs.push(CSObjData { ctx: heap_ctx, obj });
                id
            })
    }

    pub fn get_instance_field(&mut self, base: CSObjId, field: FieldId) -> PointerId {
        let pointers = &mut self.pointers;
        self.instance_fields
            .entry(base)
            .or_default()
            .get_or_insert_with(field, || {
                let id = PointerId(pointers.len() as u32);
                pointers.push(Pointer::InstanceField { base, field });
                id
            })
    }

    pub fn get_array_index(&mut self, array: CSObjId) -> PointerId {
        let pointers = &mut self.pointers;
        *self.array_indexes.entry(array).or_insert_with(|| {
            let id = PointerId(pointers.len() as u32);
            pointers.push(Pointer::ArrayIndex { array });
            id
        })
    }

    pub fn get_static_field(&mut self, field: FieldId) -> PointerId {
        let pointers = &mut self.pointers;
        *self.static_fields.entry(field).or_insert_with(|| {
            let id = PointerId(pointers.len() as u32);
            pointers.push(Pointer::StaticField { field });
            id
        })
    }

    pub fn get_cs_call_site(&mut self, ctx: ContextId, invoke: InvokeId) -> CSCallSiteId {
        let cs_call_sites = &mut self.cs_call_sites;
        self.call_sites
            .entry(invoke)
            .or_default()
            .get_or_insert_with(ctx, || {
                let id = CSCallSiteId(cs_call_sites.len() as u32);
                cs_call_sites.push(CSCallSiteData { ctx, invoke });
                id
            })
    }

    pub fn get_cs_method(&mut self, ctx: ContextId, method: MethodId) -> CSMethodId {
        let cs_methods = &mut self.cs_methods;
        self.methods
            .entry(method)
            .or_default()
            .get_or_insert_with(ctx, || {
                let id = CSMethodId(cs_methods.len() as u32);
                cs_methods.push(CSMethodData { ctx, method });
                id
            })
    }

    #[inline]
    pub fn pointer(&self, id: PointerId) -> Pointer {
        self.pointers[id.index()]
    }

    #[inline]
    pub fn cs_obj(&self, id: CSObjId) -> CSObjData {
        self.cs_objs[id.index()]
    }

    #[inline]
    pub fn obj_of(&self, id: CSObjId) -> ObjId {
        self.cs_objs[id.index()].obj
    }

    #[inline]
    pub fn cs_call_site(&self, id: CSCallSiteId) -> CSCallSiteData {
        self.cs_call_sites[id.index()]
    }

    #[inline]
    pub fn cs_method(&self, id: CSMethodId) -> CSMethodData {
        self.cs_methods[id.index()]
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// All context-sensitive variable pointers.
    pub fn cs_vars(&self) -> impl Iterator<Item = PointerId> + '_ {
        self.vars.values().flat_map(|inner| inner.values())
    }

    /// All context variants of one variable.
    pub fn cs_vars_of(&self, var: VarId) -> Vec<PointerId> {
        self.vars
            .get(&var)
            .map(|inner| inner.values().collect())
            .unwrap_or_default()
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = PointerId> + '_ {
        self.instance_fields
            .values()
            .flat_map(|inner| inner.values())
    }

    pub fn array_indexes(&self) -> impl Iterator<Item = PointerId> + '_ {
        self.array_indexes.values().copied()
    }

    pub fn static_fields(&self) -> impl Iterator<Item = PointerId> + '_ {
        self.static_fields.values().copied()
    }

    pub fn objects(&self) -> impl Iterator<Item = CSObjId> + '_ {
        (0..self.cs_objs.len()).map(|i| CSObjId(i as u32))
    }

    pub fn pointer_ids(&self) -> impl Iterator<Item = PointerId> + '_ {
        (0..self.pointers.len()).map(|i| PointerId(i as u32))
    }
}

impl Default for CSManager {
    fn default() -> Self {
        Self::new()
    }
}
