// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The heap model: maps allocation sites and synthetic descriptors to
//! abstract objects, and recognizes string/class constants.

use std::collections::HashMap;

use crate::index_type;
use crate::ir::{InvokeId, MethodId, TypeId};
use crate::util::bit_vec::Idx;

index_type! {
    /// The unique identifier for each abstract heap object.
    pub struct ObjId
}

/// Distinguishes families of analyzer-synthesized mock objects.
pub type Descriptor = &'static str;

pub const TAINT_DESC: Descriptor = "TaintObj";
pub const UNKNOWN_CLASS_DESC: Descriptor = "UnknownClassObj";
pub const UNKNOWN_REFLECTIVE_DESC: Descriptor = "UnknownReflectiveObj";
pub const REFLECTIVE_ALLOC_DESC: Descriptor = "ReflectiveObj";

/// Identity payload of a mock object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MockPayload {
    None,
    /// Minted for a specific call site.
    Invoke(InvokeId),
    /// Minted for the value flowing out of (or into) a call site position.
    CallPoint { invoke: InvokeId, index: i32 },
    /// Minted for a formal parameter on method entry.
    ParamPoint { method: MethodId, index: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjKind {
    /// A real allocation site: the `stmt`-th statement of `method`.
    Alloc { method: MethodId, stmt: usize },
    StringConstant(String),
    ClassConstant(TypeId),
    Mock {
        desc: Descriptor,
        payload: MockPayload,
    },
}

#[derive(Clone, Debug)]
pub struct ObjData {
    pub ty: TypeId,
    pub kind: ObjKind,
}

impl ObjData {
    /// The method whose execution allocates this object, if any.
    pub fn container_method(&self) -> Option<MethodId> {
        match self.kind {
            ObjKind::Alloc { method, .. } => Some(method),
            _ => None,
        }
    }
}

pub struct HeapModel {
    objs: Vec<ObjData>,
    alloc_sites: HashMap<(MethodId, usize), ObjId>,
    string_constants: HashMap<String, ObjId>,
    class_constants: HashMap<TypeId, ObjId>,
    mocks: HashMap<(Descriptor, MockPayload, TypeId), ObjId>,
}

impl HeapModel {
    pub fn new() -> Self {
        HeapModel {
            objs: Vec::new(),
            alloc_sites: HashMap::new(),
            string_constants: HashMap::new(),
            class_constants: HashMap::new(),
            mocks: HashMap::new(),
        }
    }

    fn intern(&mut self, data: ObjData) -> ObjId {
        let id = ObjId(self.objs.len() as u32);
        self.objs.push(data);
        id
    }

    /// The abstract object for an allocation site.
    pub fn get_alloc(&mut self, method: MethodId, stmt: usize, ty: TypeId) -> ObjId {
        if let Some(id) = self.alloc_sites.get(&(method, stmt)) {
            return *id;
        }
        let id = self.intern(ObjData {
            ty,
            kind: ObjKind::Alloc { method, stmt },
        });
        self.alloc_sites.insert((method, stmt), id);
        id
    }

    pub fn get_string_constant(&mut self, value: &str, ty: TypeId) -> ObjId {
        if let Some(id) = self.string_constants.get(value) {
            return *id;
        }
        let id = self.intern(ObjData {
            ty,
            kind: ObjKind::StringConstant(value.to_string()),
        });
        self.string_constants.insert(value.to_string(), id);
        id
    }

    pub fn get_class_constant(&mut self, class: TypeId, ty: TypeId) -> ObjId {
        if let Some(id) = self.class_constants.get(&class) {
            return *id;
        }
        let id = self.intern(ObjData {
            ty,
            kind: ObjKind::ClassConstant(class),
        });
        self.class_constants.insert(class, id);
        id
    }

    /// The mock object identified by `(desc, payload, ty)`; idempotent.
    pub fn get_mock(&mut self, desc: Descriptor, payload: MockPayload, ty: TypeId) -> ObjId {
        let key = (desc, payload.clone(), ty);
        if let Some(id) = self.mocks.get(&key) {
            return *id;
        }
        let id = self.intern(ObjData {
            ty,
            kind: ObjKind::Mock { desc, payload },
        });
        self.mocks.insert(key, id);
        id
    }

    #[inline]
    pub fn obj(&self, obj: ObjId) -> &ObjData {
        &self.objs[obj.index()]
    }

    #[inline]
    pub fn obj_ty(&self, obj: ObjId) -> TypeId {
        self.objs[obj.index()].ty
    }

    pub fn is_string_constant(&self, obj: ObjId) -> bool {
        matches!(self.obj(obj).kind, ObjKind::StringConstant(_))
    }

    pub fn is_mock(&self, obj: ObjId, desc: Descriptor) -> bool {
        matches!(&self.obj(obj).kind, ObjKind::Mock { desc: d, .. } if *d == desc)
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }
}

impl Default for HeapModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects taint-carrying objects; installed as a pointer guard on
/// sanitized formals.
pub fn rejects_taint(heap: &HeapModel, obj: ObjId) -> bool {
    heap.is_mock(obj, TAINT_DESC)
}

#[cfg(test)]
mod test {
    use super::{HeapModel, MockPayload, ObjKind, TAINT_DESC};
    use crate::ir::{InvokeId, MethodId, TypeId};

    #[test]
    fn interning_is_idempotent() {
        let mut heap = HeapModel::new();
        let ty = TypeId(0);
        let a1 = heap.get_alloc(MethodId(0), 3, ty);
        let a2 = heap.get_alloc(MethodId(0), 3, ty);
        assert_eq!(a1, a2);

        let s1 = heap.get_string_constant("secret", ty);
        let s2 = heap.get_string_constant("secret", ty);
        assert_eq!(s1, s2);
        assert!(heap.is_string_constant(s1));
        assert!(!heap.is_string_constant(a1));

        let payload = MockPayload::CallPoint {
            invoke: InvokeId(1),
            index: -2,
        };
        let m1 = heap.get_mock(TAINT_DESC, payload.clone(), ty);
        let m2 = heap.get_mock(TAINT_DESC, payload, ty);
        assert_eq!(m1, m2);
        assert!(matches!(heap.obj(m1).kind, ObjKind::Mock { .. }));
        assert_eq!(heap.len(), 3);
    }
}
