// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Class hierarchy queries: subtyping, virtual dispatch and resolution of
//! method signature strings of the form `<Class: Ret name(P0,P1)>`.

use itertools::Itertools;
use log::warn;

use super::program::{MethodId, MethodRefId, Program, TypeId, TypeKind};
use crate::util::bit_vec::Idx;

impl Program {
    /// Is `sub` assignable to `sup`?
    ///
    /// Classes follow the superclass chain; arrays are covariant in their
    /// element type and assignable to the hierarchy root.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        match (&self.types[sub.index()].kind, &self.types[sup.index()].kind) {
            (TypeKind::Class { .. }, TypeKind::Class { .. }) => {
                let mut cur = sub;
                loop {
                    match self.superclass(cur) {
                        Some(s) if s == sup => return true,
                        Some(s) => cur = s,
                        None => return false,
                    }
                }
            }
            (TypeKind::Array { elem: e1 }, TypeKind::Array { elem: e2 }) => {
                self.is_subtype(*e1, *e2)
            }
            (TypeKind::Array { .. }, TypeKind::Class { superclass }) => superclass.is_none(),
            _ => false,
        }
    }

    pub fn superclass(&self, ty: TypeId) -> Option<TypeId> {
        match self.types[ty.index()].kind {
            TypeKind::Class { superclass } => superclass,
            TypeKind::Array { .. } => None,
        }
    }

    /// Resolves a virtual call: walks from the receiver's dynamic type up the
    /// superclass chain for a concrete method matching the reference's name
    /// and descriptor.
    pub fn dispatch(&self, recv_ty: TypeId, method_ref: MethodRefId) -> Option<MethodId> {
        let target = self.method_ref_data(method_ref);
        let mut cur = Some(recv_ty);
        while let Some(ty) = cur {
            for &m in &self.types[ty.index()].methods {
                let md = self.method(m);
                if !md.is_abstract && md.name == target.name && md.param_tys == target.param_tys {
                    return Some(m);
                }
            }
            cur = self.superclass(ty);
        }
        None
    }

    /// Resolves a static or special call directly against the reference's
    /// declaring class (inherited members included).
    pub fn resolve_ref(&self, method_ref: MethodRefId) -> Option<MethodId> {
        let class = self.method_ref_data(method_ref).class;
        self.dispatch(class, method_ref)
    }

    /// The canonical signature string of a method.
    pub fn signature_of(&self, method: MethodId) -> String {
        let m = self.method(method);
        let params = m
            .param_tys
            .iter()
            .map(|t| self.type_data(*t).name.as_str())
            .join(",");
        let ret = m
            .ret_ty
            .map_or("void", |t| self.type_data(t).name.as_str());
        format!(
            "<{}: {} {}({})>",
            self.type_data(m.class).name,
            ret,
            m.name,
            params
        )
    }

    /// Looks a method up by its signature string. Logs and returns `None` on
    /// signatures absent from the hierarchy.
    pub fn method_by_signature(&self, signature: &str) -> Option<MethodId> {
        let found = self.signatures.get(signature).copied();
        if found.is_none() {
            warn!("Cannot resolve method signature '{}'", signature);
        }
        found
    }
}

#[cfg(test)]
mod test {
    use crate::ir::Program;

    #[test]
    fn signature_round_trip() {
        let mut p = Program::new();
        let object = p.add_class("java.lang.Object", None);
        let string = p.add_class("java.lang.String", Some(object));
        let t = p.add_class("T", Some(object));
        let m = p.add_method(t, "source", &[string], Some(string));
        assert_eq!(
            p.signature_of(m),
            "<T: java.lang.String source(java.lang.String)>"
        );
        assert_eq!(
            p.method_by_signature("<T: java.lang.String source(java.lang.String)>"),
            Some(m)
        );
        assert_eq!(p.method_by_signature("<T: void nope()>"), None);
    }

    #[test]
    fn dispatch_walks_superclasses() {
        let mut p = Program::new();
        let object = p.add_class("java.lang.Object", None);
        let a = p.add_class("A", Some(object));
        let b = p.add_class("B", Some(a));
        let c = p.add_class("C", Some(b));
        let m_a = p.add_method(a, "m", &[], None);
        let m_b = p.add_method(b, "m", &[], None);
        let r = p.method_ref(a, "m", &[], None);

        assert_eq!(p.dispatch(c, r), Some(m_b));
        assert_eq!(p.dispatch(b, r), Some(m_b));
        assert_eq!(p.dispatch(a, r), Some(m_a));
        assert_eq!(p.dispatch(object, r), None);
    }

    #[test]
    fn array_subtyping() {
        let mut p = Program::new();
        let object = p.add_class("java.lang.Object", None);
        let a = p.add_class("A", Some(object));
        let b = p.add_class("B", Some(a));
        let arr_a = p.add_array_type(a);
        let arr_b = p.add_array_type(b);
        assert!(p.is_subtype(b, a));
        assert!(p.is_subtype(arr_b, arr_a));
        assert!(p.is_subtype(arr_a, object));
        assert!(!p.is_subtype(arr_a, arr_b));
        assert!(!p.is_subtype(a, b));
    }
}
