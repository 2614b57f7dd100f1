// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};

use crate::index_type;
use crate::util::bit_vec::Idx;

index_type! {
    /// The unique identifier for each type.
    pub struct TypeId
}
index_type! {
    /// The unique identifier for each field.
    pub struct FieldId
}
index_type! {
    /// The unique identifier for each method.
    pub struct MethodId
}
index_type! {
    /// The unique identifier for each symbolic method reference.
    pub struct MethodRefId
}
index_type! {
    /// The unique identifier for each variable, across all methods.
    pub struct VarId
}
index_type! {
    /// The unique identifier for each call site.
    pub struct InvokeId
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Class { superclass: Option<TypeId> },
    Array { elem: TypeId },
}

#[derive(Clone, Debug)]
pub struct TypeData {
    pub name: String,
    pub kind: TypeKind,
    /// Methods declared directly on this type.
    pub methods: Vec<MethodId>,
}

#[derive(Clone, Debug)]
pub struct FieldData {
    pub class: TypeId,
    pub name: String,
    pub ty: TypeId,
}

#[derive(Clone, Debug)]
pub struct MethodData {
    pub class: TypeId,
    pub name: String,
    pub param_tys: Vec<TypeId>,
    pub ret_ty: Option<TypeId>,
    /// Formal parameter variables, one per entry of `param_tys`.
    pub params: Vec<VarId>,
    /// The receiver variable; absent for static methods.
    pub this: Option<VarId>,
    pub is_static: bool,
    pub is_constructor: bool,
    pub is_abstract: bool,
    pub is_application: bool,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct VarData {
    pub method: MethodId,
    pub name: String,
    pub ty: TypeId,
}

/// A symbolic method reference, resolved against the hierarchy at call time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRefData {
    pub class: TypeId,
    pub name: String,
    pub param_tys: Vec<TypeId>,
    pub ret_ty: Option<TypeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Resolved directly against the reference's class.
    Static,
    /// Resolved per receiver object's dynamic type.
    Virtual,
    /// Constructor and super calls; resolved like static but with a receiver.
    Special,
}

#[derive(Clone, Debug)]
pub struct InvokeData {
    /// The containing method.
    pub method: MethodId,
    pub mode: DispatchMode,
    pub callee: MethodRefId,
    pub base: Option<VarId>,
    pub args: Vec<VarId>,
    pub result: Option<VarId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Class(TypeId),
}

/// A three-address statement.
#[derive(Clone, Debug)]
pub enum Stmt {
    Copy { lhs: VarId, rhs: VarId },
    Cast { lhs: VarId, value: VarId, ty: TypeId },
    /// Static load when `base` is absent.
    LoadField { lhs: VarId, base: Option<VarId>, field: FieldId },
    StoreField { base: Option<VarId>, field: FieldId, rhs: VarId },
    LoadArray { lhs: VarId, array: VarId },
    StoreArray { array: VarId, rhs: VarId },
    Invoke(InvokeId),
    New { lhs: VarId, ty: TypeId },
    AssignLiteral { lhs: VarId, literal: Literal },
    Return { value: Option<VarId> },
}

/// The whole-program IR: arenas for every program entity, plus the entry
/// points the analysis starts from. Read-only during a solve except for
/// temporary variables created for synthesized statements.
#[derive(Clone)]
pub struct Program {
    pub(crate) types: Vec<TypeData>,
    pub(crate) type_names: HashMap<String, TypeId>,
    pub(crate) fields: Vec<FieldData>,
    pub(crate) methods: Vec<MethodData>,
    pub(crate) method_refs: Vec<MethodRefData>,
    method_ref_lookup: HashMap<MethodRefData, MethodRefId>,
    pub(crate) vars: Vec<VarData>,
    pub(crate) invokes: Vec<InvokeData>,
    pub(crate) signatures: HashMap<String, MethodId>,
    pub entry_points: Vec<MethodId>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            types: Vec::new(),
            type_names: HashMap::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            method_refs: Vec::new(),
            method_ref_lookup: HashMap::new(),
            vars: Vec::new(),
            invokes: Vec::new(),
            signatures: HashMap::new(),
            entry_points: Vec::new(),
        }
    }

    pub fn add_class(&mut self, name: &str, superclass: Option<TypeId>) -> TypeId {
        self.intern_type(name.to_string(), TypeKind::Class { superclass })
    }

    pub fn add_array_type(&mut self, elem: TypeId) -> TypeId {
        let name = format!("{}[]", self.types[elem.index()].name);
        self.intern_type(name, TypeKind::Array { elem })
    }

    fn intern_type(&mut self, name: String, kind: TypeKind) -> TypeId {
        if let Some(id) = self.type_names.get(&name) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.type_names.insert(name.clone(), id);
        self.types.push(TypeData {
            name,
            kind,
            methods: Vec::new(),
        });
        id
    }

    pub fn add_field(&mut self, class: TypeId, name: &str, ty: TypeId) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldData {
            class,
            name: name.to_string(),
            ty,
        });
        id
    }

    /// Adds a method with automatically created `this` and parameter
    /// variables. Flags default to a non-static application method.
    pub fn add_method(
        &mut self,
        class: TypeId,
        name: &str,
        param_tys: &[TypeId],
        ret_ty: Option<TypeId>,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodData {
            class,
            name: name.to_string(),
            param_tys: param_tys.to_vec(),
            ret_ty,
            params: Vec::new(),
            this: None,
            is_static: false,
            is_constructor: false,
            is_abstract: false,
            is_application: true,
            body: Vec::new(),
        });
        let this = self.add_var(id, "%this", class);
        self.methods[id.index()].this = Some(this);
        for (i, ty) in param_tys.to_vec().into_iter().enumerate() {
            let param = self.add_var(id, &format!("p{i}"), ty);
            self.methods[id.index()].params.push(param);
        }
        self.types[class.index()].methods.push(id);
        let sig = self.signature_of(id);
        self.signatures.insert(sig, id);
        id
    }

    pub fn set_static(&mut self, method: MethodId) {
        self.methods[method.index()].is_static = true;
        self.methods[method.index()].this = None;
    }

    pub fn set_constructor(&mut self, method: MethodId) {
        self.methods[method.index()].is_constructor = true;
    }

    pub fn set_abstract(&mut self, method: MethodId) {
        self.methods[method.index()].is_abstract = true;
    }

    pub fn set_application(&mut self, method: MethodId, is_application: bool) {
        self.methods[method.index()].is_application = is_application;
    }

    pub fn set_body(&mut self, method: MethodId, body: Vec<Stmt>) {
        self.methods[method.index()].body = body;
    }

    pub fn add_entry_point(&mut self, method: MethodId) {
        self.entry_points.push(method);
    }

    pub fn add_var(&mut self, method: MethodId, name: &str, ty: TypeId) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarData {
            method,
            name: name.to_string(),
            ty,
        });
        id
    }

    pub fn method_ref(
        &mut self,
        class: TypeId,
        name: &str,
        param_tys: &[TypeId],
        ret_ty: Option<TypeId>,
    ) -> MethodRefId {
        let data = MethodRefData {
            class,
            name: name.to_string(),
            param_tys: param_tys.to_vec(),
            ret_ty,
        };
        if let Some(id) = self.method_ref_lookup.get(&data) {
            return *id;
        }
        let id = MethodRefId(self.method_refs.len() as u32);
        self.method_ref_lookup.insert(data.clone(), id);
        self.method_refs.push(data);
        id
    }

    /// A symbolic reference mirroring an existing method declaration.
    pub fn method_ref_of(&mut self, method: MethodId) -> MethodRefId {
        let m = &self.methods[method.index()];
        let (class, name, param_tys, ret_ty) =
            (m.class, m.name.clone(), m.param_tys.clone(), m.ret_ty);
        self.method_ref(class, &name, &param_tys, ret_ty)
    }

    pub fn new_invoke(
        &mut self,
        method: MethodId,
        mode: DispatchMode,
        callee: MethodRefId,
        base: Option<VarId>,
        args: Vec<VarId>,
        result: Option<VarId>,
    ) -> InvokeId {
        let id = InvokeId(self.invokes.len() as u32);
        self.invokes.push(InvokeData {
            method,
            mode,
            callee,
            base,
            args,
            result,
        });
        id
    }

    #[inline]
    pub fn type_data(&self, ty: TypeId) -> &TypeData {
        &self.types[ty.index()]
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    #[inline]
    pub fn field(&self, field: FieldId) -> &FieldData {
        &self.fields[field.index()]
    }

    #[inline]
    pub fn method(&self, method: MethodId) -> &MethodData {
        &self.methods[method.index()]
    }

    #[inline]
    pub fn method_ref_data(&self, method_ref: MethodRefId) -> &MethodRefData {
        &self.method_refs[method_ref.index()]
    }

    #[inline]
    pub fn var(&self, var: VarId) -> &VarData {
        &self.vars[var.index()]
    }

    #[inline]
    pub fn invoke(&self, invoke: InvokeId) -> &InvokeData {
        &self.invokes[invoke.index()]
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        (0..self.methods.len()).map(|i| MethodId(i as u32))
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_fmt(format_args!(
            "Program({} types, {} methods, {} vars)",
            self.types.len(),
            self.methods.len(),
            self.vars.len()
        ))
    }
}
