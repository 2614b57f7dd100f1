// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The normalized three-address representation the analysis consumes:
//! class types, fields, methods, variables, and statements, plus the class
//! hierarchy queries (subtyping, dispatch, signature resolution) built on it.

pub mod hierarchy;
pub mod program;

pub use program::{
    DispatchMode, FieldId, InvokeData, InvokeId, Literal, MethodData, MethodId, MethodRefData,
    MethodRefId, Program, Stmt, TypeId, TypeKind, VarData, VarId,
};
