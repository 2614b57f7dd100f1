// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Reflection model scenarios: opaque `forName` arguments produce unknown
//! reflective objects, constant arguments resolve precisely.

mod common;

use taintflow::ir::{DispatchMode, Literal, MethodId, Program, Stmt, TypeId, VarId};
use taintflow::pta::heap::{REFLECTIVE_ALLOC_DESC, UNKNOWN_REFLECTIVE_DESC};
use taintflow::pta::reflection::{ReflectionModel, ReflectionSignatures};
use taintflow::pta::result::PointerAnalysisResult;
use taintflow::pta::solver::Solver;
use taintflow::util::options::AnalysisOptions;

use common::init_logger;

struct ReflectiveProgram {
    program: Program,
    c_class: TypeId,
    main_m: MethodId,
    string_ty: TypeId,
    class_ty: TypeId,
    o: VarId,
}

/// `java.lang.Object`, `java.lang.String`, `java.lang.Class` (with the
/// reflective entry points), and an instantiable class `C`.
fn reflective_program() -> ReflectiveProgram {
    let mut p = Program::new();
    let object = p.add_class("java.lang.Object", None);
    let string_ty = p.add_class("java.lang.String", Some(object));
    let class_ty = p.add_class("java.lang.Class", Some(object));
    let for_name = p.add_method(class_ty, "forName", &[string_ty], Some(class_ty));
    p.set_static(for_name);
    let _new_instance = p.add_method(class_ty, "newInstance", &[], Some(object));
    let c_class = p.add_class("C", Some(object));
    let ctor = p.add_method(c_class, "<init>", &[], None);
    p.set_constructor(ctor);

    let t = p.add_class("T", None);
    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let o = p.add_var(main_m, "o", object);
    ReflectiveProgram {
        program: p,
        c_class,
        main_m,
        string_ty,
        class_ty,
        o,
    }
}

fn solve_with_reflection(program: Program) -> PointerAnalysisResult {
    let model = ReflectionModel::new(&program, &ReflectionSignatures::default());
    let mut solver = Solver::new(program, AnalysisOptions::default());
    solver.add_plugin(Box::new(model));
    solver.solve().unwrap();
    PointerAnalysisResult::new(solver)
}

#[test]
fn opaque_for_name_yields_one_unknown_reflective_object() {
    init_logger();
    let ReflectiveProgram {
        mut program,
        main_m,
        string_ty,
        class_ty,
        o,
        ..
    } = reflective_program();
    let x = program.add_var(main_m, "x", string_ty);
    let cls = program.add_var(main_m, "cls", class_ty);
    let for_name_ref = program.method_ref(class_ty, "forName", &[string_ty], Some(class_ty));
    let object = program.type_by_name("java.lang.Object").unwrap();
    let new_instance_ref = program.method_ref(class_ty, "newInstance", &[], Some(object));
    let for_name_call = program.new_invoke(
        main_m,
        DispatchMode::Static,
        for_name_ref,
        None,
        vec![x],
        Some(cls),
    );
    let new_instance_call = program.new_invoke(
        main_m,
        DispatchMode::Virtual,
        new_instance_ref,
        Some(cls),
        vec![],
        Some(o),
    );
    program.set_body(
        main_m,
        vec![
            // x is not a string constant
            Stmt::New { lhs: x, ty: string_ty },
            Stmt::Invoke(for_name_call),
            Stmt::Invoke(new_instance_call),
        ],
    );
    program.add_entry_point(main_m);

    let result = solve_with_reflection(program);
    let objs = result.points_to(o);
    assert_eq!(objs.len(), 1);
    let obj = *objs.iter().next().unwrap();
    assert!(result.heap().is_mock(obj, UNKNOWN_REFLECTIVE_DESC));
    assert!(result.unsound_invokes().contains(&new_instance_call));
    assert!(result.unsound_invokes().contains(&for_name_call));
}

#[test]
fn constant_for_name_resolves_precisely() {
    init_logger();
    let ReflectiveProgram {
        mut program,
        c_class,
        main_m,
        string_ty,
        class_ty,
        o,
    } = reflective_program();
    let y = program.add_var(main_m, "y", string_ty);
    let cls = program.add_var(main_m, "cls", class_ty);
    let for_name_ref = program.method_ref(class_ty, "forName", &[string_ty], Some(class_ty));
    let object = program.type_by_name("java.lang.Object").unwrap();
    let new_instance_ref = program.method_ref(class_ty, "newInstance", &[], Some(object));
    let for_name_call = program.new_invoke(
        main_m,
        DispatchMode::Static,
        for_name_ref,
        None,
        vec![y],
        Some(cls),
    );
    let new_instance_call = program.new_invoke(
        main_m,
        DispatchMode::Virtual,
        new_instance_ref,
        Some(cls),
        vec![],
        Some(o),
    );
    program.set_body(
        main_m,
        vec![
            Stmt::AssignLiteral {
                lhs: y,
                literal: Literal::Str("C".to_string()),
            },
            Stmt::Invoke(for_name_call),
            Stmt::Invoke(new_instance_call),
        ],
    );
    program.add_entry_point(main_m);

    let result = solve_with_reflection(program);
    let objs = result.points_to(o);
    assert_eq!(objs.len(), 1);
    let obj = *objs.iter().next().unwrap();
    assert!(result.heap().is_mock(obj, REFLECTIVE_ALLOC_DESC));
    assert_eq!(result.heap().obj_ty(obj), c_class);
    assert!(result.unsound_invokes().is_empty());
}
