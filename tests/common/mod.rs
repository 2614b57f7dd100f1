// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use taintflow::ir::{Program, TypeId};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A program seeded with the root object class and a value class `V`.
pub fn base_program() -> (Program, TypeId, TypeId) {
    let mut program = Program::new();
    let object = program.add_class("java.lang.Object", None);
    let v = program.add_class("V", Some(object));
    (program, object, v)
}
