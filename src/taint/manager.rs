// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use crate::ir::TypeId;
use crate::pta::heap::{HeapModel, MockPayload, ObjId, TAINT_DESC};
use crate::taint::SourcePoint;

/// Mints and deduplicates taint objects.
///
/// Two taint objects are the same object exactly when their source points
/// and types are equal; the manager is idempotent over that pair.
#[derive(Clone, Default)]
pub struct TaintManager {
    taints: HashMap<(SourcePoint, TypeId), ObjId>,
    source_points: HashMap<ObjId, SourcePoint>,
}

impl TaintManager {
    pub fn new() -> Self {
        TaintManager {
            taints: HashMap::new(),
            source_points: HashMap::new(),
        }
    }

    pub fn make_taint(&mut self, heap: &mut HeapModel, source: SourcePoint, ty: TypeId) -> ObjId {
        if let Some(obj) = self.taints.get(&(source, ty)) {
            return *obj;
        }
        let obj = heap.get_mock(TAINT_DESC, source.payload(), ty);
        self.taints.insert((source, ty), obj);
        self.source_points.insert(obj, source);
        obj
    }

    pub fn is_taint(&self, obj: ObjId) -> bool {
        self.source_points.contains_key(&obj)
    }

    /// Defined only for objects the manager minted.
    pub fn source_point(&self, obj: ObjId) -> Option<SourcePoint> {
        self.source_points.get(&obj).copied()
    }

    pub fn taint_objs(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.source_points.keys().copied()
    }

    pub fn count(&self) -> usize {
        self.source_points.len()
    }
}

impl SourcePoint {
    pub(crate) fn payload(self) -> MockPayload {
        match self {
            SourcePoint::Call { invoke, index } => MockPayload::CallPoint { invoke, index },
            SourcePoint::Param { method, index } => MockPayload::ParamPoint { method, index },
        }
    }
}

#[cfg(test)]
mod test {
    use super::TaintManager;
    use crate::ir::{InvokeId, TypeId};
    use crate::pta::heap::HeapModel;
    use crate::taint::SourcePoint;

    #[test]
    fn taint_identity() {
        let mut heap = HeapModel::new();
        let mut manager = TaintManager::new();
        let sp = SourcePoint::Call {
            invoke: InvokeId(0),
            index: -2,
        };
        let t1 = manager.make_taint(&mut heap, sp, TypeId(0));
        let t2 = manager.make_taint(&mut heap, sp, TypeId(0));
        let t3 = manager.make_taint(&mut heap, sp, TypeId(1));
        assert_eq!(t1, t2);
        assert_ne!(t1, t3);
        assert!(manager.is_taint(t1));
        assert!(manager.is_taint(t3));
        assert_eq!(manager.source_point(t3), Some(sp));
        assert_eq!(manager.count(), 2);
    }
}
