//! Call graph analysis without resolving indirect calls.
//!
//! Only calls whose callee is a direct function reference create edges.  The
//! resolver uses the reverse direction to push a parameter back to every
//! argument passed for it.

use super::*;

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    // callee -> call sites naming it directly, in module order.
    callers: Map<FuncId, Vec<InstId>>,
}

impl CallGraph {
    pub fn new(module: &Module) -> Self {
        let mut callers: Map<FuncId, Vec<InstId>> = Map::new();

        for (id, inst) in module.insts() {
            if let Some(callee) = inst.kind.static_callee() {
                callers.entry(callee.clone()).or_default().push(id);
            }
        }

        CallGraph { callers }
    }

    pub fn callers_of(&self, f: &FuncId) -> &[InstId] {
        self.callers.get(f).map(Vec::as_slice).unwrap_or(&[])
    }
}
