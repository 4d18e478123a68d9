//! Argument-forwarding map.
//!
//! A pointer-returning function "forwards" parameter `i` when it returns that
//! parameter unchanged.  Only the first such return in block order is
//! considered; a function whose return paths disagree is still mapped to the
//! first one found.

use tracing::trace;

use super::*;

/// Function -> index of the parameter its first matching return forwards.
/// Built once per module and never changed afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardingMap(Map<FuncId, usize>);

impl ForwardingMap {
    pub fn build(module: &Valid<Module>) -> Self {
        let mut map = Map::new();

        for f in module.0.functions.iter().filter(|f| f.returns_ptr()) {
            if let Some(index) = forwarded_param(f) {
                trace!(function = %f.id, index, "return forwards a parameter");
                map.insert(f.id.clone(), index);
            }
        }

        ForwardingMap(map)
    }

    pub fn get(&self, f: &FuncId) -> Option<usize> {
        self.0.get(f).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// The parameter index of the first `ret %param` in `f`.
fn forwarded_param(f: &Function) -> Option<usize> {
    f.insts().find_map(|(_, inst)| match &inst.kind {
        Instruction::Return {
            value: Some(Value::Param { func, index }),
        } if *func == f.id => Some(*index),
        _ => None,
    })
}
