//! The SSA module representation.
//!
//! A [Module] is an ordered list of [Function]s.  Functions own ordered basic
//! blocks, blocks own ordered instructions.  Operands are [Value]s, which refer
//! to functions, instruction results and formal parameters by identity rather
//! than by name, so that the analyses can follow def-use chains directly.
//!
//! The text format accepted by `str::parse::<Module>()` and produced by
//! `Display` looks like this:
//!
//! ```text
//! define ptr @pick(ptr %a, ptr %b) {
//! entry:
//!   ret %b
//! }
//!
//! define i32 @main() {
//! entry:
//!   %f = call @pick(@foo, @bar) !line 7
//!   %r = call %f() !line 8
//!   ret 0
//! }
//! ```

use std::cmp::Ordering;
use std::fmt;

use hashconsing::{consign, HConsed, HashConsign};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

mod call_graph_dump_impl;
mod display_impl;
mod fromstr_impl;
mod validate;

pub use call_graph_dump_impl::{dump_call_graph, CallEdge};
pub use fromstr_impl::ParseError;
pub use validate::ValidationError;

#[cfg(test)]
mod tests;

// SECTION: names

consign! {
    /// Factory for every name appearing in a module.
    let NAMES = consign(128) for String ;
}

// Interned names.  Equality and hashing go through the hash-consed handle;
// ordering goes through the text so that ordered containers are stable
// across runs.
macro_rules! interned_name {
    ($(#[$meta:meta])* $id:ident, $ctor:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $id(HConsed<String>);

        pub fn $ctor(name: &str) -> $id {
            $id(NAMES.mk(name.to_string()))
        }

        impl $id {
            pub fn name(&self) -> &str {
                self.0.as_str()
            }
        }

        impl PartialOrd for $id {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $id {
            fn cmp(&self, other: &Self) -> Ordering {
                self.name().cmp(other.name())
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl fmt::Debug for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl Serialize for $id {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $id {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer).map(|s| $ctor(&s))
            }
        }
    };
}

interned_name!(
    /// Name of a function, without the leading `@`.
    FuncId,
    func_id
);
interned_name!(
    /// Label of a basic block.
    BbId,
    bb_id
);
interned_name!(
    /// Name of a parameter or an instruction result, without the leading `%`.
    VarId,
    var_id
);

// SECTION: module structure

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Ptr,
    Int(u32),
    Void,
}

impl Type {
    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: Option<String>,
    pub functions: Vec<Function>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FuncId,
    // The source-level name from debug info, if any.
    pub debug_name: Option<String>,
    pub ret_ty: Type,
    pub params: Vec<Param>,
    // Empty for declarations.  The first block is the entry block.
    pub blocks: Vec<BasicBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: VarId,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BbId,
    pub insts: Vec<Inst>,
}

/// An instruction together with its result name and source line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub result: Option<VarId>,
    pub kind: Instruction,
    pub line: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Call {
        callee: Value,
        args: Vec<Value>,
    },
    Return {
        value: Option<Value>,
    },
    // A phi node: one incoming value per predecessor block.
    Join {
        incoming: Vec<(BbId, Value)>,
    },
    // Everything the analysis does not look into.  Branches are `Other`
    // instructions with successors.
    Other {
        opcode: String,
        operands: Vec<Value>,
        successors: Vec<BbId>,
    },
}

/// Position of an instruction in a module.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstId {
    pub func: FuncId,
    pub block: BbId,
    pub index: usize,
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.func, self.block, self.index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    // A direct reference to a function.
    Func(FuncId),
    // The result of an instruction.
    Inst(InstId),
    // Formal parameter `index` of `func`.
    Param { func: FuncId, index: usize },
    Const(Constant),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Undef,
    Int(i64),
}

impl Value {
    pub fn as_func(&self) -> Option<&FuncId> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    // Constants have no identity to report; everything else does.
    pub fn is_named(&self) -> bool {
        !matches!(self, Value::Const(_))
    }
}

// SECTION: accessors

impl Module {
    pub fn function(&self, id: &FuncId) -> Option<&Function> {
        self.functions.iter().find(|f| &f.id == id)
    }

    fn function_mut(&mut self, id: &FuncId) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| &f.id == id)
    }

    pub fn inst(&self, id: &InstId) -> Option<&Inst> {
        self.function(&id.func)?.block(&id.block)?.insts.get(id.index)
    }

    /// All instructions of the module in order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> {
        self.functions.iter().flat_map(|f| f.insts())
    }

    /// Point the call at `site` to `callee`.
    pub fn set_callee(&mut self, site: &InstId, callee: FuncId) -> Result<(), Error> {
        let inst = self
            .function_mut(&site.func)
            .and_then(|f| f.blocks.iter_mut().find(|b| b.id == site.block))
            .and_then(|b| b.insts.get_mut(site.index))
            .ok_or_else(|| Error::NotACall(site.to_string()))?;

        match &mut inst.kind {
            Instruction::Call { callee: c, .. } => {
                *c = Value::Func(callee);
                Ok(())
            }
            _ => Err(Error::NotACall(site.to_string())),
        }
    }
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn returns_ptr(&self) -> bool {
        self.ret_ty.is_ptr()
    }

    // The name to show in reports: the debug name if the module has one.
    pub fn display_name(&self) -> &str {
        self.debug_name.as_deref().unwrap_or(self.id.name())
    }

    // Debug-info pseudo functions (`llvm.dbg.value` and friends).
    pub fn is_debug_intrinsic(&self) -> bool {
        self.id.name().starts_with("llvm.dbg.")
    }

    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: &BbId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> {
        self.blocks.iter().flat_map(move |b| {
            b.insts.iter().enumerate().map(move |(index, inst)| {
                (
                    InstId {
                        func: self.id.clone(),
                        block: b.id.clone(),
                        index,
                    },
                    inst,
                )
            })
        })
    }
}

impl Instruction {
    /// The callee of a direct call.
    pub fn static_callee(&self) -> Option<&FuncId> {
        match self {
            Instruction::Call { callee, .. } => callee.as_func(),
            _ => None,
        }
    }

    pub fn successors(&self) -> &[BbId] {
        match self {
            Instruction::Other { successors, .. } => successors,
            _ => &[],
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Call { callee, args } => std::iter::once(callee).chain(args).collect(),
            Instruction::Return { value } => value.iter().collect(),
            Instruction::Join { incoming } => incoming.iter().map(|(_, v)| v).collect(),
            Instruction::Other { operands, .. } => operands.iter().collect(),
        }
    }
}
