// check whether a Module is valid:
//
// - no two functions share a name.
// - declarations have no blocks (this holds by construction) and definitions
//   have at least one.
// - block labels and local names are unique inside a function.
// - every successor names a block of the same function.
// - joins only appear at the start of a block, and have exactly one incoming
//   value for every predecessor of their block and nothing else.
// - every operand refers to something that exists: a function of the module,
//   a named instruction result or a parameter of the enclosing function.
// - direct calls to defined functions pass as many arguments as the callee
//   has parameters.  calls to declarations are not checked, since those may be
//   variadic.
// - `ret` carries a value exactly when the function does not return void.
//
// all violations are collected, rather than stopping at the first one.

use super::*;
use crate::commons::Valid;
use crate::middle_end::analysis::Cfg;

use std::collections::BTreeSet as Set;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationError(pub Vec<String>);

impl ValidationError {
    fn new() -> Self {
        ValidationError(vec![])
    }

    fn push(&mut self, func: &FuncId, msg: String) {
        self.0.push(format!("in function {func}: {msg}"));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl Module {
    pub fn check_valid(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();

        let mut seen = Set::new();
        for f in &self.functions {
            if !seen.insert(f.id.clone()) {
                errors.push(&f.id, "function defined more than once".to_string());
            }
        }

        for f in self.functions.iter().filter(|f| !f.is_declaration()) {
            check_function(self, f, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn validate(self) -> Result<Valid<Module>, ValidationError> {
        self.check_valid()?;
        Ok(Valid(self))
    }
}

fn check_function(module: &Module, f: &Function, errors: &mut ValidationError) {
    let cfg = Cfg::new(f);

    let mut labels = Set::new();
    for bb in &f.blocks {
        if !labels.insert(bb.id.clone()) {
            errors.push(&f.id, format!("block {} defined more than once", bb.id));
        }
    }

    let mut locals = f.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
    locals.extend(f.blocks.iter().flat_map(|bb| bb.insts.iter().filter_map(|i| i.result.clone())));
    let mut seen = Set::new();
    for name in locals {
        if !seen.insert(name.clone()) {
            errors.push(&f.id, format!("local %{name} defined more than once"));
        }
    }

    for bb in &f.blocks {
        let mut past_joins = false;

        for (index, inst) in bb.insts.iter().enumerate() {
            let here = format!("{}.{index}", bb.id);

            for next in inst.kind.successors() {
                if !labels.contains(next) {
                    errors.push(&f.id, format!("{here}: branch to unknown block {next}"));
                }
            }

            for operand in inst.kind.operands() {
                if let Err(msg) = check_operand(module, f, operand) {
                    errors.push(&f.id, format!("{here}: {msg}"));
                }
            }

            match &inst.kind {
                Instruction::Join { incoming } => {
                    if past_joins {
                        errors.push(&f.id, format!("{here}: phi after a non-phi instruction"));
                    }
                    check_join(&cfg, &bb.id, incoming)
                        .into_iter()
                        .for_each(|msg| errors.push(&f.id, format!("{here}: {msg}")));
                }
                Instruction::Call { callee, args } => {
                    past_joins = true;
                    let target = callee.as_func().and_then(|c| module.function(c));
                    if let Some(target) = target.filter(|t| !t.is_declaration()) {
                        if target.params.len() != args.len() {
                            errors.push(
                                &f.id,
                                format!(
                                    "{here}: call to {} with {} arguments, expected {}",
                                    target.id,
                                    args.len(),
                                    target.params.len()
                                ),
                            );
                        }
                    }
                }
                Instruction::Return { value } => {
                    past_joins = true;
                    match (value, f.ret_ty) {
                        (Some(_), Type::Void) => {
                            errors.push(&f.id, format!("{here}: void function returns a value"))
                        }
                        (None, ty) if ty != Type::Void => {
                            errors.push(&f.id, format!("{here}: missing return value of type {ty}"))
                        }
                        _ => (),
                    }
                }
                Instruction::Other { .. } => past_joins = true,
            }
        }
    }
}

fn check_operand(module: &Module, f: &Function, operand: &Value) -> Result<(), String> {
    match operand {
        Value::Func(id) if module.function(id).is_none() => Err(format!("unknown function @{id}")),
        Value::Inst(id) => {
            if id.func != f.id {
                return Err(format!("use of {id} from another function"));
            }
            match f.block(&id.block).and_then(|bb| bb.insts.get(id.index)) {
                None => Err(format!("use of missing instruction {id}")),
                Some(inst) if inst.result.is_none() => Err(format!("use of unnamed instruction {id}")),
                Some(_) => Ok(()),
            }
        }
        Value::Param { func, index } => {
            if *func != f.id {
                Err(format!("use of a parameter of {func}"))
            } else if *index >= f.params.len() {
                Err(format!("use of missing parameter {index}"))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

fn check_join(cfg: &Cfg, block: &BbId, incoming: &[(BbId, Value)]) -> Vec<String> {
    let mut msgs = vec![];
    let preds = cfg.pred(block).collect::<Set<_>>();

    let mut seen = Set::new();
    for (bb, _) in incoming {
        if !seen.insert(bb) {
            msgs.push(format!("phi has two incoming values for {bb}"));
        } else if !preds.contains(bb) {
            msgs.push(format!("phi has an incoming value for {bb}, which is not a predecessor"));
        }
    }

    for pred in preds {
        if !seen.contains(pred) {
            msgs.push(format!("phi has no incoming value for predecessor {pred}"));
        }
    }

    msgs
}
