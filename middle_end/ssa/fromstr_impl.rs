use super::*;

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use derive_more::Display;
use pest::iterators::Pair;
use pest::Parser;

#[derive(pest_derive::Parser)]
#[grammar_inline = r#"
WHITESPACE = _{ " " | "\t" }
COMMENT = _{ ";" ~ (!NEWLINE ~ ANY)* }

module = { SOI ~ NEWLINE* ~ module_name? ~ (function ~ NEWLINE*)* ~ EOI }
module_name = { "module" ~ string ~ NEWLINE+ }

function = _{ declare | define }
declare = { "declare" ~ ty ~ global ~ "(" ~ ty_list? ~ ")" ~ debug_name? }
define = { "define" ~ ty ~ global ~ "(" ~ params? ~ ")" ~ debug_name? ~ "{" ~ NEWLINE+ ~ block+ ~ "}" }
ty_list = { ty ~ ("," ~ ty)* }
params = { param ~ ("," ~ param)* }
param = { ty ~ local }
debug_name = { "!name" ~ string }

block = { label ~ ":" ~ NEWLINE+ ~ (inst ~ NEWLINE+)* }
inst = { result? ~ opcode ~ (call_target | incomings | operands)? ~ successors? ~ line_md? }
result = { local ~ "=" }
call_target = { operand ~ "(" ~ operands? ~ ")" }
incomings = { incoming ~ ("," ~ incoming)* }
incoming = { "[" ~ operand ~ "," ~ label ~ "]" }
operands = { operand ~ ("," ~ operand)* }
successors = { "to" ~ label ~ ("," ~ label)* }
line_md = { "!line" ~ number }

operand = _{ global | local | null | undef | int }
global = @{ "@" ~ name }
local = @{ "%" ~ name }
null = { "null" }
undef = { "undef" }
int = @{ "-"? ~ ASCII_DIGIT+ }

label = @{ name }
opcode = @{ ASCII_ALPHA ~ (ASCII_ALPHANUMERIC | "_" | ".")* }
name = @{ (ASCII_ALPHANUMERIC | "_" | "." | "$")+ }
number = @{ ASCII_DIGIT+ }
ty = @{ "ptr" | "void" | "i" ~ ASCII_DIGIT+ }
string = @{ "\"" ~ (!"\"" ~ ANY)* ~ "\"" }
"#]
struct SsaParser;

// A parse error with explanatory message.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub struct ParseError(pub String);
impl std::error::Error for ParseError {}

impl std::str::FromStr for Module {
    type Err = ParseError;

    fn from_str(module_str: &str) -> Result<Self, Self::Err> {
        match SsaParser::parse(Rule::module, module_str) {
            Ok(mut parse_tree) => match parse_tree.next() {
                Some(module) => create_module(module),
                None => Err(ParseError("empty parse tree".to_string())),
            },
            Err(err) => Err(ParseError(format!("parse error: {err}"))),
        }
    }
}

// constructs an error pointing at the start of `pair`.
fn error_at<T>(pair: &Pair<Rule>, msg: &str) -> Result<T, ParseError> {
    let (row, col) = pair.as_span().start_pos().line_col();
    Err(ParseError(format!(
        "error in line {row}, column {col}: {msg}\n{}",
        pair.as_str().lines().next().unwrap_or_default()
    )))
}

fn create_module(module: Pair<Rule>) -> Result<Module, ParseError> {
    let mut name = None;
    let mut definitions = vec![];

    for item in module.into_inner() {
        match item.as_rule() {
            Rule::module_name => {
                name = item.into_inner().next().map(|s| unquote(s.as_str()));
            }
            Rule::declare | Rule::define => definitions.push(item),
            Rule::EOI => (),
            _ => unreachable!("not a module item: {:#?}", item),
        }
    }

    // Function references may point forward, so collect every name first.
    let known_functions = definitions
        .iter()
        .filter_map(|def| def.clone().into_inner().nth(1))
        .map(|global| func_id(&global.as_str()[1..]))
        .collect::<Set<FuncId>>();

    let functions = definitions
        .into_iter()
        .map(|def| match def.as_rule() {
            Rule::declare => create_declaration(def),
            _ => create_definition(def, &known_functions),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Module { name, functions })
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

fn parse_type(ty: &Pair<Rule>) -> Result<Type, ParseError> {
    match ty.as_str() {
        "ptr" => Ok(Type::Ptr),
        "void" => Ok(Type::Void),
        int => match int[1..].parse::<u32>() {
            Ok(bits) => Ok(Type::Int(bits)),
            Err(_) => error_at(ty, "integer type width out of range"),
        },
    }
}

fn create_declaration(def: Pair<Rule>) -> Result<Function, ParseError> {
    let mut inner = def.into_inner();
    let (Some(ret), Some(global)) = (inner.next(), inner.next()) else {
        unreachable!("declaration without a signature")
    };

    let mut params = vec![];
    let mut debug_name = None;
    for item in inner {
        match item.as_rule() {
            Rule::ty_list => {
                for (i, ty) in item.into_inner().enumerate() {
                    params.push(Param {
                        name: var_id(&i.to_string()),
                        ty: parse_type(&ty)?,
                    });
                }
            }
            Rule::debug_name => debug_name = item.into_inner().next().map(|s| unquote(s.as_str())),
            _ => unreachable!("not part of a declaration: {:#?}", item),
        }
    }

    Ok(Function {
        id: func_id(&global.as_str()[1..]),
        debug_name,
        ret_ty: parse_type(&ret)?,
        params,
        blocks: vec![],
    })
}

// Local names visible inside one function body.
struct Scope<'a> {
    func: FuncId,
    params: Map<VarId, usize>,
    results: Map<VarId, InstId>,
    functions: &'a Set<FuncId>,
}

impl Scope<'_> {
    fn declare(&mut self, name: &Pair<Rule>, id: InstId) -> Result<(), ParseError> {
        let var = var_id(&name.as_str()[1..]);
        if self.params.contains_key(&var) || self.results.insert(var, id).is_some() {
            return error_at(name, "local defined more than once");
        }
        Ok(())
    }

    fn operand(&self, pair: Pair<Rule>) -> Result<Value, ParseError> {
        match pair.as_rule() {
            Rule::global => {
                let f = func_id(&pair.as_str()[1..]);
                if !self.functions.contains(&f) {
                    return error_at(&pair, "reference to an unknown function");
                }
                Ok(Value::Func(f))
            }
            Rule::local => {
                let var = var_id(&pair.as_str()[1..]);
                if let Some(&index) = self.params.get(&var) {
                    Ok(Value::Param {
                        func: self.func.clone(),
                        index,
                    })
                } else if let Some(id) = self.results.get(&var) {
                    Ok(Value::Inst(id.clone()))
                } else {
                    error_at(&pair, "use of an undefined local")
                }
            }
            Rule::null => Ok(Value::Const(Constant::Null)),
            Rule::undef => Ok(Value::Const(Constant::Undef)),
            Rule::int => match pair.as_str().parse::<i64>() {
                Ok(n) => Ok(Value::Const(Constant::Int(n))),
                Err(_) => error_at(&pair, "integer constant out of range"),
            },
            _ => unreachable!("not an operand: {:#?}", pair),
        }
    }

    fn operands(&self, pair: Pair<Rule>) -> Result<Vec<Value>, ParseError> {
        pair.into_inner().map(|op| self.operand(op)).collect()
    }
}

fn create_definition(def: Pair<Rule>, functions: &Set<FuncId>) -> Result<Function, ParseError> {
    let mut inner = def.into_inner();
    let (Some(ret), Some(global)) = (inner.next(), inner.next()) else {
        unreachable!("definition without a signature")
    };
    let id = func_id(&global.as_str()[1..]);

    let mut params = vec![];
    let mut debug_name = None;
    let mut block_pairs = vec![];
    for item in inner {
        match item.as_rule() {
            Rule::params => {
                for param in item.into_inner() {
                    let mut p = param.into_inner();
                    let (Some(ty), Some(local)) = (p.next(), p.next()) else {
                        unreachable!("parameter without a name")
                    };
                    params.push((ty, local));
                }
            }
            Rule::debug_name => debug_name = item.into_inner().next().map(|s| unquote(s.as_str())),
            Rule::block => block_pairs.push(item),
            _ => unreachable!("not part of a definition: {:#?}", item),
        }
    }

    let mut scope = Scope {
        func: id.clone(),
        params: Map::new(),
        results: Map::new(),
        functions,
    };

    let mut typed_params = vec![];
    for (index, (ty, local)) in params.into_iter().enumerate() {
        let name = var_id(&local.as_str()[1..]);
        if scope.params.insert(name.clone(), index).is_some() {
            return error_at(&local, "duplicate parameter name");
        }
        typed_params.push(Param {
            name,
            ty: parse_type(&ty)?,
        });
    }

    // First pass: bind every result name, since phis may use values defined
    // later in the body.
    for block in &block_pairs {
        let mut items = block.clone().into_inner();
        let Some(label) = items.next() else {
            unreachable!("block without a label")
        };
        for (index, inst) in items.enumerate() {
            if let Some(result) = inst.into_inner().next().filter(|p| p.as_rule() == Rule::result) {
                if let Some(local) = result.into_inner().next() {
                    let inst_id = InstId {
                        func: id.clone(),
                        block: bb_id(label.as_str()),
                        index,
                    };
                    scope.declare(&local, inst_id)?;
                }
            }
        }
    }

    let mut blocks = vec![];
    for block in block_pairs {
        let mut items = block.into_inner();
        let Some(label) = items.next() else {
            unreachable!("block without a label")
        };
        let insts = items
            .map(|inst| create_inst(inst, &scope))
            .collect::<Result<Vec<_>, _>>()?;
        blocks.push(BasicBlock {
            id: bb_id(label.as_str()),
            insts,
        });
    }

    Ok(Function {
        id,
        debug_name,
        ret_ty: parse_type(&ret)?,
        params: typed_params,
        blocks,
    })
}

fn create_inst(inst: Pair<Rule>, scope: &Scope) -> Result<Inst, ParseError> {
    let whole = inst.clone();

    let mut result = None;
    let mut opcode = None;
    let mut call_target = None;
    let mut incoming = None;
    let mut operands = None;
    let mut successors = vec![];
    let mut line = None;

    for item in inst.into_inner() {
        match item.as_rule() {
            Rule::result => {
                result = item.into_inner().next().map(|l| var_id(&l.as_str()[1..]));
            }
            Rule::opcode => opcode = Some(item.as_str().to_string()),
            Rule::call_target => call_target = Some(item),
            Rule::incomings => incoming = Some(item),
            Rule::operands => operands = Some(scope.operands(item)?),
            Rule::successors => successors = item.into_inner().map(|l| bb_id(l.as_str())).collect(),
            Rule::line_md => {
                let Some(number) = item.clone().into_inner().next() else {
                    unreachable!("line metadata without a number")
                };
                match number.as_str().parse::<u32>() {
                    Ok(n) => line = Some(n),
                    Err(_) => return error_at(&item, "line number out of range"),
                }
            }
            _ => unreachable!("not part of an instruction: {:#?}", item),
        }
    }

    let opcode = opcode.unwrap_or_default();
    let control_flow = !successors.is_empty();

    let kind = match opcode.as_str() {
        "call" => {
            let Some(target) = call_target else {
                return error_at(&whole, "`call` needs a callee and an argument list");
            };
            if control_flow {
                return error_at(&whole, "`call` cannot have successors");
            }
            let mut target = target.into_inner();
            let Some(callee) = target.next() else {
                unreachable!("call without a callee")
            };
            let callee = scope.operand(callee)?;
            let args = match target.next() {
                Some(args) => scope.operands(args)?,
                None => vec![],
            };
            Instruction::Call { callee, args }
        }
        "ret" => {
            let mut values = operands.unwrap_or_default();
            if call_target.is_some() || incoming.is_some() || control_flow || values.len() > 1 {
                return error_at(&whole, "`ret` takes at most one operand");
            }
            if result.is_some() {
                return error_at(&whole, "`ret` does not produce a value");
            }
            Instruction::Return { value: values.pop() }
        }
        "phi" => {
            let Some(incoming) = incoming else {
                return error_at(&whole, "`phi` needs at least one [value, label] pair");
            };
            if control_flow {
                return error_at(&whole, "`phi` cannot have successors");
            }
            let incoming = incoming
                .into_inner()
                .map(|pair| {
                    let mut pair = pair.into_inner();
                    let (Some(value), Some(label)) = (pair.next(), pair.next()) else {
                        unreachable!("incoming pair without a label")
                    };
                    Ok((bb_id(label.as_str()), scope.operand(value)?))
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            Instruction::Join { incoming }
        }
        _ => {
            if call_target.is_some() || incoming.is_some() {
                return error_at(&whole, "only `call` and `phi` take this operand syntax");
            }
            Instruction::Other {
                opcode,
                operands: operands.unwrap_or_default(),
                successors,
            }
        }
    };

    Ok(Inst { result, kind, line })
}
