// Parsing, printing and validation of SSA modules.

use pretty_assertions::assert_eq;

use super::*;
use crate::error::Error;

// The exact text the printer produces for this module, so parsing and printing
// it again must give it back unchanged.
const PRINTED: &str = r#"module "demo"

declare void @llvm.dbg.value(ptr)

declare ptr @ext(ptr, i32) !name "external"

define ptr @pick(ptr %a, ptr %b, i1 %c) !name "pick_one" {
entry:
  br %c to left, right
left:
  ret %a
right:
  ret %b
}

define i32 @main() {
entry:
  %f = call @pick(@ext, @main, 1) !line 7
  br to next
next:
  %g = phi [%f, entry] !line 8
  %r = call %g(null, undef, -3) !line 9
  ret 0
}
"#;

fn parse(text: &str) -> Module {
    text.parse::<Module>().unwrap()
}

fn parse_err(text: &str) -> String {
    text.parse::<Module>().unwrap_err().0
}

fn validation_errors(text: &str) -> Vec<String> {
    parse(text).validate().unwrap_err().0
}

fn main_inst(index: usize, block: &str) -> InstId {
    InstId {
        func: func_id("main"),
        block: bb_id(block),
        index,
    }
}

// SECTION: parser and printer

#[test]
fn print_after_parse_is_identity() {
    let module = parse(PRINTED);
    assert_eq!(module.to_string(), PRINTED);
    assert_eq!(parse(&module.to_string()), module);
}

#[test]
fn parse_builds_signatures() {
    let module = parse(PRINTED);

    assert_eq!(module.name.as_deref(), Some("demo"));
    assert_eq!(module.functions.len(), 4);

    let ext = module.function(&func_id("ext")).unwrap();
    assert!(ext.is_declaration());
    assert!(ext.returns_ptr());
    assert_eq!(ext.display_name(), "external");
    assert_eq!(
        ext.params.iter().map(|p| p.ty).collect::<Vec<_>>(),
        vec![Type::Ptr, Type::Int(32)]
    );

    let dbg = module.function(&func_id("llvm.dbg.value")).unwrap();
    assert!(dbg.is_debug_intrinsic());
    assert!(!ext.is_debug_intrinsic());

    let main = module.function(&func_id("main")).unwrap();
    assert_eq!(main.display_name(), "main");
    assert_eq!(main.ret_ty, Type::Int(32));
    assert_eq!(main.entry().map(|b| b.id.clone()), Some(bb_id("entry")));
}

#[test]
fn parse_resolves_operands() {
    let module = parse(PRINTED);

    let first = module.inst(&main_inst(0, "entry")).unwrap();
    assert_eq!(first.line, Some(7));
    assert_eq!(
        first.kind,
        Instruction::Call {
            callee: Value::Func(func_id("pick")),
            args: vec![
                Value::Func(func_id("ext")),
                Value::Func(func_id("main")),
                Value::Const(Constant::Int(1)),
            ],
        }
    );

    let join = module.inst(&main_inst(0, "next")).unwrap();
    assert_eq!(
        join.kind,
        Instruction::Join {
            incoming: vec![(bb_id("entry"), Value::Inst(main_inst(0, "entry")))],
        }
    );

    let call = module.inst(&main_inst(1, "next")).unwrap();
    assert_eq!(
        call.kind,
        Instruction::Call {
            callee: Value::Inst(main_inst(0, "next")),
            args: vec![
                Value::Const(Constant::Null),
                Value::Const(Constant::Undef),
                Value::Const(Constant::Int(-3)),
            ],
        }
    );
    assert_eq!(call.kind.static_callee(), None);

    let pick = module.function(&func_id("pick")).unwrap();
    let ret = &pick.block(&bb_id("right")).unwrap().insts[0];
    assert_eq!(
        ret.kind,
        Instruction::Return {
            value: Some(Value::Param {
                func: func_id("pick"),
                index: 1
            })
        }
    );
}

#[test]
fn parse_accepts_forward_references_and_comments() {
    let module = parse(
        r#"
    ; a loop whose join uses a value defined later
    define ptr @loop(ptr %p) {
    entry:
      br to head
    head:
      %x = phi [%p, entry], [%y, head]   ; carried around the loop
      %y = call @loop(%x)
      br to head, done
    done:
      ret %y
    }
    "#,
    );

    let f = module.function(&func_id("loop")).unwrap();
    let head = f.block(&bb_id("head")).unwrap();
    assert_eq!(
        head.insts[0].kind,
        Instruction::Join {
            incoming: vec![
                (
                    bb_id("entry"),
                    Value::Param {
                        func: func_id("loop"),
                        index: 0
                    }
                ),
                (
                    bb_id("head"),
                    Value::Inst(InstId {
                        func: func_id("loop"),
                        block: bb_id("head"),
                        index: 1
                    })
                ),
            ],
        }
    );
    assert_eq!(head.insts[2].kind.successors(), &[bb_id("head"), bb_id("done")]);
    assert!(module.validate().is_ok());
}

#[test]
fn parse_rejects_undefined_local() {
    let err = parse_err(
        r#"
    define ptr @f() {
    entry:
      ret %nope
    }
    "#,
    );
    assert!(err.contains("use of an undefined local"), "{err}");
    assert!(err.contains("line 4"), "{err}");
}

#[test]
fn parse_rejects_unknown_function() {
    let err = parse_err(
        r#"
    define void @f() {
    entry:
      call @missing()
      ret
    }
    "#,
    );
    assert!(err.contains("reference to an unknown function"), "{err}");
}

#[test]
fn parse_rejects_duplicate_locals() {
    let err = parse_err(
        r#"
    define ptr @f(ptr %a) {
    entry:
      %a = call @f(%a)
      ret %a
    }
    "#,
    );
    assert!(err.contains("local defined more than once"), "{err}");
}

#[test]
fn parse_rejects_bad_syntax() {
    let err = parse_err("define ptr @f( {\n}\n");
    assert!(err.starts_with("parse error"), "{err}");

    let err = parse_err(
        r#"
    define void @f() {
    entry:
      ret 1, 2
    }
    "#,
    );
    assert!(err.contains("`ret` takes at most one operand"), "{err}");
}

// SECTION: validation

#[test]
fn valid_module_passes() {
    assert!(parse(PRINTED).validate().is_ok());
}

#[test]
fn unknown_branch_target() {
    let errors = validation_errors(
        r#"
    define void @f() {
    entry:
      br to nowhere
    }
    "#,
    );
    assert_eq!(errors, vec!["in function f: entry.0: branch to unknown block nowhere"]);
}

#[test]
fn join_must_match_predecessors() {
    let errors = validation_errors(
        r#"
    define void @foo() {
    entry:
      ret
    }

    define void @f(i1 %c) {
    entry:
      br %c to a, b
    a:
      br to join
    b:
      br to join
    join:
      %g = phi [@foo, a], [@foo, entry]
      call %g()
      ret
    }
    "#,
    );
    assert_eq!(
        errors,
        vec![
            "in function f: join.0: phi has an incoming value for entry, which is not a predecessor",
            "in function f: join.0: phi has no incoming value for predecessor b",
        ]
    );
}

#[test]
fn join_after_other_instructions() {
    let errors = validation_errors(
        r#"
    define void @foo() {
    entry:
      br to next
    next:
      call @foo()
      %g = phi [@foo, entry]
      ret
    }
    "#,
    );
    assert_eq!(errors, vec!["in function foo: next.1: phi after a non-phi instruction"]);
}

#[test]
fn direct_call_arity() {
    let errors = validation_errors(
        r#"
    declare i32 @printf(ptr)

    define ptr @pick(ptr %a, ptr %b) {
    entry:
      ret %a
    }

    define i32 @main() {
    entry:
      %f = call @pick(@main) !line 3
      call @printf(null, 1, 2)
      ret 0
    }
    "#,
    );
    assert_eq!(errors, vec!["in function main: entry.0: call to pick with 1 arguments, expected 2"]);
}

#[test]
fn return_values_follow_the_return_type() {
    let errors = validation_errors(
        r#"
    define void @f() {
    entry:
      ret 0
    }

    define ptr @g() {
    entry:
      ret
    }
    "#,
    );
    assert_eq!(
        errors,
        vec![
            "in function f: entry.0: void function returns a value",
            "in function g: entry.0: missing return value of type ptr",
        ]
    );
}

#[test]
fn duplicate_definitions() {
    let errors = validation_errors(
        r#"
    declare void @f()

    define void @f() {
    entry:
      ret
    a:
      ret
    a:
      ret
    }
    "#,
    );
    assert_eq!(
        errors,
        vec![
            "in function f: function defined more than once",
            "in function f: block a defined more than once",
        ]
    );
}

#[test]
fn validation_error_display() {
    let err = ValidationError(vec!["one".to_string(), "two".to_string()]);
    assert_eq!(err.to_string(), "one\ntwo\n");
}

// SECTION: serialization and mutation

#[test]
fn json_round_trip() {
    let module = parse(PRINTED);
    let json = serde_json::to_string(&module).unwrap();
    let back = serde_json::from_str::<Module>(&json).unwrap();
    assert_eq!(back, module);
    assert_eq!(back.to_string(), PRINTED);
}

#[test]
fn set_callee_rewrites_calls_only() {
    let mut module = parse(PRINTED);

    module.set_callee(&main_inst(1, "next"), func_id("ext")).unwrap();
    assert_eq!(
        module.inst(&main_inst(1, "next")).unwrap().kind.static_callee(),
        Some(&func_id("ext"))
    );

    let err = module.set_callee(&main_inst(2, "next"), func_id("ext")).unwrap_err();
    assert!(matches!(err, Error::NotACall(site) if site == "main.next.2"));

    let err = module.set_callee(&main_inst(9, "next"), func_id("ext")).unwrap_err();
    assert!(matches!(err, Error::NotACall(_)));
}

#[test]
fn module_insts_in_order() {
    let module = parse(PRINTED);
    let ids = module.insts().map(|(id, _)| id.to_string()).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "pick.entry.0",
            "pick.left.0",
            "pick.right.0",
            "main.entry.0",
            "main.entry.1",
            "main.next.0",
            "main.next.1",
            "main.next.2",
        ]
    );
}
