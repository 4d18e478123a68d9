use pretty_assertions::assert_eq;

use super::*;
use crate::middle_end::analysis::call_targets::ResolveStats;
use crate::middle_end::optimization::devirtualize::{devirtualize, CallKind};
use crate::middle_end::ssa::*;

fn site(func: &str, block: &str, index: usize) -> InstId {
    InstId {
        func: func_id(func),
        block: bb_id(block),
        index,
    }
}

fn valid(text: &str) -> Valid<Module> {
    text.parse::<Module>().unwrap().validate().unwrap()
}

// SECTION: whole files

#[test]
fn apply_file() {
    run_test("apply");
}

#[test]
fn dispatch_file() {
    run_test("dispatch");
}

// SECTION: driver properties

#[test]
fn direct_sites_skip_the_resolver() {
    let module = read_module("dispatch");
    let report = analyze(&module, &DriverOptions::default());

    let direct = report
        .sites
        .iter()
        .filter(|s| s.kind == CallKind::Direct)
        .collect::<Vec<_>>();
    assert_eq!(direct.len(), 3);

    for s in direct {
        let callee = module.0.inst(&s.site).and_then(|i| i.kind.static_callee()).unwrap();
        assert_eq!(s.targets.single(), Some(callee));
        assert_eq!(s.names, vec![callee.name().to_string()]);
        assert_eq!(s.stats, ResolveStats::default());
        assert_eq!(s.rewrite, None);
    }
}

#[test]
fn debug_intrinsics_are_not_reported() {
    let module = read_module("apply");
    let report = analyze(&module, &DriverOptions::default());

    assert!(report.site(&site("apply", "entry", 0)).is_none());
    assert_eq!(report.sites.len(), 5);
}

#[test]
fn two_candidates_are_not_rewritten() {
    let module = read_module("apply");
    let report = analyze(&module, &DriverOptions::default());

    let fp = report.site(&site("apply", "entry", 1)).unwrap();
    assert_eq!(fp.kind, CallKind::Indirect);
    assert_eq!(fp.names, vec!["foo", "bar"]);
    assert_eq!(fp.line, Some(3));
    assert_eq!(fp.rewrite, None);
    assert_eq!(fp.to_string(), "3 : foo, bar");

    let cb = report.site(&site("once", "entry", 0)).unwrap();
    assert_eq!(cb.rewrite, Some(func_id("bar")));
    assert_eq!(report.rewrites().count(), 1);
}

#[test]
fn rewrite_is_stable() {
    let module = read_module("apply");
    let first = analyze(&module, &DriverOptions::default());
    let rewritten = apply(module, &first).unwrap();

    // the rewritten site is now direct and still names the same function.
    let second = analyze(&rewritten, &DriverOptions::default());
    let cb = second.site(&site("once", "entry", 0)).unwrap();
    assert_eq!(cb.kind, CallKind::Direct);
    assert_eq!(cb.to_string(), "6 : bar");
    assert_eq!(second.to_string(), first.to_string());
    assert_eq!(second.rewrites().count(), 0);

    let again = apply(rewritten.clone(), &second).unwrap();
    assert_eq!(again, rewritten);
}

#[test]
fn rewrites_can_be_disabled() {
    let module = read_module("dispatch");
    let options = DriverOptions {
        rewrite: false,
        ..DriverOptions::default()
    };
    let report = analyze(&module, &options);

    assert_eq!(report.rewrites().count(), 0);
    assert_eq!(report.to_string(), read("test-data/dispatch.report"));
    assert_eq!(apply(module.clone(), &report).unwrap(), module);
}

#[test]
fn argument_count_mismatch_blocks_rewrite() {
    let module = valid(
        r#"
    define void @two(ptr %a, ptr %b) {
    entry:
      ret
    }

    declare void @ext(ptr)

    define void @apply(ptr %fp) {
    entry:
      call %fp() !line 3
      ret
    }

    define void @apply_ext(ptr %fp) {
    entry:
      call %fp() !line 8
      ret
    }

    define void @main() {
    entry:
      call @apply(@two)
      call @apply_ext(@ext)
      ret
    }
    "#,
    );
    let report = analyze(&module, &DriverOptions::default());

    let defined = report.site(&site("apply", "entry", 0)).unwrap();
    assert_eq!(defined.to_string(), "3 : two");
    assert_eq!(defined.rewrite, None);

    // declarations may be variadic, so their arity is not held against them.
    let declared = report.site(&site("apply_ext", "entry", 0)).unwrap();
    assert_eq!(declared.to_string(), "8 : ext");
    assert_eq!(declared.rewrite, Some(func_id("ext")));
}

#[test]
fn devirtualize_is_analyze_then_apply() {
    let expected = read("test-data/dispatch.devirt.ssa");
    let output = devirtualize(read_module("dispatch")).unwrap();
    assert_eq!(output.0.to_string(), expected);
}

// SECTION: report surfaces

#[test]
fn json_report() {
    let module = read_module("apply");
    let report = analyze(&module, &DriverOptions::default());
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    let sites = json["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 5);

    let fp = &sites[0];
    assert_eq!(fp["site"]["func"], "apply");
    assert_eq!(fp["site"]["block"], "entry");
    assert_eq!(fp["site"]["index"], 1);
    assert_eq!(fp["line"], 3);
    assert_eq!(fp["kind"], "indirect");
    assert_eq!(fp["names"], serde_json::json!(["foo", "bar"]));
    assert_eq!(fp["partial"], false);
    assert_eq!(fp["rewrite"], serde_json::Value::Null);

    assert_eq!(sites[1]["rewrite"], "bar");
    assert_eq!(sites[2]["kind"], "direct");
}

#[test]
fn call_graph_dump() {
    let module = read_module("apply");
    let report = analyze(&module, &DriverOptions::default());
    let dot = dump_call_graph(&module.0, &report.call_edges());

    assert!(dot.starts_with("digraph G {\nlabel = \"apply\";\n"), "{dot}");
    assert!(dot.contains(r#""llvm.dbg.value" [label = "llvm.dbg.value" shape=ellipse];"#));
    assert!(dot.contains(r#""apply" [label = "apply" shape=box];"#));
    assert!(dot.contains(r#""apply" -> "foo" [label = "3" color=blue style=dashed];"#));
    assert!(dot.contains(r#""apply" -> "bar" [label = "3" color=blue style=dashed];"#));
    assert!(dot.contains(r#""main" -> "apply" [label = "10" color=black];"#));
    // debug intrinsics are not calls of interest.
    assert!(!dot.contains(r#"-> "llvm.dbg.value""#));
    assert_eq!(report.call_edges().len(), 6);
}
