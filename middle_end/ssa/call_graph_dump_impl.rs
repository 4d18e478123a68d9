//! Implementation for generating a graphviz file for the call graph.

use super::*;

/// One call from `caller` that may reach `callee`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: FuncId,
    pub callee: FuncId,
    pub line: Option<u32>,
    // false for targets found by resolving an indirect call.
    pub direct: bool,
}

pub fn dump_call_graph(module: &Module, edges: &[CallEdge]) -> String {
    let mut node_str = String::new();
    let mut edge_str = String::new();

    let module_name = module.name.as_deref().unwrap_or("module");

    for f in &module.functions {
        let shape = if f.is_declaration() { "ellipse" } else { "box" };
        node_str.push_str(&format!(
            r#"
"{}" [label = "{}" shape={shape}];
"#,
            f.id,
            f.display_name()
        ));
    }

    for edge in edges {
        let edge_style = if edge.direct {
            "color=black"
        } else {
            "color=blue style=dashed"
        };
        let label = edge.line.map(|l| l.to_string()).unwrap_or_default();
        edge_str.push_str(&format!(
            r#"
"{}" -> "{}" [label = "{label}" {edge_style}];
"#,
            edge.caller, edge.callee
        ));
    }

    format!(
        r#"digraph G {{
label = "{module_name}";
{node_str}
{edge_str}
}}
"#
    )
}
