//! Static analysis of SSA modules.

use std::collections::BTreeMap as Map;

use crate::commons::Valid;

use super::ssa::*;

pub mod call_graph;
pub mod call_targets;
pub mod forwarding;


/// The control-flow graph *for a function*, so that we can easily get the
/// successors and predecessors of a block.
///
/// Edges come from the successor lists of the block's instructions.
/// Predecessors are kept in the order the predecessor blocks appear in the
/// function, which is also the order joins are translated in.
#[derive(Clone, Debug)]
pub struct Cfg {
    pub entry: Option<BbId>,
    succ_edges: Map<BbId, Vec<BbId>>,
    pred_edges: Map<BbId, Vec<BbId>>,
}

impl Cfg {
    // construct a Cfg from the given function's basic blocks.
    pub fn new(function: &Function) -> Self {
        fn insert_edge(map: &mut Map<BbId, Vec<BbId>>, key_bbid: &BbId, value_bbid: &BbId) {
            let edges = map.entry(key_bbid.clone()).or_default();
            if !edges.contains(value_bbid) {
                edges.push(value_bbid.clone());
            }
        }

        let mut succ_edges: Map<BbId, Vec<BbId>> = Map::new();
        let mut pred_edges: Map<BbId, Vec<BbId>> = Map::new();

        for bb in &function.blocks {
            succ_edges.entry(bb.id.clone()).or_default();
            pred_edges.entry(bb.id.clone()).or_default();
        }

        for bb in &function.blocks {
            for inst in &bb.insts {
                for next_bb in inst.kind.successors() {
                    insert_edge(&mut succ_edges, &bb.id, next_bb);
                    insert_edge(&mut pred_edges, next_bb, &bb.id);
                }
            }
        }

        Cfg {
            entry: function.entry().map(|bb| bb.id.clone()),
            succ_edges,
            pred_edges,
        }
    }

    // an iterator over the successor edges of bb.
    pub fn succ(&self, bb: &BbId) -> impl Iterator<Item = &BbId> {
        self.succ_edges.get(bb).into_iter().flatten()
    }

    // an iterator over the predecessor edges of bb.
    pub fn pred(&self, bb: &BbId) -> impl Iterator<Item = &BbId> {
        self.pred_edges.get(bb).into_iter().flatten()
    }
}

/// Read-only lookup structures over a valid module: functions by name, the
/// CFG of every defined function, and the direct call graph.  This is what the
/// resolver consults; it never looks at the module any other way.
pub struct ModuleIndex<'m> {
    module: &'m Module,
    functions: Map<FuncId, &'m Function>,
    cfgs: Map<FuncId, Cfg>,
    call_graph: call_graph::CallGraph,
}

impl<'m> ModuleIndex<'m> {
    pub fn new(module: &'m Valid<Module>) -> Self {
        let module = &module.0;

        let functions = module
            .functions
            .iter()
            .map(|f| (f.id.clone(), f))
            .collect::<Map<_, _>>();

        let cfgs = module
            .functions
            .iter()
            .filter(|f| !f.is_declaration())
            .map(|f| (f.id.clone(), Cfg::new(f)))
            .collect();

        ModuleIndex {
            module,
            functions,
            cfgs,
            call_graph: call_graph::CallGraph::new(module),
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn function(&self, id: &FuncId) -> Option<&'m Function> {
        self.functions.get(id).copied()
    }

    pub fn inst(&self, id: &InstId) -> Option<&'m Inst> {
        self.function(&id.func)?.block(&id.block)?.insts.get(id.index)
    }

    pub fn cfg(&self, id: &FuncId) -> Option<&Cfg> {
        self.cfgs.get(id)
    }

    /// Call sites anywhere in the module whose statically known callee is `f`.
    pub fn callers_of(&self, f: &FuncId) -> &[InstId] {
        self.call_graph.callers_of(f)
    }

    /// The predecessors of the block defining `join`.
    pub fn join_preds(&self, join: &InstId) -> Vec<BbId> {
        self.cfg(&join.func)
            .map(|cfg| cfg.pred(&join.block).cloned().collect())
            .unwrap_or_default()
    }

    /// The value `join` takes when control arrives from `pred`.  Values that
    /// are not joins translate to themselves.
    pub fn translate_join(&self, join: &InstId, pred: &BbId) -> Option<Value> {
        match &self.inst(join)?.kind {
            Instruction::Join { incoming } => incoming
                .iter()
                .find(|(bb, _)| bb == pred)
                .map(|(_, v)| v.clone()),
            _ => Some(Value::Inst(join.clone())),
        }
    }
}
