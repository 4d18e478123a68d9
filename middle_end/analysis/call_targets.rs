//! Resolution of the functions a value may evaluate to.
//!
//! Starting from the callee operand of an indirect call, the resolver walks
//! def-use chains backwards:
//!
//! - a direct function reference is a candidate;
//! - the result of a call to an argument-forwarding function is the forwarded
//!   argument;
//! - the result of an indirect call is resolved by looking at what its own
//!   callee may be, while remembering the call so that forwarding functions
//!   reached through joins can pick the argument it passes
//!   ("argument propagation" mode);
//! - a join is the union of its incoming values along every predecessor edge;
//! - a formal parameter is the union of the arguments passed for it at every
//!   direct call site of its function.
//!
//! This is flow insensitive: every incoming edge of a join contributes, no
//! matter which branch would execute.  Memory, aggregates and globals are not
//! tracked.
//!
//! The call graph and joins may be cyclic, so each query carries a visited set
//! and a depth bound.  A value is keyed by itself, its mode and, in argument
//! propagation mode, the remembered call: what a forwarder reached through a
//! join contributes depends on the arguments of that call.

use std::collections::BTreeSet as Set;
use std::fmt;

use serde::Serialize;
use tracing::{trace, warn};

use super::forwarding::ForwardingMap;
use super::*;

/// Bound on the recursion depth of a single query.
pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A set of functions without duplicates.  Iterates in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CandidateSet(Vec<FuncId>);

impl CandidateSet {
    pub fn new() -> Self {
        CandidateSet(vec![])
    }

    // Returns whether `f` was not in the set yet.
    pub fn insert(&mut self, f: FuncId) -> bool {
        if self.0.contains(&f) {
            false
        } else {
            self.0.push(f);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FuncId> {
        self.0.iter()
    }

    /// The only element, if there is exactly one.
    pub fn single(&self) -> Option<&FuncId> {
        match self.0.as_slice() {
            [f] => Some(f),
            _ => None,
        }
    }
}

impl FromIterator<FuncId> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = FuncId>>(iter: I) -> Self {
        let mut set = CandidateSet::new();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

impl fmt::Display for CandidateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.0.iter().map(FuncId::name).collect::<Vec<_>>();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Counters for one query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    // values whose case analysis ran.
    pub expanded: usize,
    // values skipped because they were already expanded.
    pub revisits: usize,
    // revisits of a value still being expanded, i.e. cycles that were cut.
    pub cycles_cut: usize,
    // branches abandoned at the depth bound.
    pub depth_limit_hits: usize,
}

/// The outcome of one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub candidates: CandidateSet,
    pub stats: ResolveStats,
}

impl Resolution {
    /// Whether some branch was abandoned at the depth bound, so the
    /// candidates may be missing functions.
    pub fn is_partial(&self) -> bool {
        self.stats.depth_limit_hits > 0
    }
}

// A value as seen by one expansion: the value, the mode, and the remembered
// call when in argument propagation mode.
type VisitKey = (Value, bool, Option<InstId>);

// The state threaded through one query.  Nothing in here survives the query.
#[derive(Default)]
struct ResolveCtx {
    visited: Set<VisitKey>,
    in_progress: Set<VisitKey>,
    // The indirect call whose callee is being resolved in argument
    // propagation mode.
    forwarding_call: Option<InstId>,
    candidates: CandidateSet,
    depth: usize,
    stats: ResolveStats,
}

pub struct Resolver<'a, 'm> {
    index: &'a ModuleIndex<'m>,
    forwarding: &'a ForwardingMap,
    options: ResolveOptions,
}

impl<'a, 'm> Resolver<'a, 'm> {
    pub fn new(index: &'a ModuleIndex<'m>, forwarding: &'a ForwardingMap, options: ResolveOptions) -> Self {
        Resolver {
            index,
            forwarding,
            options,
        }
    }

    /// The functions `value`, used inside `context`, may evaluate to.
    pub fn resolve(&self, value: &Value, context: &FuncId) -> Resolution {
        let mut ctx = ResolveCtx::default();
        self.resolve_value(&mut ctx, value, context, false);

        Resolution {
            candidates: ctx.candidates,
            stats: ctx.stats,
        }
    }

    fn resolve_value(&self, ctx: &mut ResolveCtx, value: &Value, context: &FuncId, arg_propagation: bool) {
        let forwarding_call = if arg_propagation {
            ctx.forwarding_call.clone()
        } else {
            None
        };
        let key = (value.clone(), arg_propagation, forwarding_call);

        if ctx.in_progress.contains(&key) {
            trace!(?value, arg_propagation, "cycle cut");
            ctx.stats.revisits += 1;
            ctx.stats.cycles_cut += 1;
            return;
        }
        if ctx.visited.contains(&key) {
            ctx.stats.revisits += 1;
            return;
        }
        if ctx.depth >= self.options.max_depth {
            if ctx.stats.depth_limit_hits == 0 {
                warn!(max_depth = self.options.max_depth, "depth bound reached, result is partial");
            }
            ctx.stats.depth_limit_hits += 1;
            return;
        }

        ctx.visited.insert(key.clone());
        ctx.in_progress.insert(key.clone());
        ctx.depth += 1;
        ctx.stats.expanded += 1;

        match value {
            Value::Func(f) => {
                ctx.candidates.insert(f.clone());
            }
            Value::Inst(id) => self.resolve_inst(ctx, id, context, arg_propagation),
            Value::Param { func, index } => {
                self.resolve_param(ctx, func, *index, context, arg_propagation)
            }
            Value::Const(_) => (),
        }

        ctx.depth -= 1;
        ctx.in_progress.remove(&key);
    }

    fn resolve_inst(&self, ctx: &mut ResolveCtx, id: &InstId, context: &FuncId, arg_propagation: bool) {
        let Some(inst) = self.index.inst(id) else {
            return;
        };

        match &inst.kind {
            Instruction::Call { callee, args } => {
                self.resolve_call_result(ctx, id, callee, args, context, arg_propagation)
            }
            Instruction::Join { .. } => self.resolve_join(ctx, id, context, arg_propagation),
            Instruction::Return { .. } | Instruction::Other { .. } => (),
        }
    }

    fn resolve_call_result(
        &self,
        ctx: &mut ResolveCtx,
        site: &InstId,
        callee: &Value,
        args: &[Value],
        context: &FuncId,
        arg_propagation: bool,
    ) {
        let Some(cf) = callee.as_func() else {
            if !arg_propagation {
                let outer = ctx.forwarding_call.replace(site.clone());
                self.resolve_value(ctx, callee, context, true);
                ctx.forwarding_call = outer;
            }
            return;
        };

        let returns_ptr = self.index.function(cf).is_some_and(Function::returns_ptr);
        match self.forwarding.get(cf) {
            Some(index) if returns_ptr => match args.get(index) {
                Some(arg) => self.resolve_value(ctx, arg, context, arg_propagation),
                None => trace!(%site, index, "call passes no argument at the forwarded position"),
            },
            _ => trace!(callee = %cf, "callee does not forward an argument"),
        }
    }

    fn resolve_join(&self, ctx: &mut ResolveCtx, join: &InstId, context: &FuncId, arg_propagation: bool) {
        for pred in self.index.join_preds(join) {
            let Some(incoming) = self.index.translate_join(join, &pred) else {
                continue;
            };
            if !incoming.is_named() {
                trace!(%join, %pred, "skipping unnamed incoming value");
                continue;
            }

            match incoming {
                Value::Func(f) if !arg_propagation => {
                    ctx.candidates.insert(f);
                }
                Value::Func(f) => self.resolve_forwarded_arg(ctx, &f),
                other => self.resolve_value(ctx, &other, context, arg_propagation),
            }
        }
    }

    // `forwarder` reached through a join while resolving the callee of the
    // remembered call: the candidate is the argument that call passes at the
    // forwarded position.  Only a direct function reference is accepted there;
    // nothing further is resolved.
    fn resolve_forwarded_arg(&self, ctx: &mut ResolveCtx, forwarder: &FuncId) {
        let Some(index) = self.forwarding.get(forwarder) else {
            trace!(%forwarder, "callee does not forward an argument");
            return;
        };
        let Some(site) = ctx.forwarding_call.clone() else {
            return;
        };

        if let Some(Instruction::Call { args, .. }) = self.index.inst(&site).map(|i| &i.kind) {
            if let Some(Value::Func(f)) = args.get(index) {
                ctx.candidates.insert(f.clone());
            }
        }
    }

    fn resolve_param(
        &self,
        ctx: &mut ResolveCtx,
        func: &FuncId,
        index: usize,
        context: &FuncId,
        arg_propagation: bool,
    ) {
        if func != context {
            trace!(%func, %context, "parameter of another function");
            return;
        }

        for site in self.index.callers_of(context) {
            let Some(Instruction::Call { args, .. }) = self.index.inst(site).map(|i| &i.kind) else {
                continue;
            };
            match args.get(index) {
                Some(arg) => self.resolve_value(ctx, arg, &site.func, arg_propagation),
                None => trace!(%site, index, "call passes no argument for the parameter"),
            }
        }
    }
}
