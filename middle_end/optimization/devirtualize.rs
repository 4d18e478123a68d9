//! The devirtualization pass.
//!
//! Every call site is classified and, when indirect, handed to the call target
//! resolver.  The pass runs in two phases:
//!
//! - [analyze] is pure: it reads the module and returns a [CallTargetReport]
//!   listing the targets of every call site together with the planned
//!   rewrites (indirect calls with exactly one candidate).
//!
//! - [apply] performs the planned rewrites, turning each such call into a
//!   direct call.
//!
//! Because the module is not touched until every site is resolved, no
//! resolution ever sees the rewrite of another site.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commons::{skip_validation, Valid};
use crate::error::Error;
use crate::middle_end::analysis::call_targets::{CandidateSet, ResolveOptions, ResolveStats, Resolver};
use crate::middle_end::analysis::forwarding::ForwardingMap;
use crate::middle_end::analysis::ModuleIndex;
use crate::middle_end::ssa::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverOptions {
    pub resolve: ResolveOptions,
    // Plan rewrites for singleton candidate sets.
    pub rewrite: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            resolve: ResolveOptions::default(),
            rewrite: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Direct,
    Indirect,
}

/// What is known about one call site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallSiteReport {
    pub site: InstId,
    pub line: Option<u32>,
    pub kind: CallKind,
    pub targets: CandidateSet,
    // Display names of `targets`, in the same order.
    pub names: Vec<String>,
    pub partial: bool,
    pub stats: ResolveStats,
    // The function this site will be pointed at by `apply`.
    pub rewrite: Option<FuncId>,
}

impl fmt::Display for CallSiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{line} : {}", self.names.join(", ")),
            None => write!(f, "? : {}", self.names.join(", ")),
        }
    }
}

/// The result of [analyze]: one entry per call site, in module order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CallTargetReport {
    pub sites: Vec<CallSiteReport>,
}

impl CallTargetReport {
    pub fn site(&self, id: &InstId) -> Option<&CallSiteReport> {
        self.sites.iter().find(|s| &s.site == id)
    }

    /// The planned rewrites: call site -> new direct callee.
    pub fn rewrites(&self) -> impl Iterator<Item = (&InstId, &FuncId)> {
        self.sites
            .iter()
            .filter_map(|s| s.rewrite.as_ref().map(|f| (&s.site, f)))
    }

    /// Caller/callee pairs, one per target of every site.
    pub fn call_edges(&self) -> Vec<CallEdge> {
        self.sites
            .iter()
            .flat_map(|s| {
                s.targets.iter().map(move |callee| CallEdge {
                    caller: s.site.func.clone(),
                    callee: callee.clone(),
                    line: s.line,
                    direct: s.kind == CallKind::Direct,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for CallTargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for site in &self.sites {
            writeln!(f, "{site}")?;
        }
        Ok(())
    }
}

/// Resolve the targets of every call site in `module`.
pub fn analyze(module: &Valid<Module>, options: &DriverOptions) -> CallTargetReport {
    let index = ModuleIndex::new(module);
    let forwarding = ForwardingMap::build(module);
    debug!(forwarding_functions = forwarding.len(), "built the argument forwarding map");

    let resolver = Resolver::new(&index, &forwarding, options.resolve);

    let display_name = |f: &FuncId| {
        index
            .function(f)
            .map(|f| f.display_name().to_string())
            .unwrap_or_else(|| f.to_string())
    };

    let mut sites = vec![];

    for (site, inst) in module.0.insts() {
        let Instruction::Call { callee, args } = &inst.kind else {
            continue;
        };

        if let Some(cf) = callee.as_func() {
            if index.function(cf).is_some_and(Function::is_debug_intrinsic) {
                continue;
            }
            sites.push(CallSiteReport {
                site,
                line: inst.line,
                kind: CallKind::Direct,
                targets: CandidateSet::from_iter([cf.clone()]),
                names: vec![display_name(cf)],
                partial: false,
                stats: ResolveStats::default(),
                rewrite: None,
            });
            continue;
        }

        let resolution = resolver.resolve(callee, &site.func);
        debug!(
            %site,
            targets = %resolution.candidates,
            expanded = resolution.stats.expanded,
            cycles_cut = resolution.stats.cycles_cut,
            "resolved indirect call"
        );

        let rewrite = match resolution.candidates.single() {
            Some(target) if options.rewrite => {
                let arity_matches = index
                    .function(target)
                    .is_some_and(|f| f.is_declaration() || f.params.len() == args.len());
                if arity_matches {
                    Some(target.clone())
                } else {
                    warn!(%site, %target, "argument count differs from the target, not rewriting");
                    None
                }
            }
            _ => None,
        };

        sites.push(CallSiteReport {
            site,
            line: inst.line,
            kind: CallKind::Indirect,
            names: resolution.candidates.iter().map(display_name).collect(),
            partial: resolution.is_partial(),
            stats: resolution.stats,
            targets: resolution.candidates,
            rewrite,
        });
    }

    let indirect = sites.iter().filter(|s| s.kind == CallKind::Indirect).count();
    let rewrites = sites.iter().filter(|s| s.rewrite.is_some()).count();
    info!(call_sites = sites.len(), indirect, rewrites, "call target analysis finished");

    CallTargetReport { sites }
}

/// Perform the rewrites planned in `report`, which must have been computed
/// for this module.
pub fn apply(module: Valid<Module>, report: &CallTargetReport) -> Result<Valid<Module>, Error> {
    let mut module = module.0;

    for (site, target) in report.rewrites() {
        debug!(%site, %target, "rewriting call to a direct call");
        module.set_callee(site, target.clone())?;
    }

    // A planned rewrite only replaces an indirect callee by a function taking
    // the same number of arguments, which keeps the module valid.
    Ok(skip_validation(module))
}

/// The whole pass: analyze, then apply.
pub fn devirtualize(module: Valid<Module>) -> Result<Valid<Module>, Error> {
    let report = analyze(&module, &DriverOptions::default());
    apply(module, &report)
}
