//! qcc-opt - AST Optimizer
//!
//! A leveled pass manager over the AST. Passes are indexed in a
//! fixed-width bitset and organized by optimization band: L0 (always-on
//! normalization), Ld (debug-friendly), L1 (basic), L2 (standard), L3
//! (aggressive). Setting level N enables every pass whose minimum band
//! is at or below N; user overrides layer on top, with explicit disable
//! beating explicit enable beating the level default.
//!
//! `run` iterates the enabled passes in id order, accumulating mutation
//! counts, until a full round produces zero changes or the iteration cap
//! is reached. Passes that require semantic information are skipped when
//! no analysis result is attached.

mod passes;

use qcc_par::ast::TranslationUnit;
use qcc_sem::TypeContext;

/// Pass identifiers; the discriminant is the bitset index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PassId {
    /// Canonical form: double negation, commutative constants rightward.
    Normalize = 0,
    /// Identity operations: `x*1`, `x+0`, `x|0`.
    IdentityOps,
    /// Literal arithmetic at compile time.
    ConstFold,
    /// Unreachable statements and constant branches.
    DeadCode,
    /// `x*2ⁿ` to shifts, unsigned `x/2ⁿ` to shifts.
    StrengthReduce,
}

/// Number of registered passes.
pub const PASS_COUNT: usize = 5;

impl PassId {
    #[inline]
    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Optimization bands, cumulative from L0 upward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    /// Always-on normalization.
    L0,
    /// Debug-friendly passes.
    Ld,
    /// Basic optimization.
    L1,
    /// Standard optimization.
    L2,
    /// Aggressive optimization.
    L3,
}

impl OptLevel {
    /// Map a `-O<n>` digit onto a band.
    pub fn from_cli(level: u8) -> OptLevel {
        match level {
            0 => OptLevel::L0,
            1 => OptLevel::L1,
            2 => OptLevel::L2,
            _ => OptLevel::L3,
        }
    }
}

/// Static descriptor of one pass.
pub struct PassInfo {
    pub id: PassId,
    pub name: &'static str,
    pub min_level: OptLevel,
    pub modifies_ast: bool,
    pub requires_sema: bool,
}

/// The registered passes, in execution (id) order.
pub const PASSES: [PassInfo; PASS_COUNT] = [
    PassInfo {
        id: PassId::Normalize,
        name: "normalize",
        min_level: OptLevel::L0,
        modifies_ast: true,
        requires_sema: false,
    },
    PassInfo {
        id: PassId::IdentityOps,
        name: "identity-ops",
        min_level: OptLevel::Ld,
        modifies_ast: true,
        requires_sema: false,
    },
    PassInfo {
        id: PassId::ConstFold,
        name: "const-fold",
        min_level: OptLevel::L1,
        modifies_ast: true,
        requires_sema: false,
    },
    PassInfo {
        id: PassId::DeadCode,
        name: "dead-code",
        min_level: OptLevel::L2,
        modifies_ast: true,
        requires_sema: false,
    },
    PassInfo {
        id: PassId::StrengthReduce,
        name: "strength-reduce",
        min_level: OptLevel::L2,
        modifies_ast: true,
        requires_sema: true,
    },
];

/// Fixpoint iteration cap.
const MAX_ITERATIONS: u32 = 10;

/// The leveled pass manager.
pub struct PassManager {
    level: OptLevel,
    enabled_override: u32,
    disabled_override: u32,
    verbose: bool,

    /// Mutations applied, per pass id.
    pub pass_counters: [u64; PASS_COUNT],
    /// Total mutations across all iterations.
    pub total_mutations: u64,
    /// Rounds executed by the last `run`.
    pub iterations: u32,
    /// Notes emitted in verbose mode (skipped passes).
    pub notes: Vec<String>,
}

impl PassManager {
    pub fn new(level: OptLevel) -> Self {
        Self {
            level,
            enabled_override: 0,
            disabled_override: 0,
            verbose: false,
            pass_counters: [0; PASS_COUNT],
            total_mutations: 0,
            iterations: 0,
            notes: Vec::new(),
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Force-enable a pass regardless of level.
    pub fn enable(&mut self, id: PassId) {
        self.enabled_override |= id.bit();
    }

    /// Force-disable a pass; beats an explicit enable.
    pub fn disable(&mut self, id: PassId) {
        self.disabled_override |= id.bit();
    }

    /// Effective enablement: disable > enable > level default.
    pub fn is_enabled(&self, id: PassId) -> bool {
        if self.disabled_override & id.bit() != 0 {
            return false;
        }
        if self.enabled_override & id.bit() != 0 {
            return true;
        }
        PASSES[id.index()].min_level <= self.level
    }

    /// Run enabled passes to fixpoint. Returns the total mutation count.
    pub fn run(&mut self, unit: &mut TranslationUnit, sema: Option<&TypeContext>) -> u64 {
        self.iterations = 0;
        for _ in 0..MAX_ITERATIONS {
            self.iterations += 1;
            let mut round_changes: u64 = 0;
            for pass in &PASSES {
                if !self.is_enabled(pass.id) {
                    continue;
                }
                if pass.requires_sema && sema.is_none() {
                    if self.verbose {
                        self.notes.push(format!(
                            "skipping pass '{}': no semantic info attached",
                            pass.name
                        ));
                    }
                    continue;
                }
                let changed = passes::run_pass(pass.id, unit, sema);
                self.pass_counters[pass.id.index()] += changed;
                round_changes += changed;
            }
            self.total_mutations += round_changes;
            if round_changes == 0 {
                break;
            }
        }
        self.total_mutations
    }
}
