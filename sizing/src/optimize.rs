//! Stage-count selection and the optimization pass over a set of chains.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use config::{ConfigContext, RunConfig};
use hier::Library;
use itertools::Itertools;
use spice::DeviceExtractor;
use timing::{CharacterizationLookup, Technology, TimingModel};
use tracing::{span, Level};

use crate::devices::{DeviceKey, DeviceRegistry};
use crate::fit::FitSet;
use crate::loads::{extract_loads, BufferLoadConfig, ChainKind, ChainSpec};
use crate::objective::ChainObjective;
use crate::solver::{minimize_box, SolverOptions};
use crate::{Error, Result};

/// The configuration key of the shared precharge size.
pub const PRECHARGE_SIZE_KEY: &str = "precharge_size";
/// The configuration key of the static predecoder sizes.
pub const PREDECODE_SIZES_KEY: &str = "predecode_sizes";

/// Upper bounds on the decision variables. Every lower bound is 1.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds {
    /// Bound on each stage size.
    pub max_stage: f64,
    /// Bound on the precharge size.
    pub max_precharge: f64,
}

impl Bounds {
    /// The bounds configured for `chain`.
    pub fn for_chain(config: &RunConfig, chain: &str) -> Self {
        Self {
            max_stage: config.max_size_for(chain),
            max_precharge: config.max_precharge_size,
        }
    }
}

/// The optimum at one stage count.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedChain {
    /// The number of stages.
    pub num_stages: usize,
    /// The decision variables, with the precharge size last for precharge chains.
    pub x: Vec<f64>,
    /// The objective value at `x`.
    pub objective: f64,
    /// Whether the solver reported convergence.
    pub converged: bool,
}

impl OptimizedChain {
    /// The stage sizes.
    pub fn stage_sizes(&self) -> &[f64] {
        &self.x[..self.num_stages]
    }

    /// The precharge size, for precharge chains.
    pub fn precharge_size(&self) -> Option<f64> {
        self.x.get(self.num_stages).copied()
    }
}

/// Minimizes the objective with explicit per-stage fixed loads.
///
/// `fixed` has one entry for the driver followed by one per stage.
pub fn optimize_stages(
    problem: &BufferLoadConfig,
    fixed: Vec<f64>,
    fits: &FitSet,
    penalty: f64,
    bounds: Bounds,
) -> Result<OptimizedChain> {
    let objective = ChainObjective::new(problem, fixed, fits, penalty)?;
    let n = objective.num_stages();
    let _guard = span!(Level::DEBUG, "solving", chain = %problem.chain, stages = n).entered();

    let mut upper = vec![bounds.max_stage; n];
    if objective.has_precharge() {
        upper.push(bounds.max_precharge);
    }
    let lower = vec![1.0; objective.num_vars()];

    let reference_cin = fits.evaluate(&problem.stage_device, 1.0)?.cin;
    let max_load = objective
        .fixed_loads()
        .iter()
        .copied()
        .fold(0.0, f64::max);
    let effort = (max_load / reference_cin).max(1.0);
    let mut x0: Vec<f64> = (0..n)
        .map(|k| {
            effort
                .powf((k + 1) as f64 / (n + 1) as f64)
                .clamp(1.0, bounds.max_stage)
        })
        .collect();
    if objective.has_precharge() {
        x0.push(1.0);
    }

    let result = minimize_box(
        |x| objective.value(x),
        &x0,
        &lower,
        &upper,
        SolverOptions::default(),
    );
    if !result.converged {
        tracing::warn!(
            chain = %problem.chain,
            stages = n,
            iterations = result.iterations,
            "solver did not converge, using best point found"
        );
    }
    tracing::debug!(
        chain = %problem.chain,
        stages = n,
        objective = result.value,
        x = ?result.x,
        "solved"
    );
    Ok(OptimizedChain {
        num_stages: n,
        x: result.x,
        objective: result.value,
        converged: result.converged,
    })
}

/// Minimizes the objective of `problem` with `num_stages` stages.
pub fn optimize_config(
    problem: &BufferLoadConfig,
    num_stages: usize,
    fits: &FitSet,
    penalty: f64,
    bounds: Bounds,
) -> Result<OptimizedChain> {
    optimize_stages(problem, problem.stage_loads(num_stages), fits, penalty, bounds)
}

/// The stage counts tried for a chain configured with `default` stages.
pub fn candidate_stage_counts(default: usize, num_loads: usize) -> Vec<usize> {
    let mut counts = vec![default];
    if default >= 4 {
        counts.push(default - 2);
        if num_loads == 2 {
            counts.extend(3..=default);
        }
    }
    counts.into_iter().sorted().dedup().collect()
}

/// Final sizes of a chain, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSizes {
    /// Stage sizes, including any fixed leading stage.
    pub stages: Vec<f64>,
    /// The precharge size, for precharge chains.
    pub precharge: Option<f64>,
}

/// Strips the precharge variable and prepends fixed predecoder stages.
pub fn post_process(kind: &ChainKind, best: &OptimizedChain, predecode_sizes: &[f64]) -> ChainSizes {
    let mut stages = best.stage_sizes().to_vec();
    if matches!(kind, ChainKind::Predecode) {
        if let Some(&first) = predecode_sizes.first() {
            stages.insert(0, first);
        }
    }
    ChainSizes {
        stages,
        precharge: best.precharge_size(),
    }
}

/// The state of an optimization pass.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    /// Measuring each chain's loads.
    ExtractLoads,
    /// Fitting device curves.
    FitCurves,
    /// Building a chain's objective.
    BuildObjective,
    /// Minimizing a chain's objective.
    Solve,
    /// Comparing stage counts.
    SelectBest,
    /// Converting the optimum to stored sizes.
    PostProcess,
    /// Writing sizes to the configuration context.
    Commit,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExtractLoads => "extract loads",
            Self::FitCurves => "fit curves",
            Self::BuildObjective => "build objective",
            Self::Solve => "solve",
            Self::SelectBest => "select best",
            Self::PostProcess => "post-process",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

fn enter(phase: &mut Phase, next: Phase, chain: Option<&str>) {
    tracing::info!(from = %phase, to = %next, chain, "optimizer phase");
    *phase = next;
}

/// The result of optimizing one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    /// The chain's configuration key.
    pub chain: ArcStr,
    /// The chosen stage count.
    pub num_stages: usize,
    /// The committed sizes.
    pub sizes: ChainSizes,
    /// The objective value of the chosen configuration.
    pub objective: f64,
    /// Whether the solver reported convergence.
    pub converged: bool,
}

/// Sizes the buffer chains of a bank.
///
/// The bank library is only read; devices are sampled in a scratch library.
pub struct BufferOptimizer<'a> {
    lib: &'a Library,
    tech: &'a Technology,
    config: &'a RunConfig,
    registry: &'a DeviceRegistry,
    lookup: Option<&'a dyn CharacterizationLookup>,
}

impl<'a> BufferOptimizer<'a> {
    /// Creates an optimizer.
    pub fn new(
        lib: &'a Library,
        tech: &'a Technology,
        config: &'a RunConfig,
        registry: &'a DeviceRegistry,
    ) -> Self {
        Self {
            lib,
            tech,
            config,
            registry,
            lookup: None,
        }
    }

    /// Uses characterization data when measuring loads.
    pub fn with_lookup(mut self, lookup: &'a dyn CharacterizationLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Optimizes every chain and commits the results into `ctx`.
    ///
    /// Each chain's current sizes in `ctx` determine its default stage count.
    pub fn run(&self, chains: &[ChainSpec], ctx: &mut ConfigContext) -> Result<Vec<ChainReport>> {
        let _guard = span!(Level::INFO, "optimizing buffer chains", chains = chains.len()).entered();
        let mut phase = Phase::ExtractLoads;
        tracing::info!(to = %phase, "optimizer phase");

        let extractor = DeviceExtractor::new();
        let mut model = TimingModel::new(self.lib, &extractor, self.tech, self.config);
        if let Some(lookup) = self.lookup {
            model = model.with_lookup(lookup);
        }
        let mut problems = Vec::with_capacity(chains.len());
        for spec in chains {
            let default_stages = ctx
                .get(&spec.name)
                .map(|sizes| spec.default_stages(sizes))
                .filter(|&n| n > 0)
                .ok_or_else(|| Error::MissingStageSizes {
                    key: spec.name.clone(),
                })?;
            problems.push(extract_loads(spec, &model, default_stages)?);
        }

        enter(&mut phase, Phase::FitCurves, None);
        let keys: Vec<DeviceKey> = problems
            .iter()
            .flat_map(|p| {
                let precharge = match &p.kind {
                    ChainKind::Precharge { device, .. } => Some(device.clone()),
                    _ => None,
                };
                std::iter::once(p.stage_device.clone()).chain(precharge)
            })
            .unique()
            .collect();
        let fits = FitSet::build(&keys, self.registry, self.tech, self.config)?;

        let predecode_sizes = ctx
            .get(PREDECODE_SIZES_KEY)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| self.config.predecode_sizes.clone());
        let penalty = self.config.buffer_optimization_size_penalty;

        let mut reports = Vec::with_capacity(problems.len());
        for problem in &problems {
            let chain = Some(problem.chain.as_str());
            let bounds = Bounds::for_chain(self.config, &problem.chain);

            enter(&mut phase, Phase::BuildObjective, chain);
            let fixed = problem.stage_loads(problem.default_stages);
            for load in &problem.loads {
                tracing::debug!(
                    chain = %problem.chain,
                    driver = %problem.driver_inst,
                    pin = %load.pin,
                    stage = problem.stage_for(load.terminal, problem.default_stages),
                    cap = load.cap,
                    "placed load"
                );
            }
            tracing::debug!(chain = %problem.chain, fixed = ?fixed, "stage loads");

            enter(&mut phase, Phase::Solve, chain);
            let default = optimize_stages(problem, fixed, &fits, penalty, bounds)?;

            enter(&mut phase, Phase::SelectBest, chain);
            let mut best = default;
            for n in candidate_stage_counts(problem.default_stages, problem.loads.len()) {
                if n == best.num_stages {
                    continue;
                }
                let candidate = optimize_config(problem, n, &fits, penalty, bounds)?;
                if candidate.objective < best.objective {
                    best = candidate;
                }
            }

            enter(&mut phase, Phase::PostProcess, chain);
            let sizes = post_process(&problem.kind, &best, &predecode_sizes);

            enter(&mut phase, Phase::Commit, chain);
            ctx.commit(&problem.chain, sizes.stages.clone());
            if let Some(p) = sizes.precharge {
                ctx.commit(PRECHARGE_SIZE_KEY, vec![p]);
            }
            tracing::info!(
                chain = %problem.chain,
                stages = best.num_stages,
                objective = best.objective,
                sizes = ?sizes.stages,
                "committed chain sizes"
            );
            reports.push(ChainReport {
                chain: problem.chain.clone(),
                num_stages: best.num_stages,
                sizes,
                objective: best.objective,
                converged: best.converged,
            });
        }
        Ok(reports)
    }
}
