// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Measurement models: one expression per baseline, evaluated through a
//! cache, with partial derivatives towards the solvable parameters.
//!
//! A *forward* model predicts visibilities from a sky model; an *inverse*
//! model corrects observed visibilities for the modelled effects.

mod builder;
mod config;
mod error;

pub use config::{
    BeamConfig, CacheMode, ClockConfig, ConditionNumberFlagging, GainConfig, ModelConfig,
};
pub use error::ModelError;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use log::{debug, info};

use crate::{
    cache::{Cache, CacheStats, ClearMode},
    coord::RaDec,
    derivative::{evaluate_partials, Measurement},
    expr::{Domain, Expr, ExprBase, ExprRef, Grid, ParmId, Request},
    instrument::Instrument,
    parms::ParmStoreRef,
    sky::SourceDb,
    vis::{Baseline, Correlation, CorrelationBasis, VisBuffer},
    Jones,
};
use builder::{resolve_patches, Builder, ResolvedPatch};

/// What a measurement model is built from.
pub struct ModelContext<'a> {
    pub instrument: &'a Instrument,
    pub sky: &'a dyn SourceDb,
    pub store: ParmStoreRef,

    /// Precomputed patch visibilities, selected with `@name`.
    pub patch_buffers: HashMap<String, Rc<VisBuffer>>,
}

impl<'a> ModelContext<'a> {
    pub fn new(
        instrument: &'a Instrument,
        sky: &'a dyn SourceDb,
        store: ParmStoreRef,
    ) -> ModelContext<'a> {
        ModelContext {
            instrument,
            sky,
            store,
            patch_buffers: HashMap::new(),
        }
    }

    pub fn with_patch_buffer(mut self, name: &str, buffer: Rc<VisBuffer>) -> ModelContext<'a> {
        self.patch_buffers.insert(name.to_string(), buffer);
        self
    }
}

/// The baselines to model, their correlation basis, and where the array
/// points.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Every baseline has its lower station index first.
    pub baselines: Vec<Baseline>,
    pub basis: CorrelationBasis,
    pub phase_reference: RaDec,

    /// Where the station beams are steered.
    pub delay_reference: RaDec,
}

impl Observation {
    pub fn new(
        baselines: Vec<Baseline>,
        basis: CorrelationBasis,
        phase_reference: RaDec,
    ) -> Observation {
        Observation {
            baselines: baselines
                .into_iter()
                .map(|b| Baseline::new(b.0, b.1))
                .collect(),
            basis,
            phase_reference,
            delay_reference: phase_reference,
        }
    }

    pub fn from_buffer(buffer: &VisBuffer) -> Observation {
        Observation {
            delay_reference: buffer.delay_reference,
            ..Observation::new(
                buffer.baselines.clone(),
                buffer.basis,
                buffer.phase_reference,
            )
        }
    }
}

/// The operations a solver or predictor needs from a measurement model.
pub trait MeasurementExpr {
    /// The number of baselines.
    fn size(&self) -> usize;

    /// The union of the domains of all parameters the model reads.
    fn domain(&self) -> Domain;

    fn baselines(&self) -> &[Baseline];

    fn correlations(&self) -> [Correlation; 4];

    /// Every parameter the model reads.
    fn parms(&self) -> &BTreeSet<ParmId>;

    fn n_parms(&self) -> usize {
        self.parms().len()
    }

    fn solvables(&self) -> BTreeSet<ParmId>;

    /// Make exactly `solvables` solvable; every other parameter in the store
    /// is made non-solvable. If any of them isn't read by this model, no
    /// parameter is left solvable and an error is returned.
    fn set_solvables(&mut self, solvables: &BTreeSet<ParmId>) -> Result<(), ModelError>;

    fn clear_solvables(&mut self);

    /// Evaluate on a new grid. Drops every cached value.
    fn set_eval_grid(&mut self, grid: Grid);

    /// Evaluate baseline `i`. Panics if no grid has been set.
    fn evaluate(&mut self, i: usize) -> Measurement;

    /// Tell the model that the values of the solvable parameters changed.
    fn solvables_changed(&mut self);
}

pub struct MeasurementModel {
    store: ParmStoreRef,
    baselines: Vec<Baseline>,
    basis: CorrelationBasis,
    exprs: Vec<ExprRef<Jones>>,
    parms: BTreeSet<ParmId>,
    request: Option<Request>,
    cache: Cache,
}

impl MeasurementModel {
    /// Build a model predicting the visibilities of the selected patches.
    pub fn forward(
        ctx: &ModelContext,
        obs: &Observation,
        config: &ModelConfig,
    ) -> Result<MeasurementModel, ModelError> {
        let patches = resolve_patches(ctx, &config.sources)?;
        info!(
            "Building forward model: {} baselines, {} patches, effects: [{}]",
            obs.baselines.len(),
            patches.len(),
            config.enabled_effects().join(", ")
        );
        let (exprs, parms) = rollback_on_error(ctx, || {
            let mut builder = Builder::new(ctx, config, obs)?;
            let exprs = builder.forward(&patches)?;
            Ok((exprs, builder.parms()))
        })?;
        Ok(MeasurementModel::new(ctx, obs, exprs, parms, config))
    }

    /// Build a model correcting the visibilities in `buffer`.
    pub fn inverse(
        ctx: &ModelContext,
        buffer: Rc<VisBuffer>,
        config: &ModelConfig,
    ) -> Result<MeasurementModel, ModelError> {
        let patch = if config.has_dde() {
            let patches = match resolve_patches(ctx, &config.sources) {
                Ok(patches) => patches.into_vec(),
                Err(ModelError::NoPatches(_)) => vec![],
                Err(e) => return Err(e),
            };
            let n = patches.len();
            let [patch]: [ResolvedPatch; 1] = patches
                .try_into()
                .map_err(|_| ModelError::DdeRequiresSinglePatch(n))?;
            Some(patch)
        } else {
            None
        };

        let obs = Observation::from_buffer(&buffer);
        info!(
            "Building inverse model: {} baselines, effects: [{}]",
            obs.baselines.len(),
            config.enabled_effects().join(", ")
        );
        let (exprs, parms) = rollback_on_error(ctx, || {
            let mut builder = Builder::new(ctx, config, &obs)?;
            let exprs = builder.inverse(&buffer, patch.as_ref())?;
            Ok((exprs, builder.parms()))
        })?;
        Ok(MeasurementModel::new(ctx, &obs, exprs, parms, config))
    }

    fn new(
        ctx: &ModelContext,
        obs: &Observation,
        exprs: Vec<ExprRef<Jones>>,
        parms: BTreeSet<ParmId>,
        config: &ModelConfig,
    ) -> MeasurementModel {
        let policy = config.cache.policy();
        let roots: Vec<&dyn ExprBase> = exprs.iter().map(|e| e.as_base()).collect();
        policy.apply(&roots);
        debug!(
            "Model has {} expressions reading {} parameters; cache policy '{}'",
            exprs.len(),
            parms.len(),
            policy.name()
        );

        MeasurementModel {
            store: Rc::clone(&ctx.store),
            baselines: obs.baselines.clone(),
            basis: obs.basis,
            exprs,
            parms,
            request: None,
            cache: Cache::new(),
        }
    }

    /// Make every parameter matching any of the glob `patterns` solvable.
    /// Returns the selected parameters.
    pub fn set_solvables_by_pattern(
        &mut self,
        patterns: &[String],
    ) -> Result<BTreeSet<ParmId>, ModelError> {
        let mut solvables = BTreeSet::new();
        {
            let store = self.store.borrow();
            for pattern in patterns {
                let p = glob::Pattern::new(pattern).map_err(|err| {
                    ModelError::BadSolvablePattern {
                        pattern: pattern.clone(),
                        err,
                    }
                })?;
                let before = solvables.len();
                solvables.extend(
                    self.parms
                        .iter()
                        .copied()
                        .filter(|&id| p.matches(store.get(id).name())),
                );
                if solvables.len() == before {
                    return Err(ModelError::NoMatchingSolvables(pattern.clone()));
                }
            }
        }
        self.set_solvables(&solvables)?;
        Ok(solvables)
    }

    /// The expression of baseline `i`.
    pub fn expr(&self, i: usize) -> &ExprRef<Jones> {
        &self.exprs[i]
    }

    pub fn store(&self) -> &ParmStoreRef {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn parm_name(&self, id: ParmId) -> String {
        self.store.borrow().get(id).name().to_string()
    }

}

/// Run `build`, dropping the parameters it instantiated from defaults if it
/// fails.
fn rollback_on_error<T>(
    ctx: &ModelContext,
    build: impl FnOnce() -> Result<T, ModelError>,
) -> Result<T, ModelError> {
    let n_parms = ctx.store.borrow().len();
    build().map_err(|e| {
        let mut store = ctx.store.borrow_mut();
        if store.len() > n_parms {
            debug!(
                "Model build failed; dropping {} defaulted parameters",
                store.len() - n_parms
            );
            store.truncate(n_parms);
        }
        e
    })
}

impl MeasurementExpr for MeasurementModel {
    fn size(&self) -> usize {
        self.exprs.len()
    }

    fn domain(&self) -> Domain {
        let store = self.store.borrow();
        self.parms
            .iter()
            .fold(Domain::empty(), |acc, &id| acc.union(&store.get(id).domain()))
    }

    fn baselines(&self) -> &[Baseline] {
        &self.baselines
    }

    fn correlations(&self) -> [Correlation; 4] {
        self.basis.correlations()
    }

    fn parms(&self) -> &BTreeSet<ParmId> {
        &self.parms
    }

    fn solvables(&self) -> BTreeSet<ParmId> {
        let store = self.store.borrow();
        self.parms
            .iter()
            .copied()
            .filter(|&id| store.is_solvable(id))
            .collect()
    }

    fn set_solvables(&mut self, solvables: &BTreeSet<ParmId>) -> Result<(), ModelError> {
        self.store.borrow_mut().clear_solvables();
        self.cache.clear(ClearMode::Volatile);

        if let Some(&unknown) = solvables.iter().find(|&&id| !self.parms.contains(&id)) {
            let store = self.store.borrow();
            let name = if unknown < store.len() {
                store.get(unknown).name().to_string()
            } else {
                format!("#{unknown}")
            };
            return Err(ModelError::UnknownSolvable(name));
        }

        let mut store = self.store.borrow_mut();
        for &id in solvables {
            store.set_solvable(id, true);
        }
        debug!("{} solvable parameters", solvables.len());
        Ok(())
    }

    fn clear_solvables(&mut self) {
        self.store.borrow_mut().clear_solvables();
        self.cache.clear(ClearMode::Volatile);
    }

    fn set_eval_grid(&mut self, grid: Grid) {
        let (nt, nf) = grid.shape();
        debug!("New evaluation grid: {nt} timesteps x {nf} channels");
        self.request = Some(Request::new(grid));
        self.cache.clear(ClearMode::All);
    }

    fn evaluate(&mut self, i: usize) -> Measurement {
        let request = self
            .request
            .as_ref()
            .expect("set_eval_grid() must be called before evaluate()");
        let store = self.store.borrow();
        evaluate_partials(&*self.exprs[i], request, &mut self.cache, &store)
    }

    fn solvables_changed(&mut self) {
        debug!("Cache: {}", self.cache.stats());
        self.cache.clear(ClearMode::Volatile);
        self.cache.clear_stats();
    }
}
