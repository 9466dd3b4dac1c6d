// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Assembly of the per-baseline expression graphs.
//!
//! Effects are chained per station with [`compose`], in a fixed order:
//! clock, bandpass, gain, TEC for the direction-independent part; directional
//! gain, beam, directional TEC, Faraday rotation, ionosphere for the
//! direction-dependent part. Parameter leaves are created once per parameter
//! and shared by every expression that reads them.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use indexmap::IndexSet;
use log::{debug, trace};
use vec1::Vec1;

use super::{GainConfig, ModelConfig, ModelContext, ModelError, Observation};
use crate::{
    c64,
    constants::EARTH_RADIUS,
    coord::RaDec,
    expr::{
        apply, as_complex, as_diag, as_matrix, as_polar, baseline_phase, clock_delay, compose,
        condition_number, constant, faraday_rotation, gaussian_envelope, inverse,
        ionosphere_screen, itrf_direction, matrix_sum, merge_flags_from, pierce_point,
        point_coherence, real_diag, scalar_matrix_mul, source_lmn, station_beam, station_shift,
        station_uvw, tec_phase, threshold, vis_data, vis_samples, ExprRef, GaussianEnvelope,
        ParmExpr, ParmId, StationBeam, Vector3,
    },
    sky::{Source, SourceShape},
    vis::{Baseline, CorrelationBasis, VisBuffer},
    Jones,
};

pub(super) enum PatchKind {
    Catalogue(Vec<Source>),

    /// Precomputed visibilities of the patch.
    Buffer(Rc<VisBuffer>),
}

pub(super) struct ResolvedPatch {
    pub(super) name: String,
    pub(super) position: RaDec,
    pub(super) kind: PatchKind,
}

/// Turn a source selection into patches, keeping selection order and
/// dropping duplicates.
pub(super) fn resolve_patches(
    ctx: &ModelContext,
    selection: &[String],
) -> Result<Vec1<ResolvedPatch>, ModelError> {
    let everything = ["*".to_string()];
    let selection = if selection.is_empty() {
        &everything[..]
    } else {
        selection
    };

    let mut names: IndexSet<String> = IndexSet::new();
    for entry in selection {
        match entry.strip_prefix('@') {
            Some(buffer_name) => {
                if !ctx.patch_buffers.contains_key(buffer_name) {
                    return Err(ModelError::UnknownPatchBuffer(buffer_name.to_string()));
                }
                names.insert(entry.clone());
            }
            None => names.extend(ctx.sky.patches(entry)?),
        }
    }
    let patches = names
        .into_iter()
        .map(|name| match name.strip_prefix('@') {
            Some(buffer_name) => {
                let buffer = Rc::clone(&ctx.patch_buffers[buffer_name]);
                Ok(ResolvedPatch {
                    name: buffer_name.to_string(),
                    position: buffer.phase_reference,
                    kind: PatchKind::Buffer(buffer),
                })
            }
            None => Ok(ResolvedPatch {
                position: ctx.sky.patch_position(&name)?,
                kind: PatchKind::Catalogue(ctx.sky.sources(&name)?),
                name,
            }),
        })
        .collect::<Result<Vec<_>, ModelError>>()?;
    Vec1::try_from_vec(patches).map_err(|_| ModelError::NoPatches(selection.to_vec()))
}

/// Append `next` to a chain of effects.
fn chain(acc: Option<ExprRef<Jones>>, next: ExprRef<Jones>) -> Option<ExprRef<Jones>> {
    Some(match acc {
        Some(acc) => compose(acc, next),
        None => next,
    })
}

fn scalar_diag(s: ExprRef<c64>) -> ExprRef<Jones> {
    as_diag(s.clone(), s)
}

pub(super) struct Builder<'a> {
    ctx: &'a ModelContext<'a>,
    config: &'a ModelConfig,
    obs: &'a Observation,

    /// Stations referenced by at least one baseline.
    used_stations: BTreeSet<usize>,

    parms: BTreeMap<ParmId, ExprRef<f64>>,
    station_uvw: Vec<ExprRef<Vector3>>,
    beam_reference: ExprRef<Vector3>,
    array_position: ExprRef<Vector3>,
    zero: ExprRef<f64>,
}

impl<'a> Builder<'a> {
    pub(super) fn new(
        ctx: &'a ModelContext<'a>,
        config: &'a ModelConfig,
        obs: &'a Observation,
    ) -> Result<Builder<'a>, ModelError> {
        let instrument = ctx.instrument;
        let n_stations = instrument.n_stations();
        let mut used_stations = BTreeSet::new();
        for &baseline in &obs.baselines {
            if baseline.1 >= n_stations {
                return Err(ModelError::BadBaseline {
                    baseline,
                    n_stations,
                });
            }
            used_stations.insert(baseline.0);
            used_stations.insert(baseline.1);
        }

        let station_uvw = instrument
            .stations
            .iter()
            .map(|s| station_uvw(s.position - instrument.position(), obs.phase_reference))
            .collect();

        Ok(Builder {
            ctx,
            config,
            obs,
            used_stations,
            parms: BTreeMap::new(),
            station_uvw,
            beam_reference: itrf_direction(obs.delay_reference),
            array_position: constant(instrument.position().to_array()),
            zero: constant(0.0),
        })
    }

    /// The ids of every parameter the built expressions read.
    pub(super) fn parms(&self) -> BTreeSet<ParmId> {
        self.parms.keys().copied().collect()
    }

    fn station_name(&self, station: usize) -> &str {
        &self.ctx.instrument.station(station).name
    }

    fn parm(&mut self, name: &str) -> Result<ExprRef<f64>, ModelError> {
        let id = self.ctx.store.borrow_mut().resolve(name)?;
        let store = &self.ctx.store;
        let leaf = self
            .parms
            .entry(id)
            .or_insert_with(|| ParmExpr::new_ref(Rc::clone(store), id));
        Ok(Rc::clone(leaf))
    }

    fn gain_element(
        &mut self,
        prefix: &str,
        (i, j): (usize, usize),
        suffix: &str,
        phasors: bool,
    ) -> Result<ExprRef<c64>, ModelError> {
        if phasors {
            let ampl = self.parm(&format!("{prefix}:{i}:{j}:Ampl:{suffix}"))?;
            let phase = self.parm(&format!("{prefix}:{i}:{j}:Phase:{suffix}"))?;
            Ok(as_polar(ampl, phase))
        } else {
            let re = self.parm(&format!("{prefix}:{i}:{j}:Real:{suffix}"))?;
            let im = self.parm(&format!("{prefix}:{i}:{j}:Imag:{suffix}"))?;
            Ok(as_complex(re, im))
        }
    }

    fn gain(
        &mut self,
        prefix: &str,
        suffix: &str,
        config: GainConfig,
    ) -> Result<ExprRef<Jones>, ModelError> {
        let p = config.phasors;
        let xx = self.gain_element(prefix, (0, 0), suffix, p)?;
        if config.diagonal {
            let yy = self.gain_element(prefix, (1, 1), suffix, p)?;
            return Ok(as_diag(xx, yy));
        }
        let xy = self.gain_element(prefix, (0, 1), suffix, p)?;
        let yx = self.gain_element(prefix, (1, 0), suffix, p)?;
        let yy = self.gain_element(prefix, (1, 1), suffix, p)?;
        Ok(as_matrix(xx, xy, yx, yy))
    }

    /// The direction-independent effects of a station, if any are enabled.
    fn die(&mut self, station: usize) -> Result<Option<ExprRef<Jones>>, ModelError> {
        let config = self.config;
        let st = self.station_name(station).to_string();
        let mut acc = None;

        if let Some(clock) = config.clock {
            let j = if clock.split {
                let x = clock_delay(self.parm(&format!("Clock:0:{st}"))?);
                let y = clock_delay(self.parm(&format!("Clock:1:{st}"))?);
                as_diag(x, y)
            } else {
                scalar_diag(clock_delay(self.parm(&format!("Clock:{st}"))?))
            };
            acc = chain(acc, j);
        }
        if config.bandpass {
            let xx = self.parm(&format!("Bandpass:0:0:{st}"))?;
            let yy = self.parm(&format!("Bandpass:1:1:{st}"))?;
            acc = chain(acc, real_diag(xx, yy));
        }
        if let Some(gain) = config.gain {
            acc = chain(acc, self.gain("Gain", &st, gain)?);
        }
        if config.tec {
            let tec = self.parm(&format!("TEC:{st}"))?;
            acc = chain(acc, scalar_diag(tec_phase(tec)));
        }
        Ok(acc)
    }

    /// The direction-dependent effects of a station towards a patch, if any
    /// are enabled.
    fn dde(
        &mut self,
        station: usize,
        patch: &ResolvedPatch,
        direction: &ExprRef<Vector3>,
    ) -> Result<Option<ExprRef<Jones>>, ModelError> {
        let config = self.config;
        let st = self.station_name(station).to_string();
        let pa = &patch.name;
        let mut acc = None;

        if let Some(gain) = config.directional_gain {
            acc = chain(acc, self.gain("DirectionalGain", &format!("{st}:{pa}"), gain)?);
        }
        if let Some(beam) = config.beam {
            let s = self.ctx.instrument.station(station);
            let beam = StationBeam {
                elements: s.elements.clone(),
                up: s.up(),
                mode: beam.mode,
            };
            acc = chain(
                acc,
                station_beam(beam, Rc::clone(direction), Rc::clone(&self.beam_reference)),
            );
        }
        if config.directional_tec {
            let tec = self.parm(&format!("TEC:{st}:{pa}"))?;
            acc = chain(acc, scalar_diag(tec_phase(tec)));
        }
        if config.faraday_rotation {
            let rm = self.parm(&format!("RotationMeasure:{st}:{pa}"))?;
            acc = chain(acc, faraday_rotation(rm));
        }
        if config.ionosphere {
            let position = constant(self.ctx.instrument.station(station).position.to_array());
            let height = self.parm("MIM:H")?;
            let pp = pierce_point(position, Rc::clone(direction), height, EARTH_RADIUS);
            let c0 = self.parm("MIM:c:0")?;
            let c1 = self.parm("MIM:c:1")?;
            let c2 = self.parm("MIM:c:2")?;
            let tec = ionosphere_screen(pp, Rc::clone(&self.array_position), c0, c1, c2);
            acc = chain(acc, scalar_diag(tec_phase(tec)));
        }
        Ok(acc)
    }

    fn dde_per_station(
        &mut self,
        patch: &ResolvedPatch,
        direction: &ExprRef<Vector3>,
    ) -> Result<Vec<Option<ExprRef<Jones>>>, ModelError> {
        let mut dde = vec![None; self.ctx.instrument.n_stations()];
        for st in self.used_stations.clone() {
            dde[st] = self.dde(st, patch, direction)?;
        }
        Ok(dde)
    }

    fn die_per_station(&mut self) -> Result<Vec<Option<ExprRef<Jones>>>, ModelError> {
        let mut die = vec![None; self.ctx.instrument.n_stations()];
        for st in self.used_stations.clone() {
            die[st] = self.die(st)?;
        }
        Ok(die)
    }

    /// Buffered patches are used as they are, so they must already be in the
    /// observation's basis.
    fn check_buffer_basis(
        &self,
        patch: &ResolvedPatch,
        buffer: &VisBuffer,
    ) -> Result<(), ModelError> {
        if buffer.basis == self.obs.basis {
            Ok(())
        } else {
            Err(ModelError::PatchBufferBasis {
                patch: patch.name.clone(),
                expected: self.obs.basis,
                got: buffer.basis,
            })
        }
    }

    /// The coherence of a patch on every baseline.
    fn patch_coherences(
        &self,
        patch: &ResolvedPatch,
        circular: Option<&ExprRef<Jones>>,
    ) -> Result<Vec<ExprRef<Jones>>, ModelError> {
        let sources = match &patch.kind {
            PatchKind::Buffer(buffer) => {
                self.check_buffer_basis(patch, buffer)?;
                return self
                    .obs
                    .baselines
                    .iter()
                    .map(|&baseline| {
                        let i = buffer.baseline_index(baseline).ok_or_else(|| {
                            ModelError::PatchBufferMissingBaseline {
                                patch: patch.name.clone(),
                                baseline,
                            }
                        })?;
                        Ok(vis_data(Rc::clone(buffer), i))
                    })
                    .collect();
            }
            PatchKind::Catalogue(sources) => sources,
        };

        let brightness: Vec<ExprRef<Jones>> = sources
            .iter()
            .map(|s| point_coherence(s.flux.to_brightness(), s.flux.freq, s.spectral_index))
            .collect();
        // Phase shifts per source and station.
        let shifts: Vec<BTreeMap<usize, ExprRef<c64>>> = sources
            .iter()
            .map(|s| {
                let lmn = source_lmn(s.radec, self.obs.phase_reference);
                self.used_stations
                    .iter()
                    .map(|&st| {
                        let uvw = Rc::clone(&self.station_uvw[st]);
                        (st, station_shift(uvw, Rc::clone(&lmn)))
                    })
                    .collect()
            })
            .collect();

        let coherences = self
            .obs
            .baselines
            .iter()
            .map(|&Baseline(p, q)| {
                let mut terms: Vec<ExprRef<Jones>> = sources
                    .iter()
                    .enumerate()
                    .map(|(i, source)| {
                        let phase =
                            baseline_phase(Rc::clone(&shifts[i][&p]), Rc::clone(&shifts[i][&q]));
                        let mut coherence = Rc::clone(&brightness[i]);
                        if let SourceShape::Gaussian { maj, min, pa } = source.shape {
                            let envelope = gaussian_envelope(
                                GaussianEnvelope { maj, min, pa },
                                Rc::clone(&self.station_uvw[p]),
                                Rc::clone(&self.station_uvw[q]),
                            );
                            let envelope = as_complex(envelope, Rc::clone(&self.zero));
                            coherence = scalar_matrix_mul(envelope, coherence);
                        }
                        scalar_matrix_mul(phase, coherence)
                    })
                    .collect();
                let coherence = if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    matrix_sum(terms)
                };
                match circular {
                    Some(h) => apply(Rc::clone(h), coherence, Rc::clone(h)),
                    None => coherence,
                }
            })
            .collect();
        Ok(coherences)
    }

    /// One expression per baseline: `DIE_p . sum(DDE_p . C . DDE_q^H) .
    /// DIE_q^H`.
    pub(super) fn forward(
        &mut self,
        patches: &[ResolvedPatch],
    ) -> Result<Vec<ExprRef<Jones>>, ModelError> {
        let circular = match self.obs.basis {
            CorrelationBasis::Circular => Some(constant(Jones::linear_to_circular())),
            CorrelationBasis::Linear => None,
        };

        let mut contributions: Vec<Vec<ExprRef<Jones>>> = vec![vec![]; self.obs.baselines.len()];
        for patch in patches {
            trace!("Adding patch '{}' at {}", patch.name, patch.position);
            let direction = itrf_direction(patch.position);
            let dde = self.dde_per_station(patch, &direction)?;
            let coherences = self.patch_coherences(patch, circular.as_ref())?;
            for ((terms, coherence), &Baseline(p, q)) in contributions
                .iter_mut()
                .zip(coherences)
                .zip(self.obs.baselines.iter())
            {
                let term = match (&dde[p], &dde[q]) {
                    (Some(jp), Some(jq)) => apply(Rc::clone(jp), coherence, Rc::clone(jq)),
                    _ => coherence,
                };
                terms.push(term);
            }
        }

        let die = self.die_per_station()?;
        let exprs = contributions
            .into_iter()
            .zip(self.obs.baselines.iter())
            .map(|(mut terms, &Baseline(p, q))| {
                let sum = if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    matrix_sum(terms)
                };
                match (&die[p], &die[q]) {
                    (Some(jp), Some(jq)) => apply(Rc::clone(jp), sum, Rc::clone(jq)),
                    _ => sum,
                }
            })
            .collect();
        debug!("Forward model reads {} parameters", self.parms.len());
        Ok(exprs)
    }

    /// One expression per baseline: `J_p^-1 . V . J_q^-H`, where `J` combines
    /// the direction-independent and direction-dependent effects of a
    /// station. Without any effects the observed visibilities pass through.
    ///
    /// The per-correlation flags of `buffer` stay with the buffer; the flags
    /// of the expressions are only those the correction itself raises.
    pub(super) fn inverse(
        &mut self,
        buffer: &Rc<VisBuffer>,
        patch: Option<&ResolvedPatch>,
    ) -> Result<Vec<ExprRef<Jones>>, ModelError> {
        let n_stations = self.ctx.instrument.n_stations();
        let dde = match patch {
            Some(patch) => {
                if let PatchKind::Buffer(patch_buffer) = &patch.kind {
                    self.check_buffer_basis(patch, patch_buffer)?;
                }
                let direction = itrf_direction(patch.position);
                self.dde_per_station(patch, &direction)?
            }
            None => vec![None; n_stations],
        };
        let die = self.die_per_station()?;

        let flagging = self.config.flag_condition_number;
        let corrections: Vec<Option<ExprRef<Jones>>> = die
            .into_iter()
            .zip(dde)
            .map(|effects| {
                let j = match effects {
                    (Some(die), Some(dde)) => compose(die, dde),
                    (Some(j), None) | (None, Some(j)) => j,
                    (None, None) => return None,
                };
                let j = match flagging {
                    Some(f) => {
                        let cond = threshold(condition_number(Rc::clone(&j)), f.threshold);
                        merge_flags_from(j, cond)
                    }
                    None => j,
                };
                Some(inverse(j))
            })
            .collect();

        let exprs = self
            .obs
            .baselines
            .iter()
            .enumerate()
            .map(|(i, &Baseline(p, q))| {
                let vis = vis_samples(Rc::clone(buffer), i);
                match (&corrections[p], &corrections[q]) {
                    (Some(ip), Some(iq)) => apply(Rc::clone(ip), vis, Rc::clone(iq)),
                    _ => vis,
                }
            })
            .collect();
        debug!("Inverse model reads {} parameters", self.parms.len());
        Ok(exprs)
    }
}
