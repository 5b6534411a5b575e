use super::config::UpdateMode;
use super::energy::EnergyModel;
use crate::core::domain::Projection;
use crate::core::models::system::ParticleSystem;
use nalgebra::Vector3;
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const ADAPTIVE_GROWTH: f64 = 1.2;
pub const ADAPTIVE_MAX_MULTIPLIER: f64 = 4.0;
pub const ADAPTIVE_MIN_MULTIPLIER: f64 = 1.0 / 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SweepOutcome {
    /// Largest distance any particle moved, in its local frame.
    pub max_displacement: f64,
    /// Particles whose surface projection ran out of tolerance budget.
    pub unconverged: usize,
    /// Particles that reached their surface only under a relaxed tolerance.
    pub loosened: usize,
}

impl SweepOutcome {
    fn record(&mut self, displacement: f64, projection: &Projection) {
        self.max_displacement = self.max_displacement.max(displacement);
        if !projection.converged {
            self.unconverged += 1;
        } else if projection.is_loosened() {
            self.loosened += 1;
        }
    }
}

/// Order in which particles are moved during one sweep.
pub trait UpdateStrategy: Send {
    fn sweep(&mut self, system: &mut ParticleSystem, energy: &EnergyModel) -> SweepOutcome;

    /// Drops any per-particle history, called when the particle count changes.
    fn reset(&mut self) {}
}

pub fn strategy_for(mode: UpdateMode) -> Box<dyn UpdateStrategy> {
    match mode {
        UpdateMode::Simultaneous => Box::new(SimultaneousUpdate),
        UpdateMode::Sequential => Box::new(SequentialUpdate),
        UpdateMode::AdaptiveSequential => Box::new(AdaptiveSequentialUpdate::default()),
    }
}

fn move_particle(
    system: &mut ParticleSystem,
    domain: usize,
    index: usize,
    step: &Vector3<f64>,
    outcome: &mut SweepOutcome,
) {
    let old = system.position(domain, index);
    let projection = system.set_position(domain, index, &(old + step));
    outcome.record((projection.point - old).norm(), &projection);
}

/// All steps are computed from the positions at the start of the sweep, then
/// written back together.
#[derive(Debug, Default)]
pub struct SimultaneousUpdate;

impl UpdateStrategy for SimultaneousUpdate {
    fn sweep(&mut self, system: &mut ParticleSystem, energy: &EnergyModel) -> SweepOutcome {
        let work: Vec<(usize, usize)> = (0..system.num_domains())
            .flat_map(|d| (0..system.particle_count(d)).map(move |i| (d, i)))
            .collect();

        let snapshot: &ParticleSystem = system;

        #[cfg(not(feature = "parallel"))]
        let iterator = work.iter();
        #[cfg(feature = "parallel")]
        let iterator = work.par_iter();

        let steps: Vec<Vector3<f64>> = iterator
            .map(|&(d, i)| energy.step(snapshot, d, i))
            .collect();

        let mut outcome = SweepOutcome::default();
        for (&(d, i), step) in work.iter().zip(&steps) {
            move_particle(system, d, i, step, &mut outcome);
        }
        outcome
    }
}

/// Particles move one at a time in domain-major order, each seeing every
/// earlier move of the same sweep. Neighbour positions are read live; the
/// population statistics behind the correspondence term and the kernel widths
/// stay fixed until the next `prepare`.
#[derive(Debug, Default)]
pub struct SequentialUpdate;

impl UpdateStrategy for SequentialUpdate {
    fn sweep(&mut self, system: &mut ParticleSystem, energy: &EnergyModel) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        for d in 0..system.num_domains() {
            for i in 0..system.particle_count(d) {
                let step = energy.step(system, d, i);
                move_particle(system, d, i, &step, &mut outcome);
            }
        }
        outcome
    }
}

/// Sequential order with a step multiplier per particle. The multiplier grows
/// while consecutive steps point the same way and halves when they reverse.
#[derive(Debug, Default)]
pub struct AdaptiveSequentialUpdate {
    multipliers: Vec<Vec<f64>>,
    previous: Vec<Vec<Vector3<f64>>>,
}

impl AdaptiveSequentialUpdate {
    pub fn multiplier(&self, domain: usize, index: usize) -> Option<f64> {
        self.multipliers.get(domain)?.get(index).copied()
    }

    fn fit_to(&mut self, system: &ParticleSystem) {
        self.multipliers.resize_with(system.num_domains(), Vec::new);
        self.previous.resize_with(system.num_domains(), Vec::new);
        for d in 0..system.num_domains() {
            let count = system.particle_count(d);
            self.multipliers[d].resize(count, 1.0);
            self.previous[d].resize(count, Vector3::zeros());
        }
    }
}

impl UpdateStrategy for AdaptiveSequentialUpdate {
    fn sweep(&mut self, system: &mut ParticleSystem, energy: &EnergyModel) -> SweepOutcome {
        self.fit_to(system);
        let mut outcome = SweepOutcome::default();
        for d in 0..system.num_domains() {
            for i in 0..system.particle_count(d) {
                let multiplier = self.multipliers[d][i];
                let step = energy.scaled_step(system, d, i, multiplier);

                let agreement = self.previous[d][i].dot(&step);
                let next = if agreement > 0.0 {
                    (multiplier * ADAPTIVE_GROWTH).min(ADAPTIVE_MAX_MULTIPLIER)
                } else if agreement < 0.0 {
                    (multiplier * 0.5).max(ADAPTIVE_MIN_MULTIPLIER)
                } else {
                    multiplier
                };
                self.multipliers[d][i] = next;
                self.previous[d][i] = step;

                move_particle(system, d, i, &step, &mut outcome);
            }
        }
        outcome
    }

    fn reset(&mut self) {
        trace!("Resetting adaptive step multipliers");
        self.multipliers.clear();
        self.previous.clear();
    }
}
