use super::config::{ConfigError, OptimizationConfig};
use super::energy::EnergyModel;
use super::error::EngineError;
use super::procrustes::ProcrustesRegistrar;
use super::progress::{Progress, ProgressReporter};
use super::seeding::{ParticleSplitter, seed_empty_domains};
use super::state::{OptimizationResult, OptimizerStatus, ScaleDiagnostics, ScheduleState};
use super::update::{UpdateStrategy, strategy_for};
use crate::core::models::attribute::MeanCurvatureAttribute;
use crate::core::models::system::ParticleSystem;
use tracing::{debug, info, instrument, warn};

/// Multi-scale particle optimizer.
///
/// Owns the particle system for the duration of the run. Each scale starts by
/// doubling the particle count (except the first) and then sweeps until the
/// largest particle displacement drops below the scale's tolerance or its
/// iteration budget is spent.
pub struct Optimizer<'a> {
    system: ParticleSystem,
    config: OptimizationConfig,
    reporter: &'a ProgressReporter<'a>,
    energy: EnergyModel,
    strategy: Box<dyn UpdateStrategy>,
    registrar: ProcrustesRegistrar,
    splitter: ParticleSplitter,
    state: ScheduleState,
    diagnostics: Vec<ScaleDiagnostics>,
}

impl<'a> Optimizer<'a> {
    /// Validates `system` against `config` and prepares the first scale.
    ///
    /// Cutting planes are installed on their domains, a mean-curvature
    /// attribute is registered if none is present, and every empty domain
    /// receives one seed particle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the system has no domains, holds
    /// unequal particle counts, or the cutting plane list does not match the
    /// domain count, and [`EngineError::Domain`] if a plane targets a domain
    /// that cannot carry one.
    #[instrument(skip_all, name = "optimizer_setup")]
    pub fn new(
        mut system: ParticleSystem,
        config: OptimizationConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        if system.num_domains() == 0 {
            return Err(ConfigError::NoDomains.into());
        }
        if !system.is_balanced() {
            return Err(ConfigError::UnbalancedSystem.into());
        }
        config.cutting_planes.check_domain_count(system.num_domains())?;

        for d in 0..system.num_domains() {
            if let Some([a, b, c]) = config.cutting_planes.for_domain(d) {
                if !system.domain_mut(d).set_cutting_plane(a, b, c)? {
                    warn!(domain = d, "Cutting plane points are collinear; domain left unclipped");
                }
            }
        }

        if system.find_attribute(MeanCurvatureAttribute::NAME).is_none() {
            system.register_attribute(Box::new(MeanCurvatureAttribute::new()));
        }
        seed_empty_domains(&mut system)?;

        let energy =
            EnergyModel::standard(config.shape_entropy_weighting, config.curvature_adaptivity);
        info!(
            domains = system.num_domains(),
            particles = system.num_particles(),
            scales = config.num_scales,
            mode = ?config.update_mode,
            terms = ?energy.term_names(),
            "Optimizer ready"
        );

        Ok(Self {
            energy,
            strategy: strategy_for(config.update_mode),
            registrar: ProcrustesRegistrar::new(config.procrustes_scaling),
            splitter: ParticleSplitter::new(config.seed, config.split_epsilon),
            state: ScheduleState::default(),
            diagnostics: Vec::with_capacity(config.num_scales),
            system,
            config,
            reporter,
        })
    }

    /// Performs one sweep, finishing and starting scales as needed.
    ///
    /// # Return
    ///
    /// `true` while more work remains, `false` once the last scale finished.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Finished`] when called after completion, and
    /// propagates energy, splitting and Procrustes failures.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        if self.state.finished {
            return Err(EngineError::Finished);
        }
        loop {
            if !self.state.scale_started {
                self.begin_scale()?;
            }
            let scale = self.state.scale;
            let budget_spent = self.state.scale_iteration >= self.config.max_iterations[scale];
            let converged = self.state.scale_iteration > 0
                && self.state.max_displacement < self.config.tolerance[scale];
            if budget_spent || converged {
                self.finish_scale(converged);
                if self.state.finished {
                    return Ok(false);
                }
                continue;
            }
            self.sweep()?;
            return Ok(true);
        }
    }

    /// Runs every remaining scale to completion.
    #[instrument(skip_all, name = "optimization")]
    pub fn run(&mut self) -> Result<(), EngineError> {
        while self.step()? {}
        info!(
            iterations = self.state.total_iterations,
            particles = self.system.num_particles(),
            "Optimization complete"
        );
        Ok(())
    }

    pub fn status(&self) -> OptimizerStatus {
        OptimizerStatus {
            iteration: self.state.total_iterations,
            scale_iteration: self.state.scale_iteration,
            scale: self.state.scale,
            num_scales: self.config.num_scales,
            regularization: self.state.regularization,
            pca_variances: self.state.pca_variances.clone(),
            max_displacement: self.state.max_displacement,
            particles: self.system.num_particles(),
            finished: self.state.finished,
        }
    }

    pub fn system(&self) -> &ParticleSystem {
        &self.system
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn scale_diagnostics(&self) -> &[ScaleDiagnostics] {
        &self.diagnostics
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Releases the particle system and the per-scale diagnostics.
    pub fn into_result(self) -> OptimizationResult {
        OptimizationResult {
            system: self.system,
            scale_diagnostics: self.diagnostics,
        }
    }

    fn begin_scale(&mut self) -> Result<(), EngineError> {
        let scale = self.state.scale;
        if scale > 0 {
            self.splitter.split(&mut self.system)?;
        }
        self.strategy.reset();
        self.state.scale_started = true;
        self.state.scale_iteration = 0;
        self.state.procrustes_counter = 0;
        self.state.max_displacement = f64::INFINITY;
        self.state.regularization = self.config.regularization_at(scale, 0);

        let particles = self.system.num_particles();
        info!(scale, particles, "Starting scale");
        self.reporter.report(Progress::ScaleStart {
            scale,
            num_scales: self.config.num_scales,
            particles,
            max_iterations: self.config.max_iterations[scale],
        });
        Ok(())
    }

    fn finish_scale(&mut self, converged: bool) {
        let scale = self.state.scale;
        let iterations = self.state.scale_iteration;
        info!(scale, iterations, converged, "Scale finished");
        self.diagnostics.push(ScaleDiagnostics {
            scale,
            particles: self.system.num_particles(),
            iterations,
            converged,
            pca_variances: self.state.pca_variances.clone(),
        });
        self.reporter.report(Progress::ScaleFinish {
            scale,
            iterations,
            converged,
        });

        if scale + 1 >= self.config.num_scales {
            self.state.finished = true;
        } else {
            self.state.scale += 1;
            self.state.scale_started = false;
        }
    }

    fn sweep(&mut self) -> Result<(), EngineError> {
        let scale = self.state.scale;
        let regularization = self
            .config
            .regularization_at(scale, self.state.scale_iteration);
        self.state.regularization = regularization;

        self.energy.prepare(&self.system, regularization)?;
        let outcome = self.strategy.sweep(&mut self.system, &self.energy);
        if outcome.unconverged > 0 {
            warn!(
                count = outcome.unconverged,
                "Some particles could not be projected onto their surface"
            );
        }
        if outcome.loosened > 0 {
            debug!(
                count = outcome.loosened,
                "Some particles met the surface only under a relaxed tolerance"
            );
        }

        self.state.scale_iteration += 1;
        self.state.total_iterations += 1;
        self.state.max_displacement = outcome.max_displacement;
        self.state.pca_variances = self.energy.mode_variances();
        debug!(
            iteration = self.state.total_iterations,
            max_displacement = outcome.max_displacement,
            regularization,
            "Sweep complete"
        );

        self.maybe_register()?;

        if self.state.total_iterations % self.config.report_interval == 0 {
            self.reporter.report(Progress::Iteration(self.status()));
        }
        Ok(())
    }

    fn maybe_register(&mut self) -> Result<(), EngineError> {
        let interval = self.config.procrustes_interval[self.state.scale];
        if interval == 0
            || self.system.num_domains() < 2
            || self.system.num_particles() < self.config.procrustes_min_particles
        {
            return Ok(());
        }
        self.state.procrustes_counter += 1;
        if self.state.procrustes_counter < interval {
            return Ok(());
        }
        self.state.procrustes_counter = 0;
        self.registrar.run(&mut self.system)?;
        debug!(iteration = self.state.total_iterations, "Procrustes registration applied");
        self.reporter.report(Progress::ProcrustesApplied {
            iteration: self.state.total_iterations,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::field::ScalarField;
    use crate::core::domain::{Domain, ImplicitSurfaceDomain, RegionDomain};
    use crate::engine::config::{CuttingPlanes, OptimizationConfigBuilder, UpdateMode};
    use nalgebra::{Point3, Vector3};
    use std::sync::Mutex;

    fn sphere(radius: f64) -> Domain {
        let field = ScalarField::from_fn(
            [25, 25, 25],
            Point3::new(-6.0, -6.0, -6.0),
            Vector3::repeat(0.5),
            |p| p.coords.norm() - radius,
        )
        .unwrap();
        ImplicitSurfaceDomain::new(field).into()
    }

    fn spheres(radii: &[f64]) -> ParticleSystem {
        let mut system = ParticleSystem::new();
        for &r in radii {
            system.add_domain(sphere(r));
        }
        system
    }

    fn config(scales: usize, iterations: usize) -> OptimizationConfigBuilder {
        OptimizationConfigBuilder::new()
            .num_scales(scales)
            .max_iterations(vec![iterations; scales])
            .tolerance(vec![0.0; scales])
    }

    #[test]
    fn new_rejects_empty_and_unbalanced_systems() {
        let reporter = ProgressReporter::new();
        let cfg = config(1, 1).build().unwrap();
        let err = Optimizer::new(ParticleSystem::new(), cfg.clone(), &reporter).err().unwrap();
        assert!(matches!(err, EngineError::Config { source: ConfigError::NoDomains }));

        let mut system = spheres(&[2.0, 2.0]);
        system.add_particle(0, &Point3::new(2.0, 0.0, 0.0));
        let err = Optimizer::new(system, cfg, &reporter).err().unwrap();
        assert!(matches!(err, EngineError::Config { source: ConfigError::UnbalancedSystem }));
    }

    #[test]
    fn new_rejects_plane_count_mismatch() {
        let reporter = ProgressReporter::new();
        let plane = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let cfg = config(1, 1)
            .cutting_planes(CuttingPlanes::PerDomain(vec![plane]))
            .build()
            .unwrap();
        let err = Optimizer::new(spheres(&[2.0, 2.0]), cfg, &reporter).err().unwrap();
        assert!(matches!(
            err,
            EngineError::Config {
                source: ConfigError::CuttingPlaneCount { expected: 2, found: 1 }
            }
        ));
    }

    #[test]
    fn planes_on_region_domains_are_rejected() {
        let reporter = ProgressReporter::new();
        let plane = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let cfg = config(1, 1).cutting_planes(CuttingPlanes::One(plane)).build().unwrap();
        let mut system = ParticleSystem::new();
        system.add_domain(
            RegionDomain::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0))
                .unwrap()
                .into(),
        );
        let err = Optimizer::new(system, cfg, &reporter).err().unwrap();
        assert!(matches!(err, EngineError::Domain { .. }));
    }

    #[test]
    fn scales_double_particles_and_keep_them_on_the_surface() {
        let reporter = ProgressReporter::new();
        let cfg = config(4, 5).build().unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.5, 3.0]), cfg, &reporter).unwrap();
        optimizer.run().unwrap();

        let result = optimizer.into_result();
        let counts: Vec<_> = result.scale_diagnostics.iter().map(|d| d.particles).collect();
        assert_eq!(counts, vec![1, 2, 4, 8]);
        assert!(result.system.is_balanced());

        for (d, radius) in [2.0, 2.5, 3.0].into_iter().enumerate() {
            for p in result.system.local_positions(d) {
                assert!((p.coords.norm() - radius).abs() < 0.05, "{p} off sphere {radius}");
            }
        }
    }

    #[test]
    fn step_performs_one_sweep_and_then_reports_finished() {
        let reporter = ProgressReporter::new();
        let cfg = config(1, 2).build().unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.0]), cfg, &reporter).unwrap();

        assert!(optimizer.step().unwrap());
        assert_eq!(optimizer.status().iteration, 1);
        assert!(optimizer.step().unwrap());
        assert_eq!(optimizer.status().iteration, 2);
        assert!(!optimizer.step().unwrap());
        assert!(optimizer.status().finished);
        assert!(matches!(optimizer.step(), Err(EngineError::Finished)));
    }

    #[test]
    fn tolerance_stops_a_scale_early() {
        let reporter = ProgressReporter::new();
        let cfg = OptimizationConfigBuilder::new()
            .num_scales(1)
            .max_iterations(vec![500])
            .tolerance(vec![1e9])
            .build()
            .unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.0]), cfg, &reporter).unwrap();
        optimizer.run().unwrap();
        let diagnostics = optimizer.scale_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].iterations, 1);
        assert!(diagnostics[0].converged);
    }

    #[test]
    fn reporter_receives_scale_and_iteration_events() {
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let tag = match event {
                Progress::ScaleStart { .. } => "start",
                Progress::ScaleFinish { .. } => "finish",
                Progress::Iteration(_) => "iteration",
                Progress::ProcrustesApplied { .. } => "procrustes",
                Progress::Message(_) => "message",
            };
            events.lock().unwrap().push(tag);
        }));
        let cfg = config(2, 4).report_interval(2).build().unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.0]), cfg, &reporter).unwrap();
        optimizer.run().unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start",
                "iteration",
                "iteration",
                "finish",
                "start",
                "iteration",
                "iteration",
                "finish",
            ]
        );
    }

    #[test]
    fn procrustes_runs_on_its_interval() {
        let count = Mutex::new(0usize);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::ProcrustesApplied { .. } = event {
                *count.lock().unwrap() += 1;
            }
        }));
        let cfg = config(3, 6)
            .procrustes_interval(vec![2; 3])
            .procrustes_min_particles(4)
            .build()
            .unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.2]), cfg, &reporter).unwrap();
        optimizer.run().unwrap();
        // Only the last scale reaches four particles.
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn procrustes_threshold_is_checked_before_the_first_sweep() {
        let err = config(2, 3)
            .procrustes_interval(vec![1; 2])
            .procrustes_min_particles(1)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "procrustes_min_particles", .. }
        ));

        let reporter = ProgressReporter::new();
        let cfg = config(2, 3)
            .procrustes_interval(vec![1; 2])
            .procrustes_min_particles(3)
            .build()
            .unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 2.0]), cfg, &reporter).unwrap();
        assert!(optimizer.run().is_ok());
    }

    #[test]
    fn every_update_mode_keeps_counts_equal() {
        for mode in [
            UpdateMode::Simultaneous,
            UpdateMode::Sequential,
            UpdateMode::AdaptiveSequential,
        ] {
            let reporter = ProgressReporter::new();
            let cfg = config(3, 3).update_mode(mode).build().unwrap();
            let mut optimizer = Optimizer::new(spheres(&[2.0, 3.0]), cfg, &reporter).unwrap();
            optimizer.run().unwrap();
            let system = optimizer.system();
            assert_eq!(system.particle_count(0), 4);
            assert_eq!(system.particle_count(1), 4);
        }
    }

    #[test]
    fn status_exposes_pca_variances_for_populations() {
        let reporter = ProgressReporter::new();
        let cfg = config(2, 2).build().unwrap();
        let mut optimizer = Optimizer::new(spheres(&[2.0, 3.0, 4.0]), cfg, &reporter).unwrap();
        optimizer.run().unwrap();
        let status = optimizer.status();
        assert_eq!(status.pca_variances.len(), 3);
        assert!(status.pca_variances[0] > 0.0);
        assert_eq!(status.particles, 2);
    }
}
