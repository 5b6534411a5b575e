use crate::core::models::system::{ParticleSystem, SystemError};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Places the first particle of every empty domain at the domain's seed point.
///
/// # Return
///
/// The number of domains that were seeded.
///
/// # Errors
///
/// Fails if some domains already hold particles while others are empty.
pub fn seed_empty_domains(system: &mut ParticleSystem) -> Result<usize, SystemError> {
    if system.num_domains() == 0 || system.num_particles() > 0 {
        return if system.is_balanced() {
            Ok(0)
        } else {
            Err(SystemError::Unbalanced)
        };
    }
    let seeds: Vec<_> = system.domains().iter().map(|d| d.surface_seed()).collect();
    system.add_correspondence(&seeds)?;
    debug!(domains = seeds.len(), "Seeded one particle per domain");
    Ok(seeds.len())
}

/// Doubles particle counts by splitting along random directions.
///
/// Directions are drawn from a seeded generator, one per correspondence index,
/// and shared by all domains.
#[derive(Debug, Clone)]
pub struct ParticleSplitter {
    rng: StdRng,
    epsilon: f64,
}

impl ParticleSplitter {
    pub fn new(seed: u64, epsilon: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            epsilon,
        }
    }

    pub fn split(&mut self, system: &mut ParticleSystem) -> Result<(), SystemError> {
        let offsets: Vec<Vector3<f64>> = (0..system.num_particles())
            .map(|_| self.random_direction() * self.epsilon)
            .collect();
        system.split_particles(&offsets)?;
        debug!(particles = system.num_particles(), "Split particles");
        Ok(())
    }

    fn random_direction(&mut self) -> Vector3<f64> {
        loop {
            let v = Vector3::new(
                2.0 * self.rng.r#gen::<f64>() - 1.0,
                2.0 * self.rng.r#gen::<f64>() - 1.0,
                2.0 * self.rng.r#gen::<f64>() - 1.0,
            );
            let norm_sq = v.norm_squared();
            if norm_sq > 1e-6 && norm_sq <= 1.0 {
                return v / norm_sq.sqrt();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Domain, RegionDomain};
    use nalgebra::Point3;

    fn region() -> Domain {
        RegionDomain::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0))
            .unwrap()
            .into()
    }

    #[test]
    fn empty_domains_get_one_seed_each() {
        let mut system = ParticleSystem::new();
        system.add_domain(region());
        system.add_domain(region());
        assert_eq!(seed_empty_domains(&mut system).unwrap(), 2);
        assert_eq!(system.particle_count(0), 1);
        assert_eq!(system.position(1, 0), Point3::origin());
        assert_eq!(seed_empty_domains(&mut system).unwrap(), 0);
    }

    #[test]
    fn seeding_rejects_partially_filled_systems() {
        let mut system = ParticleSystem::new();
        system.add_domain(region());
        system.add_domain(region());
        system.add_particle(0, &Point3::origin());
        assert_eq!(seed_empty_domains(&mut system), Err(SystemError::Unbalanced));
    }

    #[test]
    fn split_doubles_counts_with_shared_offsets() {
        let mut system = ParticleSystem::new();
        system.add_domain_with_particles(region(), &[Point3::origin()]).unwrap();
        system.add_domain_with_particles(region(), &[Point3::origin()]).unwrap();

        let mut splitter = ParticleSplitter::new(7, 0.1);
        splitter.split(&mut system).unwrap();
        splitter.split(&mut system).unwrap();

        assert_eq!(system.num_particles(), 4);
        assert!(system.is_balanced());
        assert_eq!(system.local_positions(0), system.local_positions(1));
        let gap = (system.position(0, 0) - system.position(0, 1)).norm();
        assert!(gap > 0.0);
    }

    #[test]
    fn same_seed_gives_same_split() {
        let build = || {
            let mut system = ParticleSystem::new();
            system.add_domain_with_particles(region(), &[Point3::origin()]).unwrap();
            ParticleSplitter::new(3, 0.05).split(&mut system).unwrap();
            system.local_positions(0).to_vec()
        };
        assert_eq!(build(), build());
    }
}
