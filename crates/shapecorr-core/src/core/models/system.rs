use super::attribute::Attribute;
use super::transform::Transform;
use crate::core::domain::{Domain, Projection};
use nalgebra::{Point3, Vector3};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("Expected {expected} particles for the new domain, found {found}")]
    ParticleCountMismatch { expected: usize, found: usize },
    #[error("Expected one transform per domain ({expected}), found {found}")]
    TransformCountMismatch { expected: usize, found: usize },
    #[error("Expected one point per domain ({expected}), found {found}")]
    CorrespondenceArity { expected: usize, found: usize },
    #[error("Expected one split offset per particle ({expected}), found {found}")]
    OffsetCountMismatch { expected: usize, found: usize },
    #[error("Domains hold different particle counts")]
    Unbalanced,
}

/// Handle returned by [`ParticleSystem::register_attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeId(usize);

/// Per-domain ordered particle store.
///
/// Particle `i` of every domain is the same correspondence point. Positions are
/// stored in each domain's local frame; the domain's [`Transform`] maps them into
/// the shared global frame. Every position that enters the store is first passed
/// through [`Domain::apply_constraints`], and every registered [`Attribute`] is
/// notified before the mutating call returns.
#[derive(Debug, Default)]
pub struct ParticleSystem {
    /// Geometric oracle of each shape.
    domains: Vec<Domain>,
    /// Local positions, indexed by domain then correspondence index.
    positions: Vec<Vec<Point3<f64>>>,
    /// Local-to-global transform of each domain.
    transforms: Vec<Transform>,
    /// Observers notified after each mutation.
    attributes: Vec<Box<dyn Attribute>>,
}

impl ParticleSystem {
    /// Creates an empty system with no domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a domain with no particles and an identity transform.
    ///
    /// # Return
    ///
    /// The index of the new domain.
    pub fn add_domain(&mut self, domain: Domain) -> usize {
        let index = self.domains.len();
        debug!(index, kind = %domain.kind(), "Adding domain");
        self.domains.push(domain);
        self.positions.push(Vec::new());
        self.transforms.push(Transform::identity());
        for attribute in &mut self.attributes {
            attribute.domain_added(index, &self.domains[index]);
        }
        index
    }

    /// Appends a domain together with its particles.
    ///
    /// The domain is attached only if `points` has as many entries as every
    /// existing domain has particles; otherwise the system is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::ParticleCountMismatch`] on a count mismatch.
    pub fn add_domain_with_particles(
        &mut self,
        domain: Domain,
        points: &[Point3<f64>],
    ) -> Result<usize, SystemError> {
        if !self.domains.is_empty() {
            let expected = self.num_particles();
            if points.len() != expected {
                return Err(SystemError::ParticleCountMismatch {
                    expected,
                    found: points.len(),
                });
            }
        }
        let index = self.add_domain(domain);
        for point in points {
            self.add_particle(index, point);
        }
        Ok(index)
    }

    /// Appends a particle to one domain after constraining it.
    ///
    /// Callers adding a correspondence point across the population should use
    /// [`ParticleSystem::add_correspondence`] so counts stay equal.
    ///
    /// # Panics
    ///
    /// Panics if `domain` is out of range.
    pub fn add_particle(&mut self, domain: usize, local: &Point3<f64>) -> Projection {
        let projection = self.domains[domain].apply_constraints(local);
        let index = self.positions[domain].len();
        self.positions[domain].push(projection.point);
        for attribute in &mut self.attributes {
            attribute.particle_added(domain, index, &self.domains[domain], &projection.point);
        }
        projection
    }

    /// Adds one particle to every domain.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::CorrespondenceArity`] unless exactly one point per
    /// domain is supplied, and [`SystemError::Unbalanced`] if the domains do not
    /// already hold equal counts. Nothing is added on error.
    pub fn add_correspondence(&mut self, locals: &[Point3<f64>]) -> Result<usize, SystemError> {
        if locals.len() != self.domains.len() {
            return Err(SystemError::CorrespondenceArity {
                expected: self.domains.len(),
                found: locals.len(),
            });
        }
        if !self.is_balanced() {
            return Err(SystemError::Unbalanced);
        }
        let index = self.num_particles();
        for (domain, local) in locals.iter().enumerate() {
            self.add_particle(domain, local);
        }
        Ok(index)
    }

    /// Moves a particle, constraining the target first.
    ///
    /// # Panics
    ///
    /// Panics if `domain` or `index` is out of range.
    pub fn set_position(&mut self, domain: usize, index: usize, local: &Point3<f64>) -> Projection {
        let projection = self.domains[domain].apply_constraints(local);
        self.positions[domain][index] = projection.point;
        for attribute in &mut self.attributes {
            attribute.position_set(domain, index, &self.domains[domain], &projection.point);
        }
        projection
    }

    /// Doubles the particle count of every domain.
    ///
    /// Particle `i` moves to `p - t` and a new particle `n + i` is placed at
    /// `p + t`, where `t` is `offsets[i]` restricted to the domain's tangent
    /// plane at `p`. The same offset is used for every domain so new particles
    /// start in correspondence.
    ///
    /// # Errors
    ///
    /// Fails without modifying anything if the system is unbalanced or if
    /// `offsets` does not hold one vector per particle.
    pub fn split_particles(&mut self, offsets: &[Vector3<f64>]) -> Result<(), SystemError> {
        if !self.is_balanced() {
            return Err(SystemError::Unbalanced);
        }
        let count = self.num_particles();
        if offsets.len() != count {
            return Err(SystemError::OffsetCountMismatch {
                expected: count,
                found: offsets.len(),
            });
        }

        for domain in 0..self.domains.len() {
            for (index, offset) in offsets.iter().enumerate() {
                let p = self.positions[domain][index];
                let tangent = self.domains[domain]
                    .apply_vector_constraints(offset, &p, f64::INFINITY)
                    .update;
                let t = if tangent.norm() > f64::EPSILON * offset.norm().max(1.0) {
                    tangent * (offset.norm() / tangent.norm())
                } else {
                    *offset
                };
                self.set_position(domain, index, &(p - t));
                self.add_particle(domain, &(p + t));
            }
        }
        Ok(())
    }

    /// Registers an observer and replays the current contents to it.
    ///
    /// # Return
    ///
    /// A handle for [`ParticleSystem::attribute`].
    pub fn register_attribute(&mut self, mut attribute: Box<dyn Attribute>) -> AttributeId {
        for (d, domain) in self.domains.iter().enumerate() {
            attribute.domain_added(d, domain);
            for (i, p) in self.positions[d].iter().enumerate() {
                attribute.particle_added(d, i, domain, p);
            }
        }
        debug!(name = attribute.name(), "Registered attribute");
        self.attributes.push(attribute);
        AttributeId(self.attributes.len() - 1)
    }

    pub fn attribute(&self, id: AttributeId) -> &dyn Attribute {
        self.attributes[id.0].as_ref()
    }

    pub fn find_attribute(&self, name: &str) -> Option<AttributeId> {
        self.attributes
            .iter()
            .position(|a| a.name() == name)
            .map(AttributeId)
    }

    /// Replaces every domain's transform at once.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::TransformCountMismatch`] if `transforms` does not
    /// hold exactly one entry per domain; the old transforms are kept.
    pub fn set_transforms(&mut self, transforms: Vec<Transform>) -> Result<(), SystemError> {
        if transforms.len() != self.domains.len() {
            return Err(SystemError::TransformCountMismatch {
                expected: self.domains.len(),
                found: transforms.len(),
            });
        }
        self.transforms = transforms;
        Ok(())
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    /// Particle count of the first domain, or zero with no domains.
    pub fn num_particles(&self) -> usize {
        self.positions.first().map_or(0, Vec::len)
    }

    pub fn particle_count(&self, domain: usize) -> usize {
        self.positions[domain].len()
    }

    /// `true` when every domain holds the same number of particles.
    pub fn is_balanced(&self) -> bool {
        let n = self.num_particles();
        self.positions.iter().all(|p| p.len() == n)
    }

    pub fn domain(&self, index: usize) -> &Domain {
        &self.domains[index]
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Mutable access for configuration before optimization (e.g. cutting planes).
    pub fn domain_mut(&mut self, index: usize) -> &mut Domain {
        &mut self.domains[index]
    }

    pub fn transform(&self, domain: usize) -> &Transform {
        &self.transforms[domain]
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn position(&self, domain: usize, index: usize) -> Point3<f64> {
        self.positions[domain][index]
    }

    pub fn global_position(&self, domain: usize, index: usize) -> Point3<f64> {
        self.transforms[domain].apply(&self.positions[domain][index])
    }

    pub fn local_positions(&self, domain: usize) -> &[Point3<f64>] {
        &self.positions[domain]
    }

    pub fn global_positions(&self, domain: usize) -> Vec<Point3<f64>> {
        let transform = &self.transforms[domain];
        self.positions[domain]
            .iter()
            .map(|p| transform.apply(p))
            .collect()
    }
}
