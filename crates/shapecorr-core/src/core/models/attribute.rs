use crate::core::domain::Domain;
use nalgebra::Point3;
use std::fmt;

/// Mean and standard deviation of an attribute over one domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSummary {
    pub mean: f64,
    pub std_dev: f64,
}

/// A derived per-particle scalar kept in sync with a `ParticleSystem`.
///
/// The system calls the hooks synchronously after every mutation, so each hook
/// must run in constant amortized time. Attributes never move particles.
pub trait Attribute: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn domain_added(&mut self, domain_index: usize, domain: &Domain);

    fn particle_added(
        &mut self,
        domain_index: usize,
        particle_index: usize,
        domain: &Domain,
        local: &Point3<f64>,
    );

    fn position_set(
        &mut self,
        domain_index: usize,
        particle_index: usize,
        domain: &Domain,
        local: &Point3<f64>,
    );

    fn value(&self, domain_index: usize, particle_index: usize) -> Option<f64>;

    fn summary(&self, domain_index: usize) -> Option<AttributeSummary>;
}

/// Mean curvature of the domain surface at every particle, with running
/// per-domain sums so the summary is available without a rescan.
#[derive(Debug, Default, Clone)]
pub struct MeanCurvatureAttribute {
    values: Vec<Vec<f64>>,
    sums: Vec<f64>,
    sums_of_squares: Vec<f64>,
}

impl MeanCurvatureAttribute {
    pub const NAME: &'static str = "mean-curvature";

    pub fn new() -> Self {
        Self::default()
    }

    fn store(&mut self, domain_index: usize, particle_index: usize, kappa: f64) {
        let slot = &mut self.values[domain_index];
        if particle_index >= slot.len() {
            slot.resize(particle_index + 1, 0.0);
        } else {
            let old = slot[particle_index];
            self.sums[domain_index] -= old;
            self.sums_of_squares[domain_index] -= old * old;
        }
        slot[particle_index] = kappa;
        self.sums[domain_index] += kappa;
        self.sums_of_squares[domain_index] += kappa * kappa;
    }
}

impl Attribute for MeanCurvatureAttribute {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn domain_added(&mut self, domain_index: usize, _domain: &Domain) {
        if domain_index >= self.values.len() {
            self.values.resize_with(domain_index + 1, Vec::new);
            self.sums.resize(domain_index + 1, 0.0);
            self.sums_of_squares.resize(domain_index + 1, 0.0);
        }
    }

    fn particle_added(
        &mut self,
        domain_index: usize,
        particle_index: usize,
        domain: &Domain,
        local: &Point3<f64>,
    ) {
        self.store(domain_index, particle_index, domain.sample_curvature(local));
    }

    fn position_set(
        &mut self,
        domain_index: usize,
        particle_index: usize,
        domain: &Domain,
        local: &Point3<f64>,
    ) {
        self.store(domain_index, particle_index, domain.sample_curvature(local));
    }

    fn value(&self, domain_index: usize, particle_index: usize) -> Option<f64> {
        self.values.get(domain_index)?.get(particle_index).copied()
    }

    fn summary(&self, domain_index: usize) -> Option<AttributeSummary> {
        let count = self.values.get(domain_index)?.len();
        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = self.sums[domain_index] / n;
        let variance = (self.sums_of_squares[domain_index] / n - mean * mean).max(0.0);
        Some(AttributeSummary {
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::RegionDomain;

    fn region() -> Domain {
        RegionDomain::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap()
            .into()
    }

    #[test]
    fn running_summary_tracks_replacements() {
        let domain = region();
        let mut attr = MeanCurvatureAttribute::new();
        attr.domain_added(0, &domain);
        attr.store(0, 0, 1.0);
        attr.store(0, 1, 3.0);
        let summary = attr.summary(0).unwrap();
        assert!((summary.mean - 2.0).abs() < 1e-12);
        assert!((summary.std_dev - 1.0).abs() < 1e-12);

        attr.store(0, 1, 1.0);
        let summary = attr.summary(0).unwrap();
        assert!((summary.mean - 1.0).abs() < 1e-12);
        assert!(summary.std_dev.abs() < 1e-6);
        assert_eq!(attr.value(0, 1), Some(1.0));
    }

    #[test]
    fn empty_domain_has_no_summary() {
        let mut attr = MeanCurvatureAttribute::new();
        attr.domain_added(0, &region());
        assert!(attr.summary(0).is_none());
        assert!(attr.summary(3).is_none());
        assert!(attr.value(0, 0).is_none());
    }
}
