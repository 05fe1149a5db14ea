use crate::error::{AppError, Result};
use crate::models::{Incident, RiskLabel};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Members a class needs so that both sides of the split receive one
pub const MIN_CLASS_MEMBERS: usize = 2;

/// Disjoint, exhaustive train/test partition
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<Incident>,
    pub test: Vec<Incident>,
}

impl Split {
    pub fn train_distribution(&self) -> BTreeMap<RiskLabel, usize> {
        label_distribution(&self.train)
    }

    pub fn test_distribution(&self) -> BTreeMap<RiskLabel, usize> {
        label_distribution(&self.test)
    }
}

/// Count of incidents per risk label; unlabeled incidents are skipped
pub fn label_distribution(incidents: &[Incident]) -> BTreeMap<RiskLabel, usize> {
    let mut counts = BTreeMap::new();
    for label in incidents.iter().filter_map(Incident::risk_label) {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Label-stratified random splitter
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    test_fraction: f64,
    seed: u64,
}

impl StratifiedSplitter {
    pub fn new(test_fraction: f64, seed: u64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(AppError::Validation(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        Ok(Self {
            test_fraction,
            seed,
        })
    }

    /// Partition labeled incidents.
    ///
    /// Each label contributes `round(n_label * test_fraction)` rows to the test
    /// side, clamped so that train and test both get at least one. Incidents
    /// keep their original relative order on each side.
    pub fn split(&self, incidents: Vec<Incident>) -> Result<Split> {
        let mut by_label: BTreeMap<RiskLabel, Vec<usize>> = BTreeMap::new();
        for (idx, incident) in incidents.iter().enumerate() {
            let label = incident.risk_label().ok_or_else(|| {
                AppError::Processing(format!("incident {} has no risk label", incident.id))
            })?;
            by_label.entry(label).or_default().push(idx);
        }

        for (label, members) in &by_label {
            if members.len() < MIN_CLASS_MEMBERS {
                return Err(AppError::InsufficientClassMembers {
                    label: label.to_string(),
                    count: members.len(),
                    required: MIN_CLASS_MEMBERS,
                });
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut test_indices = HashSet::new();
        for members in by_label.values_mut() {
            members.shuffle(&mut rng);
            let n_test = ((members.len() as f64) * self.test_fraction).round() as usize;
            let n_test = n_test.clamp(1, members.len() - 1);
            test_indices.extend(members.iter().take(n_test).copied());
        }

        let (test, train): (Vec<_>, Vec<_>) = incidents
            .into_iter()
            .enumerate()
            .partition(|(idx, _)| test_indices.contains(idx));

        let split = Split {
            train: train.into_iter().map(|(_, incident)| incident).collect(),
            test: test.into_iter().map(|(_, incident)| incident).collect(),
        };

        info!(
            train = split.train.len(),
            test = split.test.len(),
            "Stratified split complete"
        );

        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(n: usize, label: RiskLabel, offset: usize) -> Vec<Incident> {
        (0..n)
            .map(|i| {
                let mut incident = Incident::new(format!("{}-{}", label, i + offset));
                incident.assign_label(label).unwrap();
                incident
            })
            .collect()
    }

    fn dataset() -> Vec<Incident> {
        let mut incidents = labeled(50, RiskLabel::Medium, 0);
        incidents.extend(labeled(30, RiskLabel::High, 0));
        incidents.extend(labeled(20, RiskLabel::Low, 0));
        incidents
    }

    #[test]
    fn test_split_is_disjoint_and_exhaustive() {
        let splitter = StratifiedSplitter::new(0.3, 42).unwrap();
        let split = splitter.split(dataset()).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 100);
        let train_ids: HashSet<_> = split.train.iter().map(|i| i.id.clone()).collect();
        assert!(split.test.iter().all(|i| !train_ids.contains(&i.id)));
    }

    #[test]
    fn test_proportions_are_preserved() {
        let splitter = StratifiedSplitter::new(0.3, 42).unwrap();
        let split = splitter.split(dataset()).unwrap();
        let test = split.test_distribution();
        let train = split.train_distribution();

        assert_eq!(test[&RiskLabel::Medium], 15);
        assert_eq!(test[&RiskLabel::High], 9);
        assert_eq!(test[&RiskLabel::Low], 6);
        assert_eq!(train[&RiskLabel::Medium], 35);
        assert_eq!(train[&RiskLabel::High], 21);
        assert_eq!(train[&RiskLabel::Low], 14);
    }

    #[test]
    fn test_split_is_reproducible() {
        let splitter = StratifiedSplitter::new(0.3, 7).unwrap();
        let a = splitter.split(dataset()).unwrap();
        let b = splitter.split(dataset()).unwrap();
        let ids = |v: &[Incident]| v.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a.test), ids(&b.test));
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let mut incidents = labeled(10, RiskLabel::Medium, 0);
        incidents.extend(labeled(1, RiskLabel::High, 0));
        let err = StratifiedSplitter::new(0.3, 42)
            .unwrap()
            .split(incidents)
            .unwrap_err();

        match err {
            AppError::InsufficientClassMembers {
                label,
                count,
                required,
            } => {
                assert_eq!(label, "HIGH");
                assert_eq!(count, 1);
                assert_eq!(required, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unlabeled_incident_is_rejected() {
        let splitter = StratifiedSplitter::new(0.3, 42).unwrap();
        assert!(splitter.split(vec![Incident::new("x")]).is_err());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(StratifiedSplitter::new(0.0, 1).is_err());
        assert!(StratifiedSplitter::new(1.0, 1).is_err());
    }
}
