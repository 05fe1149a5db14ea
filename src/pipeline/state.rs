use crate::ingest::LoadStats;
use crate::ml::{
    BuildStats, ClassifierStatus, ClusteringOutcome, Evaluation, FeatureEncoder, LabelingOutcome,
    Split,
};
use crate::models::Incident;

/// Everything one run has produced so far.
///
/// Stages take the state they need and add their outputs; nothing is kept in
/// process-wide globals, so independent runs never share fitted artifacts.
#[derive(Default)]
pub struct PipelineState {
    /// Incidents until the split, then empty (moved into `split`)
    pub incidents: Vec<Incident>,
    pub load_stats: LoadStats,
    pub build_stats: Option<BuildStats>,
    pub clustering: Option<ClusteringOutcome>,
    pub labeling: Option<LabelingOutcome>,
    pub split: Option<Split>,
    pub encoder: Option<FeatureEncoder>,
    pub classifier_status: Option<ClassifierStatus>,
    pub evaluation: Option<Evaluation>,
}

impl PipelineState {
    pub fn new(incidents: Vec<Incident>, load_stats: LoadStats) -> Self {
        Self {
            incidents,
            load_stats,
            ..Self::default()
        }
    }

    /// Incidents wherever they currently live
    pub fn all_incidents(&self) -> Box<dyn Iterator<Item = &Incident> + '_> {
        match &self.split {
            Some(split) => Box::new(split.train.iter().chain(split.test.iter())),
            None => Box::new(self.incidents.iter()),
        }
    }

    pub fn n_incidents(&self) -> usize {
        self.all_incidents().count()
    }

    /// Incidents with at least one numeric field imputed
    pub fn imputed_rows(&self) -> usize {
        self.all_incidents()
            .filter(|i| i.has_missing_numeric())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timings;

    #[test]
    fn test_counts_follow_the_split() {
        let complete = Incident::new("a").with_age(30.0).with_timings(Timings {
            response_min: Some(5.0),
            turnout_min: Some(1.0),
            call_cycle_min: Some(30.0),
            on_scene_min: Some(12.0),
        });
        let mut state = PipelineState::new(
            vec![complete.clone(), Incident::new("b")],
            LoadStats::default(),
        );
        assert_eq!(state.n_incidents(), 2);
        assert_eq!(state.imputed_rows(), 1);

        let incidents = std::mem::take(&mut state.incidents);
        state.split = Some(Split {
            train: incidents[..1].to_vec(),
            test: incidents[1..].to_vec(),
        });
        assert_eq!(state.n_incidents(), 2);
        assert_eq!(state.imputed_rows(), 1);
    }
}
