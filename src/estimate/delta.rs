use crate::error::DataAnomaly;
use crate::model::snapshot::VideoSnapshot;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Accepted elapsed time between the prior and the current snapshot, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DeltaWindow {
    pub fn new(min: Duration, max: Duration) -> Self {
        DeltaWindow { min, max }
    }

    pub fn contains(&self, elapsed: Duration) -> bool {
        elapsed >= self.min && elapsed <= self.max
    }
}

impl Default for DeltaWindow {
    fn default() -> Self {
        DeltaWindow::new(Duration::hours(12), Duration::hours(36))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatedDelta {
    pub video_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub estimated_views_in_window: u64,
    pub anomalies: Vec<DataAnomaly>,
}

impl EstimatedDelta {
    pub fn elapsed(&self) -> Duration {
        self.window_end - self.window_start
    }

    pub fn is_anomalous(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotApplicable {
    /// First observation of this video.
    NoPriorSnapshot,
    /// Duplicate prior rows are still reported in `anomalies`.
    OutsideWindow {
        elapsed: Duration,
        anomalies: Vec<DataAnomaly>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOutcome {
    Estimated(EstimatedDelta),
    NotApplicable(NotApplicable),
}

impl DeltaOutcome {
    pub fn estimate(&self) -> Option<&EstimatedDelta> {
        match self {
            DeltaOutcome::Estimated(delta) => Some(delta),
            DeltaOutcome::NotApplicable(_) => None,
        }
    }

    pub fn anomalies(&self) -> &[DataAnomaly] {
        match self {
            DeltaOutcome::Estimated(delta) => &delta.anomalies,
            DeltaOutcome::NotApplicable(NotApplicable::OutsideWindow { anomalies, .. }) => anomalies,
            DeltaOutcome::NotApplicable(NotApplicable::NoPriorSnapshot) => &[],
        }
    }
}

/// Estimates the views `current` gained since the most recent prior snapshot of
/// the same video in `history`. `history` must be in store insertion order:
/// among rows sharing the latest prior `fetched_at`, the last one wins.
pub fn estimate<'a, I>(current: &VideoSnapshot, history: I, window: &DeltaWindow) -> DeltaOutcome
where
    I: IntoIterator<Item = &'a VideoSnapshot>,
{
    let mut prior: Option<&VideoSnapshot> = None;
    let mut ties = 0usize;

    for candidate in history {
        if candidate.video_id != current.video_id || candidate.fetched_at >= current.fetched_at {
            continue;
        }

        match prior {
            Some(best) if candidate.fetched_at < best.fetched_at => {}
            Some(best) if candidate.fetched_at == best.fetched_at => {
                prior = Some(candidate);
                ties += 1;
            }
            _ => {
                prior = Some(candidate);
                ties = 1;
            }
        }
    }

    let Some(prior) = prior else {
        return DeltaOutcome::NotApplicable(NotApplicable::NoPriorSnapshot);
    };

    let mut anomalies = Vec::new();
    if ties > 1 {
        anomalies.push(DataAnomaly::DuplicateTimestamp {
            video_id: current.video_id.clone(),
            fetched_at: prior.fetched_at,
            count: ties,
        });
    }

    let elapsed = current.fetched_at - prior.fetched_at;
    if !window.contains(elapsed) {
        return DeltaOutcome::NotApplicable(NotApplicable::OutsideWindow { elapsed, anomalies });
    }

    let estimated_views_in_window = match current.view_count.checked_sub(prior.view_count) {
        Some(gained) => gained,
        None => {
            anomalies.push(DataAnomaly::ViewCountDecreased {
                video_id: current.video_id.clone(),
                prior: prior.view_count,
                current: current.view_count,
            });
            0
        }
    };

    DeltaOutcome::Estimated(EstimatedDelta {
        video_id: current.video_id.clone(),
        window_start: prior.fetched_at,
        window_end: current.fetched_at,
        estimated_views_in_window,
        anomalies,
    })
}

/// Runs `estimate` for every current snapshot, indexing the history by video once.
pub fn estimate_all(
    currents: &[VideoSnapshot],
    history: &[VideoSnapshot],
    window: &DeltaWindow,
) -> Vec<DeltaOutcome> {
    let mut by_video: HashMap<&str, Vec<&VideoSnapshot>> = HashMap::new();
    for snapshot in history {
        by_video
            .entry(snapshot.video_id.as_str())
            .or_default()
            .push(snapshot);
    }

    currents
        .iter()
        .map(|current| match by_video.get(current.video_id.as_str()) {
            Some(rows) => estimate(current, rows.iter().copied(), window),
            None => DeltaOutcome::NotApplicable(NotApplicable::NoPriorSnapshot),
        })
        .collect()
}
