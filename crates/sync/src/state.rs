use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::DefectDelta;

/// Aggregate defect metrics for the running session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefectSnapshot {
    pub total_defects: u64,
    pub defects_by_type: HashMap<String, u64>,
    pub sorting_success_rate: f64,
}

impl DefectSnapshot {
    /// Shallow merge: fields present in the delta overwrite, absent fields
    /// keep their current value. A present `defectsByType` replaces the
    /// whole map, individual type counts are never merged.
    pub fn apply(&mut self, delta: &DefectDelta) {
        if let Some(total) = delta.total_defects {
            self.total_defects = total;
        }
        if let Some(by_type) = &delta.defects_by_type {
            self.defects_by_type = by_type.clone();
        }
        if let Some(rate) = delta.sorting_success_rate {
            self.sorting_success_rate = rate;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmStatus {
    Idle,
    Running,
    Error,
    Stopping,
    #[serde(other)]
    Unknown,
}

impl ArmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmStatus::Idle => "idle",
            ArmStatus::Running => "running",
            ArmStatus::Error => "error",
            ArmStatus::Stopping => "stopping",
            ArmStatus::Unknown => "unknown",
        }
    }
}

/// The canonical in-memory snapshot. Owned by the sync event loop, which is
/// its only writer; consumers read published copies.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub defects: DefectSnapshot,
    pub arm_status: ArmStatus,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            defects: DefectSnapshot::default(),
            arm_status: ArmStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DefectDelta;

    fn snapshot(total: u64, by_type: &[(&str, u64)], rate: f64) -> DefectSnapshot {
        DefectSnapshot {
            total_defects: total,
            defects_by_type: by_type
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            sorting_success_rate: rate,
        }
    }

    // ========== Initial State ==========

    #[test]
    fn default_snapshot_is_zeroed() {
        let snapshot = DefectSnapshot::default();
        assert_eq!(snapshot.total_defects, 0);
        assert!(snapshot.defects_by_type.is_empty());
        assert_eq!(snapshot.sorting_success_rate, 0.0);
    }

    #[test]
    fn default_dashboard_status_is_unknown() {
        let state = DashboardState::default();
        assert_eq!(state.arm_status, ArmStatus::Unknown);
    }

    // ========== Merge Semantics ==========

    #[test]
    fn full_delta_overwrites_every_field() {
        let mut current = snapshot(5, &[("hole", 3), ("stain", 2)], 91.2);

        current.apply(&DefectDelta {
            total_defects: Some(7),
            defects_by_type: Some([("tear".to_string(), 1)].into_iter().collect()),
            sorting_success_rate: Some(88.0),
            new_defect: None,
        });

        assert_eq!(current, snapshot(7, &[("tear", 1)], 88.0));
    }

    #[test]
    fn absent_fields_are_left_untouched() {
        let mut current = snapshot(5, &[("hole", 3), ("stain", 2)], 91.2);

        current.apply(&DefectDelta {
            total_defects: Some(6),
            defects_by_type: None,
            sorting_success_rate: None,
            new_defect: None,
        });

        assert_eq!(current, snapshot(6, &[("hole", 3), ("stain", 2)], 91.2));
    }

    #[test]
    fn present_map_replaces_whole_map_not_key_merge() {
        let mut current = snapshot(5, &[("hole", 3), ("stain", 2)], 91.2);

        current.apply(&DefectDelta {
            total_defects: None,
            defects_by_type: Some([("tear".to_string(), 1)].into_iter().collect()),
            sorting_success_rate: None,
            new_defect: None,
        });

        // "hole" and "stain" are gone: the delta map wins wholesale.
        assert_eq!(current.defects_by_type.len(), 1);
        assert_eq!(current.defects_by_type.get("tear"), Some(&1));
        assert_eq!(current.total_defects, 5);
    }

    #[test]
    fn total_defects_is_last_writer_wins() {
        let mut current = DefectSnapshot::default();

        for total in [3, 5, 9] {
            current.apply(&DefectDelta {
                total_defects: Some(total),
                defects_by_type: None,
                sorting_success_rate: None,
                new_defect: None,
            });
        }

        assert_eq!(current.total_defects, 9);
    }

    #[test]
    fn empty_delta_is_a_no_op() {
        let mut current = snapshot(5, &[("hole", 3)], 91.2);
        let before = current.clone();

        current.apply(&DefectDelta::default());

        assert_eq!(current, before);
    }

    // ========== Wire Names ==========

    #[test]
    fn snapshot_deserializes_camel_case() {
        let parsed: DefectSnapshot = serde_json::from_str(
            r#"{"totalDefects":5,"defectsByType":{"hole":3,"stain":2},"sortingSuccessRate":91.2}"#,
        )
        .unwrap();

        assert_eq!(parsed, snapshot(5, &[("hole", 3), ("stain", 2)], 91.2));
    }

    #[test]
    fn arm_status_deserializes_lowercase() {
        let parsed: ArmStatus = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(parsed, ArmStatus::Running);
    }

    #[test]
    fn unrecognized_arm_status_maps_to_unknown() {
        let parsed: ArmStatus = serde_json::from_str(r#""calibrating""#).unwrap();
        assert_eq!(parsed, ArmStatus::Unknown);
    }
}
