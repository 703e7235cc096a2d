//! Persisted record of one pipeline tick, one JSON file per run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stages::StageMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub metrics: StageMetrics,
    /// Set when the stage itself fell over; its metrics are then zeroes.
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageReport>,
    pub status_counts: BTreeMap<String, u64>,
}

impl RunReport {
    pub fn save(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let filename = format!(
            "run-{}-{}.json",
            self.started_at.format("%Y%m%dT%H%M%S"),
            self.run_id
        );
        let path = dir.join(filename);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// True when any stage recorded a fault.
    pub fn has_faults(&self) -> bool {
        self.stages.iter().any(|s| s.fault.is_some())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} at {} ({} ms)",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.duration_ms
        )?;
        for stage in &self.stages {
            match &stage.fault {
                Some(fault) => writeln!(f, "  {:<10} FAULT: {fault}", stage.name)?,
                None => writeln!(f, "  {:<10} {}", stage.name, stage.metrics)?,
            }
        }
        let counts: Vec<String> = self
            .status_counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(s, n)| format!("{s}={n}"))
            .collect();
        write!(f, "  articles: {}", counts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_faults_and_counts() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 42,
            stages: vec![
                StageReport {
                    name: "curation".to_string(),
                    metrics: StageMetrics {
                        attempted: 2,
                        succeeded: 1,
                        failed: 1,
                    },
                    fault: None,
                },
                StageReport {
                    name: "image".to_string(),
                    metrics: StageMetrics::default(),
                    fault: Some("store unreachable".to_string()),
                },
            ],
            status_counts: BTreeMap::from([
                ("raw".to_string(), 3),
                ("processed".to_string(), 0),
            ]),
        };
        let text = report.to_string();
        assert!(text.contains("curation"));
        assert!(text.contains("2 attempted, 1 succeeded, 1 failed"));
        assert!(text.contains("FAULT: store unreachable"));
        assert!(text.contains("raw=3"));
        assert!(!text.contains("processed=0"));
        assert!(report.has_faults());
    }
}
