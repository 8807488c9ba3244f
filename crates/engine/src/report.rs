//! Run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sinf_common::config::EngineConfig;
use uuid::Uuid;

/// Summary of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Stage that produced the report: edges, nodes, run or retention
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub n_workers: usize,
    pub edge_rows: usize,
    pub edges: usize,
    pub attribute_rows: usize,
    pub nodes: usize,
    pub transitions_scored: u64,
    pub transitions_skipped: u64,
    pub engine: EngineConfig,
    pub version: String,
}

impl RunReport {
    pub fn begin(command: &str, n_workers: usize, engine: &EngineConfig) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            command: command.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            n_workers,
            edge_rows: 0,
            edges: 0,
            attribute_rows: 0,
            nodes: 0,
            transitions_scored: 0,
            transitions_skipped: 0,
            engine: engine.clone(),
            version: sinf_common::VERSION.to_string(),
        }
    }

    /// Stamp the finish time
    pub fn finish(mut self) -> Self {
        let now = Utc::now();
        self.elapsed_secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.finished_at = Some(now);
        self
    }

    pub fn to_json(&self) -> sinf_common::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json() {
        let mut report = RunReport::begin("run", 4, &EngineConfig::default());
        report.edges = 12;
        let report = report.finish();

        assert!(report.finished_at.is_some());
        assert!(report.elapsed_secs >= 0.0);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["command"], "run");
        assert_eq!(json["edges"], 12);
        assert_eq!(json["engine"]["similarity_method"], "cosine");
        assert_eq!(json["run_id"].as_str().unwrap().len(), 36);
    }
}
