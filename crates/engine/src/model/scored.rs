//! Edge table augmented with per-edge influence

use super::{EdgeKey, EdgeTable, NodeId, RawTable, Timeframe};
use serde::{Deserialize, Serialize};
use sinf_common::config::ColumnConfig;
use sinf_common::errors::{InfluenceError, Result};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Column holding the edge influence in augmented tables
pub const INFLUENCE_COLUMN: &str = "influence";

/// Input edge row plus the influence of its edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedEdge {
    pub key: EdgeKey,
    pub timeframe: Option<Timeframe>,
    pub weight: Option<f64>,
    pub influence: f64,
}

/// Engine output: every input row with its edge's influence, plus one score
/// per distinct edge
#[derive(Debug, Clone, Default)]
pub struct AugmentedEdgeTable {
    rows: Vec<AugmentedEdge>,
    scores: BTreeMap<EdgeKey, f64>,
}

impl AugmentedEdgeTable {
    /// Attach scores to the rows of `edges`. Edges without a score get 0.
    pub fn new(edges: &EdgeTable, scores: BTreeMap<EdgeKey, f64>) -> Self {
        let mut scores = scores;
        for key in edges.keys() {
            scores.entry(key.clone()).or_insert(0.0);
        }

        let rows = edges
            .rows()
            .iter()
            .map(|row| AugmentedEdge {
                key: row.key.clone(),
                timeframe: row.timeframe,
                weight: Some(row.weight),
                influence: scores.get(&row.key).copied().unwrap_or(0.0),
            })
            .collect();

        Self { rows, scores }
    }

    /// Build from one score per distinct edge
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (EdgeKey, f64)>,
    {
        let scores: BTreeMap<EdgeKey, f64> = scores.into_iter().collect();
        let rows = scores
            .iter()
            .map(|(key, influence)| AugmentedEdge {
                key: key.clone(),
                timeframe: None,
                weight: None,
                influence: *influence,
            })
            .collect();
        Self { rows, scores }
    }

    /// Read a previously written augmented table.
    ///
    /// Endpoints and influence are required; rows of the same edge must agree
    /// on the influence.
    pub fn from_raw(raw: &RawTable, columns: &ColumnConfig) -> Result<Self> {
        let p1 = raw.column(&columns.p1)?;
        let p2 = raw.column(&columns.p2)?;
        let influence_col = raw.column(INFLUENCE_COLUMN)?;
        let timeframe_col = raw.find_column(&columns.timeframe);
        let weight_col = raw.find_column(&columns.weight);

        let mut rows = Vec::with_capacity(raw.len());
        let mut scores: BTreeMap<EdgeKey, f64> = BTreeMap::new();
        for i in 0..raw.len() {
            let key = EdgeKey::new(NodeId::parse(raw.cell(i, p1)?), NodeId::parse(raw.cell(i, p2)?))
                .ok_or_else(|| {
                    InfluenceError::invalid_record(raw.name(), i + 1, "self-loop edges are not supported")
                })?;
            let influence = raw.parse_finite(i, influence_col)?;
            let timeframe = match timeframe_col {
                Some(col) => Some(raw.parse::<Timeframe>(i, col)?),
                None => None,
            };
            let weight = match weight_col {
                Some(col) => Some(raw.parse_finite(i, col)?),
                None => None,
            };

            match scores.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(influence);
                }
                Entry::Occupied(slot) if *slot.get() != influence => {
                    return Err(InfluenceError::invalid_record(
                        raw.name(),
                        i + 1,
                        format!("conflicting influence for edge {}", key),
                    ));
                }
                Entry::Occupied(_) => {}
            }

            rows.push(AugmentedEdge {
                key,
                timeframe,
                weight,
                influence,
            });
        }

        Ok(Self { rows, scores })
    }

    /// All rows
    pub fn rows(&self) -> &[AugmentedEdge] {
        &self.rows
    }

    /// One influence per distinct edge, ascending by key
    pub fn scores(&self) -> &BTreeMap<EdgeKey, f64> {
        &self.scores
    }

    /// Influence of one edge
    pub fn influence(&self, key: &EdgeKey) -> Option<f64> {
        self.scores.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.scores.len()
    }

    /// Distinct endpoints in ascending order
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = BTreeSet::new();
        for key in self.scores.keys() {
            nodes.insert(key.u().clone());
            nodes.insert(key.v().clone());
        }
        nodes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: i64, b: i64) -> EdgeKey {
        EdgeKey::new(NodeId::from(a), NodeId::from(b)).unwrap()
    }

    #[test]
    fn test_rows_share_edge_influence() {
        let edges = EdgeTable::dynamic(vec![
            (NodeId::from(1), NodeId::from(2), 0, 1.0),
            (NodeId::from(1), NodeId::from(2), 1, 2.0),
            (NodeId::from(2), NodeId::from(3), 0, 1.0),
        ])
        .unwrap();
        let table = AugmentedEdgeTable::new(&edges, BTreeMap::from([(key(1, 2), -0.5)]));

        assert_eq!(table.len(), 3);
        assert_eq!(table.edge_count(), 2);
        assert!(table.rows()[..2].iter().all(|r| r.influence == -0.5));
        assert_eq!(table.influence(&key(2, 3)), Some(0.0));
    }

    #[test]
    fn test_from_raw_conflict() {
        let raw = RawTable::new(
            "augmented edge",
            vec!["p1".into(), "p2".into(), "influence".into()],
            vec![
                vec!["1".into(), "2".into(), "0.5".into()],
                vec!["2".into(), "1".into(), "0.25".into()],
            ],
        );
        let err = AugmentedEdgeTable::from_raw(&raw, &ColumnConfig::default()).unwrap_err();
        assert!(matches!(err, InfluenceError::InvalidRecord { row: 2, .. }));
    }

    #[test]
    fn test_from_raw_requires_influence() {
        let raw = RawTable::new("augmented edge", vec!["p1".into(), "p2".into()], vec![]);
        let err = AugmentedEdgeTable::from_raw(&raw, &ColumnConfig::default()).unwrap_err();
        assert!(matches!(err, InfluenceError::Schema { .. }));
    }
}
