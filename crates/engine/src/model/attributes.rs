//! Attribute table: one feature vector per node per timeframe

use super::{NodeId, RawTable, Timeframe};
use sinf_common::config::ColumnConfig;
use sinf_common::errors::{InfluenceError, Result};
use std::collections::{BTreeMap, BTreeSet};

const TABLE: &str = "attribute";

#[derive(Debug, Clone)]
pub struct AttributeTable {
    features: Vec<String>,
    snapshots: BTreeMap<NodeId, BTreeMap<Timeframe, Vec<f64>>>,
    timeframes: BTreeSet<Timeframe>,
    len: usize,
}

impl AttributeTable {
    /// Build from `(node, timeframe, features)` rows.
    ///
    /// Every vector must have `features.len()` finite values and each
    /// `(node, timeframe)` pair may appear once.
    pub fn new<I>(features: Vec<String>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, Timeframe, Vec<f64>)>,
    {
        if features.is_empty() {
            return Err(InfluenceError::schema(TABLE, "<feature columns>"));
        }

        let mut table = Self {
            features,
            snapshots: BTreeMap::new(),
            timeframes: BTreeSet::new(),
            len: 0,
        };

        for (idx, (node, timeframe, vector)) in rows.into_iter().enumerate() {
            table.insert(idx + 1, node, timeframe, vector)?;
        }

        Ok(table)
    }

    /// Build from raw cells using the configured column names.
    ///
    /// Features are the configured list, or every column other than the node
    /// and timeframe columns, in header order.
    pub fn from_raw(raw: &RawTable, columns: &ColumnConfig) -> Result<Self> {
        let node_col = raw.column(&columns.node_id)?;
        let tf_col = raw.column(&columns.timeframe)?;

        let features: Vec<String> = if columns.features.is_empty() {
            raw.headers()
                .iter()
                .filter(|h| **h != columns.node_id && **h != columns.timeframe)
                .cloned()
                .collect()
        } else {
            columns.features.clone()
        };
        let feature_cols = features
            .iter()
            .map(|f| raw.column(f))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for i in 0..raw.len() {
            let node = NodeId::parse(raw.cell(i, node_col)?);
            let timeframe = raw.parse::<Timeframe>(i, tf_col)?;
            let vector = feature_cols
                .iter()
                .map(|&col| raw.parse_finite(i, col))
                .collect::<Result<Vec<_>>>()?;
            rows.push((node, timeframe, vector));
        }

        Self::new(features, rows)
    }

    fn insert(&mut self, line: usize, node: NodeId, timeframe: Timeframe, vector: Vec<f64>) -> Result<()> {
        if node.is_empty() {
            return Err(InfluenceError::invalid_record(TABLE, line, "empty node identifier"));
        }
        if vector.len() != self.features.len() {
            return Err(InfluenceError::invalid_record(
                TABLE,
                line,
                format!("expected {} features, got {}", self.features.len(), vector.len()),
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(InfluenceError::invalid_record(TABLE, line, "non-finite feature value"));
        }

        let history = self.snapshots.entry(node).or_default();
        if history.contains_key(&timeframe) {
            return Err(InfluenceError::invalid_record(
                TABLE,
                line,
                format!("duplicate snapshot at timeframe {}", timeframe),
            ));
        }
        history.insert(timeframe, vector);
        self.timeframes.insert(timeframe);
        self.len += 1;
        Ok(())
    }

    /// Feature names in vector order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.features.len()
    }

    /// Number of snapshots
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Feature vector of `node` at `timeframe`
    pub fn snapshot(&self, node: &NodeId, timeframe: Timeframe) -> Option<&[f64]> {
        self.snapshots
            .get(node)
            .and_then(|history| history.get(&timeframe))
            .map(|v| v.as_slice())
    }

    /// Every timeframe present in the table, ascending
    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.timeframes.iter().copied().collect()
    }

    /// Earliest timeframe in the table
    pub fn first_timeframe(&self) -> Option<Timeframe> {
        self.timeframes.first().copied()
    }

    /// Last timeframe with a snapshot for `node`
    pub fn last_timeframe_of(&self, node: &NodeId) -> Option<Timeframe> {
        self.snapshots
            .get(node)
            .and_then(|history| history.keys().next_back().copied())
    }

    /// All snapshots ordered by node, then timeframe
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, Timeframe, &[f64])> {
        self.snapshots.iter().flat_map(|(node, history)| {
            history
                .iter()
                .map(move |(tf, vector)| (node, *tf, vector.as_slice()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> Vec<String> {
        vec!["kills".into(), "deaths".into()]
    }

    #[test]
    fn test_lookup() {
        let table = AttributeTable::new(
            features(),
            vec![
                (NodeId::from(1), 2, vec![1.0, 0.0]),
                (NodeId::from(1), 0, vec![0.5, 0.5]),
                (NodeId::from(2), 1, vec![0.0, 1.0]),
            ],
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.timeframes(), vec![0, 1, 2]);
        assert_eq!(table.snapshot(&NodeId::from(1), 0), Some(&[0.5, 0.5][..]));
        assert_eq!(table.snapshot(&NodeId::from(2), 0), None);
        assert_eq!(table.last_timeframe_of(&NodeId::from(1)), Some(2));
        assert_eq!(table.first_timeframe(), Some(0));
    }

    #[test]
    fn test_ragged_vector_rejected() {
        let err = AttributeTable::new(features(), vec![(NodeId::from(1), 0, vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, InfluenceError::InvalidRecord { row: 1, .. }));
    }

    #[test]
    fn test_duplicate_snapshot_rejected() {
        let err = AttributeTable::new(
            features(),
            vec![
                (NodeId::from(1), 0, vec![1.0, 0.0]),
                (NodeId::parse("01"), 0, vec![0.0, 1.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, InfluenceError::InvalidRecord { row: 2, .. }));
    }

    #[test]
    fn test_from_raw_infers_features() {
        let raw = RawTable::new(
            "attribute",
            vec!["node_id".into(), "kills".into(), "timeframe".into(), "score".into()],
            vec![vec!["7".into(), "3".into(), "0".into(), "10".into()]],
        );
        let table = AttributeTable::from_raw(&raw, &ColumnConfig::default()).unwrap();
        assert_eq!(table.features(), &["kills".to_string(), "score".to_string()]);
        assert_eq!(table.snapshot(&NodeId::from(7), 0), Some(&[3.0, 10.0][..]));
    }

    #[test]
    fn test_from_raw_missing_feature_column() {
        let raw = RawTable::new(
            "attribute",
            vec!["node_id".into(), "timeframe".into(), "kills".into()],
            vec![],
        );
        let columns = ColumnConfig {
            features: vec!["kills".into(), "assists".into()],
            ..ColumnConfig::default()
        };
        let err = AttributeTable::from_raw(&raw, &columns).unwrap_err();
        assert!(matches!(err, InfluenceError::Schema { ref column, .. } if column == "assists"));
    }
}
