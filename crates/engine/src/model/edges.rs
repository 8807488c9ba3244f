//! Edge table
//!
//! Rows are canonicalised (`u < v`) and stored sorted by `(edge, timeframe)`,
//! so every edge's history is a contiguous, ascending slice.

use super::{EdgeKey, NodeId, RawTable, Timeframe};
use sinf_common::config::ColumnConfig;
use sinf_common::errors::{InfluenceError, Result};
use std::collections::BTreeSet;

const TABLE: &str = "edge";

/// One row of the edge table
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub key: EdgeKey,
    /// Present for dynamic graphs only
    pub timeframe: Option<Timeframe>,
    pub weight: f64,
}

/// One timeframe in which a dynamic edge was active
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeInstance {
    pub timeframe: Timeframe,
    pub weight: f64,
}

/// Read-only edge table, static or dynamic
#[derive(Debug, Clone)]
pub struct EdgeTable {
    dynamic: bool,
    rows: Vec<EdgeRow>,
    keys: Vec<EdgeKey>,
    spans: Vec<(usize, usize)>,
}

impl EdgeTable {
    /// Build a dynamic table from `(p1, p2, timeframe, weight)` rows
    pub fn dynamic<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, NodeId, Timeframe, f64)>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, (a, b, tf, w))| (i + 1, a, b, Some(tf), w))
            .collect();
        Self::build(true, rows)
    }

    /// Build a static table from `(p1, p2, weight)` rows
    pub fn static_graph<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, NodeId, f64)>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, (a, b, w))| (i + 1, a, b, None, w))
            .collect();
        Self::build(false, rows)
    }

    /// Build from raw cells using the configured column names.
    ///
    /// Dynamic tables need endpoint, timeframe and weight columns. Static
    /// tables only need the endpoints; a missing weight column means 1.0.
    pub fn from_raw(raw: &RawTable, columns: &ColumnConfig, dynamic: bool) -> Result<Self> {
        let p1 = raw.column(&columns.p1)?;
        let p2 = raw.column(&columns.p2)?;
        let timeframe = if dynamic {
            Some(raw.column(&columns.timeframe)?)
        } else {
            None
        };
        let weight = if dynamic {
            Some(raw.column(&columns.weight)?)
        } else {
            raw.find_column(&columns.weight)
        };

        let mut rows = Vec::with_capacity(raw.len());
        for i in 0..raw.len() {
            let a = NodeId::parse(raw.cell(i, p1)?);
            let b = NodeId::parse(raw.cell(i, p2)?);
            let tf = match timeframe {
                Some(col) => Some(raw.parse::<Timeframe>(i, col)?),
                None => None,
            };
            let w = match weight {
                Some(col) => raw.parse_finite(i, col)?,
                None => 1.0,
            };
            rows.push((i + 1, a, b, tf, w));
        }

        Self::build(dynamic, rows)
    }

    fn build(
        dynamic: bool,
        input: Vec<(usize, NodeId, NodeId, Option<Timeframe>, f64)>,
    ) -> Result<Self> {
        let mut numbered = Vec::with_capacity(input.len());
        for (line, a, b, timeframe, weight) in input {
            if a.is_empty() || b.is_empty() {
                return Err(InfluenceError::invalid_record(TABLE, line, "empty node identifier"));
            }
            if !weight.is_finite() {
                return Err(InfluenceError::invalid_record(TABLE, line, "non-finite weight"));
            }
            let key = EdgeKey::new(a, b).ok_or_else(|| {
                InfluenceError::invalid_record(TABLE, line, "self-loop edges are not supported")
            })?;
            numbered.push((line, EdgeRow { key, timeframe, weight }));
        }

        numbered.sort_by(|(la, a), (lb, b)| {
            a.key
                .cmp(&b.key)
                .then(a.timeframe.cmp(&b.timeframe))
                .then(la.cmp(lb))
        });

        for pair in numbered.windows(2) {
            let (_, prev) = &pair[0];
            let (line, row) = &pair[1];
            if prev.key == row.key && prev.timeframe == row.timeframe {
                let message = match row.timeframe {
                    Some(tf) => format!("duplicate edge {} at timeframe {}", row.key, tf),
                    None => format!("duplicate edge {}", row.key),
                };
                return Err(InfluenceError::invalid_record(TABLE, *line, message));
            }
        }

        let rows: Vec<EdgeRow> = numbered.into_iter().map(|(_, row)| row).collect();

        let mut keys: Vec<EdgeKey> = Vec::new();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            match keys.last() {
                Some(last) if *last == row.key => {
                    if let Some(span) = spans.last_mut() {
                        span.1 = idx + 1;
                    }
                }
                _ => {
                    keys.push(row.key.clone());
                    spans.push((idx, idx + 1));
                }
            }
        }

        Ok(Self {
            dynamic,
            rows,
            keys,
            spans,
        })
    }

    /// Whether edges carry their own timeframe history
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// All rows sorted by `(edge, timeframe)`
    pub fn rows(&self) -> &[EdgeRow] {
        &self.rows
    }

    /// Distinct edge keys in ascending order
    pub fn keys(&self) -> &[EdgeKey] {
        &self.keys
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.keys.len()
    }

    /// Rows of one edge, ascending by timeframe
    pub fn rows_of(&self, key: &EdgeKey) -> &[EdgeRow] {
        match self.keys.binary_search(key) {
            Ok(idx) => {
                let (start, end) = self.spans[idx];
                &self.rows[start..end]
            }
            Err(_) => &[],
        }
    }

    /// Active timeframes of a dynamic edge, ascending. Empty for static tables.
    pub fn instances(&self, key: &EdgeKey) -> Vec<EdgeInstance> {
        self.rows_of(key)
            .iter()
            .filter_map(|row| {
                row.timeframe.map(|timeframe| EdgeInstance {
                    timeframe,
                    weight: row.weight,
                })
            })
            .collect()
    }

    /// Weight of an edge at a timeframe (dynamic) or its only row (static)
    pub fn weight_at(&self, key: &EdgeKey, timeframe: Option<Timeframe>) -> Option<f64> {
        let rows = self.rows_of(key);
        match timeframe {
            Some(tf) => rows
                .binary_search_by(|row| row.timeframe.cmp(&Some(tf)))
                .ok()
                .map(|idx| rows[idx].weight),
            None => rows.first().map(|row| row.weight),
        }
    }

    /// Distinct endpoints in ascending order
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = BTreeSet::new();
        for key in &self.keys {
            nodes.insert(key.u().clone());
            nodes.insert(key.v().clone());
        }
        nodes.into_iter().collect()
    }

    /// Fail on the first non-positive weight
    pub fn check_positive_weights(&self) -> Result<()> {
        match self.rows.iter().find(|row| row.weight <= 0.0) {
            Some(row) => Err(InfluenceError::InvalidWeight { weight: row.weight }),
            None => Ok(()),
        }
    }
}
