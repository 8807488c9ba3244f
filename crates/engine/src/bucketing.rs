//! Timeframe bucketing
//!
//! Coarsens both input tables before scoring, e.g. daily timeframes into
//! weekly ones. Bucket `b` holds timeframes `[b * width, (b + 1) * width)`.

use crate::model::{AttributeTable, EdgeKey, EdgeTable, NodeId, Timeframe};
use sinf_common::config::{Aggregation, BucketingConfig};
use sinf_common::errors::{InfluenceError, Result};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TimeframeBucketer {
    width: Timeframe,
    config: BucketingConfig,
}

impl TimeframeBucketer {
    pub fn new(config: BucketingConfig) -> Result<Self> {
        if config.width < 1 {
            return Err(InfluenceError::config(format!(
                "bucket width must be at least 1, got {}",
                config.width
            )));
        }
        Ok(Self {
            width: config.width,
            config,
        })
    }

    pub fn width(&self) -> Timeframe {
        self.width
    }

    /// Bucket index of a timeframe (floor division, also for negatives)
    pub fn bucket(&self, timeframe: Timeframe) -> Timeframe {
        timeframe.div_euclid(self.width)
    }

    /// Merge dynamic edge rows falling into the same bucket by summing their
    /// weights. Static tables carry no timeframes and are returned as is.
    pub fn edges(&self, edges: &EdgeTable) -> Result<EdgeTable> {
        if !edges.is_dynamic() || self.width == 1 {
            return Ok(edges.clone());
        }

        let mut merged: BTreeMap<(EdgeKey, Timeframe), f64> = BTreeMap::new();
        for row in edges.rows() {
            if let Some(tf) = row.timeframe {
                *merged.entry((row.key.clone(), self.bucket(tf))).or_insert(0.0) += row.weight;
            }
        }

        debug!(before = edges.len(), after = merged.len(), "Edge rows bucketed");
        EdgeTable::dynamic(
            merged
                .into_iter()
                .map(|((key, bucket), weight)| (key.u().clone(), key.v().clone(), bucket, weight)),
        )
    }

    /// Merge the snapshots of a node falling into the same bucket, feature by
    /// feature, with the configured aggregation
    pub fn attributes(&self, attributes: &AttributeTable) -> Result<AttributeTable> {
        if self.width == 1 {
            return Ok(attributes.clone());
        }

        let aggregations = self.aggregations_for(attributes.features());
        let mut merged: BTreeMap<(NodeId, Timeframe), (Vec<f64>, usize)> = BTreeMap::new();
        for (node, tf, vector) in attributes.iter() {
            let (sums, count) = merged
                .entry((node.clone(), self.bucket(tf)))
                .or_insert_with(|| (vec![0.0; vector.len()], 0));
            for (sum, value) in sums.iter_mut().zip(vector) {
                *sum += value;
            }
            *count += 1;
        }

        debug!(before = attributes.len(), after = merged.len(), "Attribute rows bucketed");
        let rows = merged.into_iter().map(|((node, bucket), (sums, count))| {
            let vector = sums
                .into_iter()
                .zip(&aggregations)
                .map(|(sum, aggregation)| match aggregation {
                    Aggregation::Sum => sum,
                    Aggregation::Mean => sum / count as f64,
                })
                .collect();
            (node, bucket, vector)
        });

        AttributeTable::new(attributes.features().to_vec(), rows)
    }

    fn aggregations_for(&self, features: &[String]) -> Vec<Aggregation> {
        features
            .iter()
            .map(|feature| self.config.aggregation_for(feature))
            .collect()
    }
}
