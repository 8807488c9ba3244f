//! Node influence aggregation
//!
//! Rolls per-edge scores up into one signed summary per node. An edge's
//! influence counts for its smaller endpoint as is and for the larger one
//! negated. Each worker filters the shared edge scores for the nodes of its
//! own partition.

use crate::model::{AugmentedEdgeTable, EdgeKey, NodeId};
use crate::partition::{Partition, WorkerPartitioner};
use crate::pool::{CancelToken, WorkerPool};
use crate::stats::{count_peaks, mean, population_std};
use serde::{Deserialize, Serialize};
use sinf_common::errors::Result;
use sinf_common::metrics::{record_nodes_aggregated, StageTimer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

/// Influence summary of one node.
///
/// A node without incident edges reports influence `0.0`, degree `0` and,
/// when statistics are requested, `0` peaks and a deviation of `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfluence {
    pub node: NodeId,
    /// Mean signed contribution of the incident edges
    pub influence: f64,
    /// Number of distinct incident edges
    pub degree: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_peaks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

impl NodeInfluence {
    /// Summarise the contributions of one node, given in incident-edge order
    pub fn from_contributions(node: NodeId, contributions: &[f64], compute_stats: bool) -> Self {
        Self {
            node,
            influence: mean(contributions).unwrap_or(0.0),
            degree: contributions.len(),
            n_peaks: compute_stats.then(|| count_peaks(contributions)),
            std: compute_stats.then(|| population_std(contributions).unwrap_or(0.0)),
        }
    }
}

/// Aggregates an [`AugmentedEdgeTable`] into node summaries
#[derive(Debug, Clone)]
pub struct NodeInfluenceAggregator {
    /// Stored influence per edge, ascending by key
    scores: Arc<BTreeMap<EdgeKey, f64>>,
    nodes: Arc<Vec<NodeId>>,
    compute_stats: bool,
}

impl NodeInfluenceAggregator {
    /// Aggregator over every endpoint of `edges`
    pub fn new(edges: &AugmentedEdgeTable, compute_stats: bool) -> Self {
        let nodes: BTreeSet<NodeId> = edges
            .scores()
            .keys()
            .flat_map(|key| [key.u().clone(), key.v().clone()])
            .collect();

        Self {
            scores: Arc::new(edges.scores().clone()),
            nodes: Arc::new(nodes.into_iter().collect()),
            compute_stats,
        }
    }

    /// Restrict the output to `nodes`. Nodes absent from the edge table get
    /// a zero-degree summary.
    pub fn with_nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let selected: BTreeSet<NodeId> = nodes.into_iter().collect();
        self.nodes = Arc::new(selected.into_iter().collect());
        self
    }

    /// Nodes that will be summarised, ascending
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Contributions of one node in incident-edge order
    pub fn contributions(&self, node: &NodeId) -> Vec<f64> {
        self.scores
            .iter()
            .filter_map(|(key, &influence)| key.contribution_for(node, influence))
            .collect()
    }

    /// Summarise every selected node, ascending by id
    #[instrument(skip(self, pool), fields(nodes = self.nodes.len(), compute_stats = self.compute_stats))]
    pub fn run(&self, pool: &WorkerPool) -> Result<Vec<NodeInfluence>> {
        let timer = StageTimer::start("nodes");
        let partitions = WorkerPartitioner::new(pool.n_workers())?.partition(self.nodes.len());

        let aggregator = self.clone();
        let summaries = pool.run("nodes", partitions, move |partition, cancel| {
            aggregator.aggregate_partition(partition, cancel)
        })?;

        let elapsed = timer.finish();
        info!(nodes = summaries.len(), elapsed_secs = elapsed, "Node influence aggregated");
        Ok(summaries)
    }

    /// Summarise the nodes of one partition
    pub fn aggregate_partition(&self, partition: Partition, cancel: &CancelToken) -> Result<Vec<NodeInfluence>> {
        let mut summaries = Vec::with_capacity(partition.len());
        for node in partition.slice(&self.nodes) {
            cancel.check()?;
            summaries.push(NodeInfluence::from_contributions(
                node.clone(),
                &self.contributions(node),
                self.compute_stats,
            ));
        }
        record_nodes_aggregated(summaries.len());
        Ok(summaries)
    }
}
