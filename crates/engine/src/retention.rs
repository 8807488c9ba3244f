//! Retention transfer
//!
//! Describes how long a node's neighbours stayed active relative to the node
//! itself, counted from the first timeframe of their shared edge. Lower
//! `retention_transfer` means the neighbours' activity ended closer to the
//! node's own.

use crate::model::{AttributeTable, EdgeTable, NodeId, Timeframe};
use crate::partition::{Partition, WorkerPartitioner};
use crate::pool::{CancelToken, WorkerPool};
use crate::stats::mean;
use serde::{Deserialize, Serialize};
use sinf_common::errors::Result;
use sinf_common::metrics::{record_nodes_aggregated, StageTimer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

/// Retention statistics of one node; `None` when it has no usable neighbour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRetention {
    pub node: NodeId,
    /// Mean `|end_m - end_n|` over neighbours `m`
    pub retention_transfer: Option<f64>,
    /// Mean ratio of neighbour to node activity since the edge started
    pub how_long_retained: Option<f64>,
    /// Mean of `-1` (neighbour left first) or `end_m - end_n + 1`
    pub how_long_also_drop: Option<f64>,
    pub n_neighbours: usize,
}

/// One neighbour's contribution to a node's retention statistics
#[derive(Debug, Clone, Copy, PartialEq)]
struct NeighbourRetention {
    gap: f64,
    retained: f64,
    also_dropped: f64,
}

impl NeighbourRetention {
    /// `None` when the node's activity ended before the edge started
    fn new(start: Timeframe, end_node: Timeframe, end_neighbour: Timeframe) -> Option<Self> {
        let node_span = end_node - start + 1;
        if node_span <= 0 {
            return None;
        }
        let neighbour_span = end_neighbour - start + 1;

        Some(Self {
            gap: (end_neighbour - end_node).abs() as f64,
            retained: neighbour_span as f64 / node_span as f64,
            also_dropped: if end_neighbour < end_node {
                -1.0
            } else {
                (end_neighbour - end_node + 1) as f64
            },
        })
    }
}

/// Computes [`NodeRetention`] for a selection of nodes
#[derive(Debug, Clone)]
pub struct RetentionTransfer {
    /// `(neighbour, edge start)` per node, ascending by neighbour
    neighbours: Arc<BTreeMap<NodeId, Vec<(NodeId, Timeframe)>>>,
    last_active: Arc<BTreeMap<NodeId, Timeframe>>,
    nodes: Arc<Vec<NodeId>>,
}

impl RetentionTransfer {
    /// Dynamic edges start at their first timeframe; static edges at the
    /// first timeframe of the attribute table.
    pub fn new(edges: &EdgeTable, attributes: &AttributeTable) -> Self {
        let static_start = attributes.first_timeframe();
        let mut neighbours: BTreeMap<NodeId, Vec<(NodeId, Timeframe)>> = BTreeMap::new();

        for key in edges.keys() {
            let start = if edges.is_dynamic() {
                edges.rows_of(key).first().and_then(|row| row.timeframe)
            } else {
                static_start
            };
            let Some(start) = start else {
                continue;
            };
            for node in [key.u(), key.v()] {
                if let Some(neighbour) = key.other(node) {
                    neighbours
                        .entry(node.clone())
                        .or_default()
                        .push((neighbour.clone(), start));
                }
            }
        }

        let mut last_active = BTreeMap::new();
        for node in edges.nodes() {
            if let Some(tf) = attributes.last_timeframe_of(&node) {
                last_active.insert(node, tf);
            }
        }

        let nodes = neighbours.keys().cloned().collect();
        Self {
            neighbours: Arc::new(neighbours),
            last_active: Arc::new(last_active),
            nodes: Arc::new(nodes),
        }
    }

    /// Restrict the output to `nodes`
    pub fn with_nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let selected: BTreeSet<NodeId> = nodes.into_iter().collect();
        self.nodes = Arc::new(selected.into_iter().collect());
        self
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Statistics of one node. Neighbours without attribute history, or edges
    /// starting after the node's last snapshot, are left out.
    pub fn node(&self, node: &NodeId) -> NodeRetention {
        let per_neighbour: Vec<NeighbourRetention> = match self.last_active.get(node) {
            Some(&end_node) => self
                .neighbours
                .get(node)
                .map(|list| list.as_slice())
                .unwrap_or(&[])
                .iter()
                .filter_map(|(neighbour, start)| {
                    let end_neighbour = *self.last_active.get(neighbour)?;
                    NeighbourRetention::new(*start, end_node, end_neighbour)
                })
                .collect(),
            None => Vec::new(),
        };

        let column = |f: fn(&NeighbourRetention) -> f64| -> Option<f64> {
            mean(&per_neighbour.iter().map(f).collect::<Vec<_>>())
        };

        NodeRetention {
            node: node.clone(),
            retention_transfer: column(|r| r.gap),
            how_long_retained: column(|r| r.retained),
            how_long_also_drop: column(|r| r.also_dropped),
            n_neighbours: per_neighbour.len(),
        }
    }

    #[instrument(skip(self, pool), fields(nodes = self.nodes.len()))]
    pub fn run(&self, pool: &WorkerPool) -> Result<Vec<NodeRetention>> {
        let timer = StageTimer::start("retention");
        let partitions = WorkerPartitioner::new(pool.n_workers())?.partition(self.nodes.len());

        let metric = self.clone();
        let rows = pool.run("retention", partitions, move |partition, cancel| {
            metric.partition(partition, cancel)
        })?;

        let elapsed = timer.finish();
        info!(nodes = rows.len(), elapsed_secs = elapsed, "Retention transfer computed");
        Ok(rows)
    }

    fn partition(&self, partition: Partition, cancel: &CancelToken) -> Result<Vec<NodeRetention>> {
        let mut rows = Vec::with_capacity(partition.len());
        for node in partition.slice(&self.nodes) {
            cancel.check()?;
            rows.push(self.node(node));
        }
        record_nodes_aggregated(rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> NodeId {
        NodeId::from(n)
    }

    fn attributes(last: &[(i64, i64)]) -> AttributeTable {
        let rows = last
            .iter()
            .flat_map(|&(node, end)| (0..=end).map(move |tf| (id(node), tf, vec![1.0])));
        AttributeTable::new(vec!["x".into()], rows).unwrap()
    }

    #[test]
    fn test_node_statistics() {
        // Node 1 active until 4; neighbour 2 until 2, neighbour 3 until 6.
        // Both edges start at 1.
        let edges = EdgeTable::dynamic(vec![
            (id(1), id(2), 1, 1.0),
            (id(1), id(2), 2, 1.0),
            (id(1), id(3), 1, 1.0),
        ])
        .unwrap();
        let metric = RetentionTransfer::new(&edges, &attributes(&[(1, 4), (2, 2), (3, 6)]));
        let node1 = metric.node(&id(1));

        assert_eq!(node1.n_neighbours, 2);
        // gaps 2 and 2
        assert_eq!(node1.retention_transfer, Some(2.0));
        // (2/4 + 6/4) / 2
        assert_eq!(node1.how_long_retained, Some(1.0));
        // (-1 + 3) / 2
        assert_eq!(node1.how_long_also_drop, Some(1.0));
    }

    #[test]
    fn test_node_without_history() {
        let edges = EdgeTable::dynamic(vec![(id(1), id(2), 0, 1.0)]).unwrap();
        let metric = RetentionTransfer::new(&edges, &attributes(&[(2, 3)]));
        let node1 = metric.node(&id(1));
        assert_eq!(node1.n_neighbours, 0);
        assert_eq!(node1.retention_transfer, None);

        // Node 2's only neighbour has no history either
        assert_eq!(metric.node(&id(2)).n_neighbours, 0);
    }

    #[test]
    fn test_static_edges_start_at_first_timeframe() {
        let edges = EdgeTable::static_graph(vec![(id(1), id(2), 1.0)]).unwrap();
        let metric = RetentionTransfer::new(&edges, &attributes(&[(1, 3), (2, 1)]));
        let node2 = metric.node(&id(2));
        // start 0: retained = (3 + 1) / (1 + 1)
        assert_eq!(node2.how_long_retained, Some(2.0));
        assert_eq!(node2.how_long_also_drop, Some(3.0));
    }

    #[test]
    fn test_run_over_selection() {
        let edges = EdgeTable::dynamic(vec![(id(1), id(2), 0, 1.0), (id(2), id(3), 0, 1.0)]).unwrap();
        let metric = RetentionTransfer::new(&edges, &attributes(&[(1, 2), (2, 2), (3, 5)]))
            .with_nodes(vec![id(3), id(2), id(7)]);
        let pool = WorkerPool::start(2).unwrap();
        let rows = metric.run(&pool).unwrap();

        let nodes: Vec<_> = rows.iter().map(|r| r.node.clone()).collect();
        assert_eq!(nodes, vec![id(2), id(3), id(7)]);
        assert_eq!(rows[0].n_neighbours, 2);
        assert_eq!(rows[2].n_neighbours, 0);
    }
}
