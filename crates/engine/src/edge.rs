//! Edge influence engine
//!
//! Walks each edge's ordered timeframe history, feeding every transition to
//! the influence rule and keeping the most recent value. Edges are split into
//! contiguous key ranges and scored in parallel on a [`WorkerPool`].

use crate::balance::{BalanceFunction, LogWeightBalance};
use crate::model::{AttributeTable, AugmentedEdgeTable, EdgeKey, EdgeTable, NodeId, Timeframe};
use crate::partition::{Partition, WorkerPartitioner};
use crate::pool::{CancelToken, WorkerPool};
use crate::rule::{AsymmetricChange, InfluenceRule, Transition};
use crate::similarity::create_metric;
use serde::Serialize;
use sinf_common::config::{EngineConfig, InvalidWeightPolicy};
use sinf_common::errors::{InfluenceError, Result};
use sinf_common::metrics::{record_edges_scored, record_transitions, StageTimer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Final influence of one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeScore {
    pub key: EdgeKey,
    pub influence: f64,
    /// Transitions handed to the rule
    pub transitions: u64,
    /// Transitions skipped for lack of snapshots
    pub skipped: u64,
}

/// Per-edge walk state. An edge leaves the walk finalized as an [`EdgeScore`].
#[derive(Debug, Clone, Copy)]
enum EdgeState {
    NoHistory,
    InProgress { influence: f64, prev: Timeframe },
}

/// Scores every edge of an [`EdgeTable`] against an [`AttributeTable`]
#[derive(Clone)]
pub struct EdgeInfluenceEngine {
    edges: Arc<EdgeTable>,
    attributes: Arc<AttributeTable>,
    rule: Arc<dyn InfluenceRule>,
    balance: Option<Arc<dyn BalanceFunction>>,
    policy: InvalidWeightPolicy,
    threshold: f64,
    static_timeframes: Arc<Vec<Timeframe>>,
}

impl fmt::Debug for EdgeInfluenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeInfluenceEngine")
            .field("edges", &self.edges.len())
            .field("threshold", &self.threshold)
            .field("balanced", &self.is_balanced())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl EdgeInfluenceEngine {
    /// Create an engine without balancing.
    ///
    /// The threshold and the attribute table are validated here; nothing is
    /// checked once workers are running.
    pub fn new(
        edges: Arc<EdgeTable>,
        attributes: Arc<AttributeTable>,
        rule: Arc<dyn InfluenceRule>,
        threshold: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(InfluenceError::config(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        rule.validate(&attributes)?;

        let static_timeframes = Arc::new(attributes.timeframes());

        Ok(Self {
            edges,
            attributes,
            rule,
            balance: None,
            policy: InvalidWeightPolicy::Reject,
            threshold,
            static_timeframes,
        })
    }

    /// Engine with the asymmetric-change rule, configured metric and
    /// log-weight balancing
    pub fn from_config(
        edges: Arc<EdgeTable>,
        attributes: Arc<AttributeTable>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let metric = create_metric(&config.similarity_method)?;
        let engine = Self::new(
            edges,
            attributes,
            Arc::new(AsymmetricChange::new(metric)),
            config.threshold,
        )?;

        if config.balance_inf {
            engine.with_balance(
                Arc::new(LogWeightBalance::new(config.penalty)),
                config.invalid_weight,
            )
        } else {
            Ok(engine)
        }
    }

    /// Balance every computed value by the weight of its transition.
    ///
    /// Under [`InvalidWeightPolicy::Reject`] the edge table must not contain
    /// a non-positive weight.
    pub fn with_balance(
        mut self,
        balance: Arc<dyn BalanceFunction>,
        policy: InvalidWeightPolicy,
    ) -> Result<Self> {
        if policy == InvalidWeightPolicy::Reject && self.edges.is_dynamic() {
            self.edges.check_positive_weights()?;
        }
        self.balance = Some(balance);
        self.policy = policy;
        Ok(self)
    }

    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_balanced(&self) -> bool {
        self.balance.is_some()
    }

    /// Score all edges, ascending by key
    #[instrument(skip(self, pool), fields(edges = self.edges.edge_count(), dynamic = self.edges.is_dynamic()))]
    pub fn score(&self, pool: &WorkerPool) -> Result<Vec<EdgeScore>> {
        let timer = StageTimer::start("edges");
        let partitions = WorkerPartitioner::new(pool.n_workers())?.partition(self.edges.edge_count());

        let engine = self.clone();
        let scores = pool.run("edges", partitions, move |partition, cancel| {
            engine.score_partition(partition, cancel)
        })?;

        let elapsed = timer.finish();
        info!(edges = scores.len(), elapsed_secs = elapsed, "Edge influence computed");
        Ok(scores)
    }

    /// Score all edges and attach the result to the input rows
    pub fn run(&self, pool: &WorkerPool) -> Result<AugmentedEdgeTable> {
        let scores: BTreeMap<EdgeKey, f64> = self
            .score(pool)?
            .into_iter()
            .map(|score| (score.key, score.influence))
            .collect();
        Ok(AugmentedEdgeTable::new(&self.edges, scores))
    }

    /// Score the edges of one partition
    pub fn score_partition(&self, partition: Partition, cancel: &CancelToken) -> Result<Vec<EdgeScore>> {
        let keys = partition.slice(self.edges.keys());
        let mut scores = Vec::with_capacity(keys.len());
        let (mut transitions, mut skipped) = (0, 0);

        for key in keys {
            cancel.check()?;
            let score = self.score_edge(key)?;
            transitions += score.transitions;
            skipped += score.skipped;
            scores.push(score);
        }

        record_edges_scored(scores.len());
        record_transitions(transitions, skipped);
        Ok(scores)
    }

    /// Walk one edge's history
    pub fn score_edge(&self, key: &EdgeKey) -> Result<EdgeScore> {
        let mut state = EdgeState::NoHistory;
        let (mut transitions, mut skipped) = (0, 0);

        for (timeframe, weight) in self.history(key) {
            state = match state {
                EdgeState::NoHistory => EdgeState::InProgress {
                    influence: 0.0,
                    prev: timeframe,
                },
                EdgeState::InProgress { influence, prev } => {
                    let influence = match self.transition(key, prev, timeframe, weight, influence)? {
                        Some(value) => {
                            transitions += 1;
                            value
                        }
                        None => {
                            skipped += 1;
                            influence
                        }
                    };
                    EdgeState::InProgress {
                        influence,
                        prev: timeframe,
                    }
                }
            };
        }

        let influence = match state {
            EdgeState::NoHistory => 0.0,
            EdgeState::InProgress { influence, .. } => influence,
        };

        Ok(EdgeScore {
            key: key.clone(),
            influence,
            transitions,
            skipped,
        })
    }

    /// Ordered `(timeframe, balance weight)` pairs of an edge.
    ///
    /// Static graphs share the attribute table's timeframes and balance by
    /// the number of timeframes.
    fn history(&self, key: &EdgeKey) -> Vec<(Timeframe, f64)> {
        if self.edges.is_dynamic() {
            self.edges
                .instances(key)
                .into_iter()
                .map(|instance| (instance.timeframe, instance.weight))
                .collect()
        } else {
            let weight = self.static_timeframes.len() as f64;
            self.static_timeframes.iter().map(|&tf| (tf, weight)).collect()
        }
    }

    /// Influence after one transition, or `None` when a snapshot is missing
    fn transition(
        &self,
        key: &EdgeKey,
        prev: Timeframe,
        timeframe: Timeframe,
        weight: f64,
        influence: f64,
    ) -> Result<Option<f64>> {
        let t = match self.snapshots(key, prev, timeframe) {
            Ok(t) => t,
            Err(err) if err.is_recoverable() => {
                debug!(edge = %key, from = prev, to = timeframe, error = %err, "Skipping transition");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let raw = self.rule.influence(&t, self.threshold, influence)?;
        let value = match &self.balance {
            Some(_) if weight <= 0.0 && self.policy == InvalidWeightPolicy::SkipBalance => raw,
            Some(balance) => balance.balance(raw, weight)?,
            None => raw,
        };
        Ok(Some(value))
    }

    fn snapshots(&self, key: &EdgeKey, prev: Timeframe, timeframe: Timeframe) -> Result<Transition<'_>> {
        let (i, j) = (key.u(), key.v());
        Ok(Transition {
            i_old: self.snapshot(i, prev)?,
            i_new: self.snapshot(i, timeframe)?,
            j_old: self.snapshot(j, prev)?,
            j_new: self.snapshot(j, timeframe)?,
        })
    }

    fn snapshot(&self, node: &NodeId, timeframe: Timeframe) -> Result<&[f64]> {
        self.attributes
            .snapshot(node, timeframe)
            .ok_or_else(|| InfluenceError::MissingSnapshot {
                node: node.to_string(),
                timeframe,
            })
    }
}
