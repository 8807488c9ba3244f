//! Influence pipeline
//!
//! Wires configuration, table loading, bucketing and the parallel stages
//! together. Each call starts its own [`WorkerPool`] and tears it down before
//! returning, on success and on failure.

use crate::balance::{BalanceFunction, LogWeightBalance};
use crate::bucketing::TimeframeBucketer;
use crate::edge::EdgeInfluenceEngine;
use crate::model::{AttributeTable, AugmentedEdgeTable, EdgeKey, EdgeTable, NodeId, RawTable};
use crate::node::{NodeInfluence, NodeInfluenceAggregator};
use crate::pool::WorkerPool;
use crate::report::RunReport;
use crate::retention::{NodeRetention, RetentionTransfer};
use crate::rule::{AsymmetricChange, InfluenceRule};
use crate::similarity::{create_metric, SimilarityMetric};
use sinf_common::config::AppConfig;
use sinf_common::errors::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Validated input tables of one run
#[derive(Debug, Clone)]
pub struct InputTables {
    pub edges: Arc<EdgeTable>,
    pub attributes: Arc<AttributeTable>,
}

/// Results of a pipeline call. Stages that did not run are `None`.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub edges: Option<AugmentedEdgeTable>,
    pub nodes: Option<Vec<NodeInfluence>>,
    pub retention: Option<Vec<NodeRetention>>,
    pub report: RunReport,
}

pub struct InfluencePipeline {
    config: AppConfig,
    metric: Arc<dyn SimilarityMetric>,
    rule: Option<Arc<dyn InfluenceRule>>,
    balance: Option<Arc<dyn BalanceFunction>>,
    bucketer: TimeframeBucketer,
}

impl fmt::Debug for InfluencePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluencePipeline")
            .field("engine", &self.config.engine)
            .field("custom_rule", &self.rule.is_some())
            .field("custom_balance", &self.balance.is_some())
            .finish_non_exhaustive()
    }
}

impl InfluencePipeline {
    /// Validate the configuration and resolve the similarity metric
    pub fn new(config: AppConfig) -> Result<Self> {
        let config = config.checked()?;
        let metric = create_metric(&config.engine.similarity_method)?;
        let bucketer = TimeframeBucketer::new(config.bucketing.clone())?;

        Ok(Self {
            config,
            metric,
            rule: None,
            balance: None,
            bucketer,
        })
    }

    /// Replace the asymmetric-change rule
    pub fn with_rule(mut self, rule: Arc<dyn InfluenceRule>) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Replace the log-weight balance function. Only used when balancing is
    /// enabled.
    pub fn with_balance(mut self, balance: Arc<dyn BalanceFunction>) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metric(&self) -> &dyn SimilarityMetric {
        self.metric.as_ref()
    }

    /// Validate raw tables against the column mapping and bucket them
    pub fn load_tables(&self, raw_edges: &RawTable, raw_attributes: &RawTable) -> Result<InputTables> {
        let columns = &self.config.columns;
        let edges = EdgeTable::from_raw(raw_edges, columns, self.config.engine.dynamic)?;
        let attributes = AttributeTable::from_raw(raw_attributes, columns)?;
        self.prepare(edges, attributes)
    }

    /// Bucket already typed tables
    pub fn prepare(&self, edges: EdgeTable, attributes: AttributeTable) -> Result<InputTables> {
        let (edges, attributes) = if self.bucketer.width() > 1 {
            info!(width = self.bucketer.width(), "Bucketing timeframes");
            (self.bucketer.edges(&edges)?, self.bucketer.attributes(&attributes)?)
        } else {
            (edges, attributes)
        };

        info!(
            edge_rows = edges.len(),
            edges = edges.edge_count(),
            attribute_rows = attributes.len(),
            features = attributes.dimension(),
            dynamic = edges.is_dynamic(),
            "Tables loaded"
        );

        Ok(InputTables {
            edges: Arc::new(edges),
            attributes: Arc::new(attributes),
        })
    }

    /// Edge engine for `tables`, with every eager check applied
    pub fn edge_engine(&self, tables: &InputTables) -> Result<EdgeInfluenceEngine> {
        let engine_config = &self.config.engine;
        let rule = self
            .rule
            .clone()
            .unwrap_or_else(|| Arc::new(AsymmetricChange::new(Arc::clone(&self.metric))));

        let engine = EdgeInfluenceEngine::new(
            Arc::clone(&tables.edges),
            Arc::clone(&tables.attributes),
            rule,
            engine_config.threshold,
        )?;

        if !engine_config.balance_inf {
            return Ok(engine);
        }
        let balance = self
            .balance
            .clone()
            .unwrap_or_else(|| Arc::new(LogWeightBalance::new(engine_config.penalty)));
        engine.with_balance(balance, engine_config.invalid_weight)
    }

    /// Edge influence only
    pub fn score_edges(&self, tables: &InputTables) -> Result<PipelineOutput> {
        let engine = self.edge_engine(tables)?;
        let pool = self.start_pool()?;
        let mut report = self.report("edges", &pool, tables);

        let edges = Self::edge_stage(&engine, &pool, &mut report)?;
        pool.stop();

        Ok(PipelineOutput {
            edges: Some(edges),
            nodes: None,
            retention: None,
            report: report.finish(),
        })
    }

    /// Node summaries from an already augmented edge table
    pub fn aggregate_nodes(&self, edges: &AugmentedEdgeTable) -> Result<PipelineOutput> {
        let pool = self.start_pool()?;
        let mut report = RunReport::begin("nodes", pool.n_workers(), &self.config.engine);
        report.edge_rows = edges.len();
        report.edges = edges.edge_count();

        let nodes = self.node_stage(edges, &pool)?;
        report.nodes = nodes.len();
        pool.stop();

        Ok(PipelineOutput {
            edges: None,
            nodes: Some(nodes),
            retention: None,
            report: report.finish(),
        })
    }

    /// Edge influence followed by node aggregation on the same pool
    pub fn run(&self, tables: &InputTables) -> Result<PipelineOutput> {
        let engine = self.edge_engine(tables)?;
        let pool = self.start_pool()?;
        let mut report = self.report("run", &pool, tables);

        let edges = Self::edge_stage(&engine, &pool, &mut report)?;
        let nodes = self.node_stage(&edges, &pool)?;
        report.nodes = nodes.len();
        pool.stop();

        info!(
            run_id = %report.run_id,
            edges = report.edges,
            nodes = report.nodes,
            "Influence run finished"
        );

        Ok(PipelineOutput {
            edges: Some(edges),
            nodes: Some(nodes),
            retention: None,
            report: report.finish(),
        })
    }

    /// Retention transfer for `selection`, or for every edge endpoint
    pub fn retention(&self, tables: &InputTables, selection: Option<Vec<NodeId>>) -> Result<PipelineOutput> {
        let mut metric = RetentionTransfer::new(&tables.edges, &tables.attributes);
        if let Some(nodes) = selection {
            metric = metric.with_nodes(nodes);
        }

        let pool = self.start_pool()?;
        let mut report = self.report("retention", &pool, tables);
        let rows = metric.run(&pool)?;
        report.nodes = rows.len();
        pool.stop();

        Ok(PipelineOutput {
            edges: None,
            nodes: None,
            retention: Some(rows),
            report: report.finish(),
        })
    }

    fn start_pool(&self) -> Result<WorkerPool> {
        WorkerPool::start(self.config.engine.workers())
    }

    fn report(&self, command: &str, pool: &WorkerPool, tables: &InputTables) -> RunReport {
        let mut report = RunReport::begin(command, pool.n_workers(), &self.config.engine);
        report.edge_rows = tables.edges.len();
        report.edges = tables.edges.edge_count();
        report.attribute_rows = tables.attributes.len();
        report
    }

    fn edge_stage(
        engine: &EdgeInfluenceEngine,
        pool: &WorkerPool,
        report: &mut RunReport,
    ) -> Result<AugmentedEdgeTable> {
        let scores = engine.score(pool)?;
        report.transitions_scored = scores.iter().map(|s| s.transitions).sum();
        report.transitions_skipped = scores.iter().map(|s| s.skipped).sum();

        let scores: BTreeMap<EdgeKey, f64> = scores
            .into_iter()
            .map(|score| (score.key, score.influence))
            .collect();
        Ok(AugmentedEdgeTable::new(engine.edges(), scores))
    }

    fn node_stage(&self, edges: &AugmentedEdgeTable, pool: &WorkerPool) -> Result<Vec<NodeInfluence>> {
        NodeInfluenceAggregator::new(edges, self.config.engine.compute_stats).run(pool)
    }
}
