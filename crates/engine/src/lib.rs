//! Semantic influence engine
//!
//! Detects directional influence between actors of a time-evolving weighted
//! graph and rolls it up into per-node summaries:
//! - Edge influence from attribute snapshots ([`EdgeInfluenceEngine`])
//! - Node aggregation ([`NodeInfluenceAggregator`])
//! - Retention transfer ([`RetentionTransfer`])
//!
//! Stages run on a [`WorkerPool`] over contiguous key partitions.

pub mod balance;
pub mod bucketing;
pub mod edge;
pub mod model;
pub mod node;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod retention;
pub mod rule;
pub mod similarity;
mod stats;

pub use balance::{BalanceFunction, LogWeightBalance};
pub use bucketing::TimeframeBucketer;
pub use edge::{EdgeInfluenceEngine, EdgeScore};
pub use model::{AttributeTable, AugmentedEdgeTable, EdgeKey, EdgeTable, NodeId, RawTable, Timeframe};
pub use node::{NodeInfluence, NodeInfluenceAggregator};
pub use partition::{Partition, WorkerPartitioner};
pub use pipeline::{InfluencePipeline, InputTables, PipelineOutput};
pub use pool::{CancelToken, WorkerPool};
pub use report::RunReport;
pub use retention::{NodeRetention, RetentionTransfer};
pub use rule::{AsymmetricChange, InfluenceRule, Transition};
pub use similarity::{create_metric, SimilarityMethod, SimilarityMetric};
