//! CSV storage for input and output tables

use sinf_common::config::ColumnConfig;
use sinf_common::errors::Result;
use sinf_engine::model::INFLUENCE_COLUMN;
use sinf_engine::{AugmentedEdgeTable, NodeInfluence, NodeRetention, RawTable, RunReport};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Read a CSV file with a header row into a raw table named `name`.
///
/// Rows may be ragged; missing cells surface later as invalid records.
pub fn read_table(path: &Path, name: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }

    let table = RawTable::new(name, headers, rows);
    debug!(path = %path.display(), table = name, rows = table.len(), "Table read");
    Ok(table)
}

/// Write every input edge row with its edge's influence.
///
/// Endpoints use the configured column names and canonical order; timeframe
/// and weight columns are written when the rows carry them.
pub fn write_edges(path: &Path, edges: &AugmentedEdgeTable, columns: &ColumnConfig) -> Result<()> {
    let with_timeframe = edges.rows().iter().any(|r| r.timeframe.is_some());
    let with_weight = edges.rows().iter().any(|r| r.weight.is_some());

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec![columns.p1.as_str(), columns.p2.as_str()];
    if with_timeframe {
        header.push(&columns.timeframe);
    }
    if with_weight {
        header.push(&columns.weight);
    }
    header.push(INFLUENCE_COLUMN);
    writer.write_record(&header)?;

    for row in edges.rows() {
        let mut record = vec![row.key.u().to_string(), row.key.v().to_string()];
        if with_timeframe {
            record.push(row.timeframe.map(|tf| tf.to_string()).unwrap_or_default());
        }
        if with_weight {
            record.push(row.weight.map(|w| w.to_string()).unwrap_or_default());
        }
        record.push(row.influence.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = edges.len(), "Edge influence written");
    Ok(())
}

/// Write node summaries; peak and deviation columns only when computed
pub fn write_nodes(path: &Path, nodes: &[NodeInfluence]) -> Result<()> {
    let with_stats = nodes.iter().any(|n| n.n_peaks.is_some());

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["node", "influence", "degree"];
    if with_stats {
        header.extend(["n_peaks", "std"]);
    }
    writer.write_record(&header)?;

    for node in nodes {
        let mut record = vec![node.node.to_string(), node.influence.to_string(), node.degree.to_string()];
        if with_stats {
            record.push(node.n_peaks.map(|p| p.to_string()).unwrap_or_default());
            record.push(node.std.map(|s| s.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = nodes.len(), "Node influence written");
    Ok(())
}

/// Write retention rows; missing statistics are left empty
pub fn write_retention(path: &Path, rows: &[NodeRetention]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Retention transfer written");
    Ok(())
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    fs::write(path, report.to_json()?)?;
    info!(path = %path.display(), run_id = %report.run_id, "Run report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinf_engine::{EdgeKey, EdgeTable, NodeId};
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_table_trims_and_allows_ragged_rows() {
        let file = csv_file("p1, p2 ,weight\n1, 2,0.5\n3\n");
        let table = read_table(file.path(), "edge").unwrap();
        assert_eq!(table.headers(), &["p1", "p2", "weight"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 1).unwrap(), "2");
        assert!(table.cell(1, 1).is_err());
    }

    #[test]
    fn test_edges_round_trip_through_csv() {
        let edges = EdgeTable::dynamic(vec![
            (NodeId::from(2), NodeId::from(1), 0, 1.0),
            (NodeId::from(1), NodeId::from(2), 1, 3.0),
        ])
        .unwrap();
        let key = EdgeKey::new(NodeId::from(1), NodeId::from(2)).unwrap();
        let augmented = AugmentedEdgeTable::new(&edges, BTreeMap::from([(key.clone(), -0.25)]));

        let out = NamedTempFile::new().unwrap();
        let columns = ColumnConfig::default();
        write_edges(out.path(), &augmented, &columns).unwrap();

        let text = fs::read_to_string(out.path()).unwrap();
        assert!(text.starts_with("p1,p2,timeframe,weight,influence\n"));
        assert!(text.contains("1,2,0,1,-0.25\n"));

        let back = AugmentedEdgeTable::from_raw(&read_table(out.path(), "augmented edge").unwrap(), &columns)
            .unwrap();
        assert_eq!(back.influence(&key), Some(-0.25));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_node_stats_columns() {
        let out = NamedTempFile::new().unwrap();
        let nodes = vec![NodeInfluence {
            node: NodeId::parse("007"),
            influence: 0.5,
            degree: 2,
            n_peaks: Some(1),
            std: Some(0.25),
        }];
        write_nodes(out.path(), &nodes).unwrap();
        let text = fs::read_to_string(out.path()).unwrap();
        assert_eq!(text, "node,influence,degree,n_peaks,std\n7,0.5,2,1,0.25\n");
    }

    #[test]
    fn test_retention_none_is_empty_cell() {
        let out = NamedTempFile::new().unwrap();
        let rows = vec![NodeRetention {
            node: NodeId::parse("a"),
            retention_transfer: None,
            how_long_retained: None,
            how_long_also_drop: None,
            n_neighbours: 0,
        }];
        write_retention(out.path(), &rows).unwrap();
        let text = fs::read_to_string(out.path()).unwrap();
        assert_eq!(
            text,
            "node,retention_transfer,how_long_retained,how_long_also_drop,n_neighbours\na,,,,0\n"
        );
    }
}
