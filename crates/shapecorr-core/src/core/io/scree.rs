use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreeError {
    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
}

/// One row of a compactness export: modes are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreeRecord {
    pub mode: usize,
    pub cumulative_variance: f64,
}

pub fn records_from_curve(curve: &[f64]) -> Vec<ScreeRecord> {
    curve
        .iter()
        .enumerate()
        .map(|(i, &cumulative_variance)| ScreeRecord {
            mode: i + 1,
            cumulative_variance,
        })
        .collect()
}

pub fn write_scree(path: &Path, curve: &[f64]) -> Result<(), ScreeError> {
    let wrap = |source: csv::Error| ScreeError::Csv {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
    for record in records_from_curve(curve) {
        writer.serialize(record).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;
    Ok(())
}

pub fn read_scree(path: &Path) -> Result<Vec<ScreeRecord>, ScreeError> {
    let wrap = |source: csv::Error| ScreeError::Csv {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(wrap)?;
    reader
        .deserialize::<ScreeRecord>()
        .map(|r| r.map_err(wrap))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn write_scree_emits_header_and_one_based_modes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scree.csv");
        write_scree(&path, &[0.75, 0.95, 1.0]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("mode,cumulative_variance"));
        assert_eq!(lines.next(), Some("1,0.75"));

        let records = read_scree(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].mode, 3);
        assert_eq!(records[2].cumulative_variance, 1.0);
    }

    #[test]
    fn read_scree_reports_the_path_on_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let err = read_scree(&path).unwrap_err();
        assert!(err.to_string().contains("missing.csv"));
    }
}
