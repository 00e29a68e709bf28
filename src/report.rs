use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::AnalysisReport;

/// Write `report.json` plus `scree.csv`, `projection.csv` and `clusters.csv`
/// into `dir`, creating it if needed.
pub fn write_report(report: &AnalysisReport, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let json_path = dir.join("report.json");
    let file = File::create(&json_path).with_context(|| format!("creating {}", json_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report).context("writing report.json")?;

    write_table(&dir.join("scree.csv"), &report.scree)?;
    write_table(&dir.join("projection.csv"), &report.projection)?;
    write_table(&dir.join("clusters.csv"), &report.clusters)?;

    log::info!("report written to {}", dir.display());
    Ok(())
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisConfig;
    use crate::data::model::{ClassSpectra, Dataset, Label, Spectrum};
    use crate::pipeline::analyze;

    #[test]
    fn test_writes_all_tables() {
        let make = |base: f64| {
            (0..6)
                .map(|i| Spectrum::new(vec![base + i as f64, 3.0, base * 0.5]))
                .collect::<Vec<_>>()
        };
        let ds = Dataset::assemble(
            ClassSpectra::new(Label::Positive, make(50.0)),
            ClassSpectra::new(Label::Negative, make(0.0)),
        )
        .unwrap();
        let report = analyze(&ds, &AnalysisConfig::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        write_report(&report, &out).unwrap();

        let scree = std::fs::read_to_string(out.join("scree.csv")).unwrap();
        assert_eq!(scree.lines().next(), Some("component,variance_ratio"));
        let projection = std::fs::read_to_string(out.join("projection.csv")).unwrap();
        assert_eq!(projection.lines().next(), Some("pc1,pc2,label"));
        assert_eq!(projection.lines().count(), 13);
        let clusters = std::fs::read_to_string(out.join("clusters.csv")).unwrap();
        assert_eq!(clusters.lines().next(), Some("sample,cluster,label"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("report.json")).unwrap())
                .unwrap();
        assert_eq!(json["n_samples"], 12);
        assert_eq!(json["classification"]["confusion"]["counts"].as_array().unwrap().len(), 2);
    }
}
