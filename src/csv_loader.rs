//! データセット CSV の読み込みと推定結果 CSV の書き出し

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

use crate::types::{PhysicalPrediction, Pollutant, PollutantValues, NUM_POLLUTANTS};

/// ファイル名の列
pub const FILENAME_COLUMN: &str = "Filename";

/// ラベル付きの 1 行
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRow {
    pub filename: String,
    pub values: PollutantValues,
}

/// データセット CSV からラベルを読み込む
///
/// `Filename` 列と 7 つのラベル列はヘッダ名で探すので、列の順序や余分な列は問いません。
pub fn load_label_rows(path: &Path) -> Result<Vec<LabelRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {:?}", path))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("列 {} がありません: {:?}", name, path))
    };
    let filename_index = column(FILENAME_COLUMN)?;
    let mut label_indices = [0usize; NUM_POLLUTANTS];
    for pollutant in Pollutant::ALL {
        label_indices[pollutant.index()] = column(pollutant.label())?;
    }

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let filename = record
            .get(filename_index)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Missing filename (row {})", line + 1))?;

        let mut values = [0.0; NUM_POLLUTANTS];
        for (i, &index) in label_indices.iter().enumerate() {
            let cell = record
                .get(index)
                .ok_or_else(|| anyhow!("Missing {} (row {})", Pollutant::ALL[i], line + 1))?;
            values[i] = cell.trim().parse().with_context(|| {
                format!("{} の値が不正です: {:?} (row {})", Pollutant::ALL[i], cell, line + 1)
            })?;
        }

        rows.push(LabelRow { filename, values });
    }

    Ok(rows)
}

/// 推定結果を CSV に書き出す（`Filename` + 7 ラベル列）
pub fn write_predictions(path: &Path, rows: &[(String, PhysicalPrediction)]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create CSV: {:?}", path))?;

    let mut header = vec![FILENAME_COLUMN];
    header.extend(Pollutant::ALL.iter().map(|p| p.label()));
    writer.write_record(&header)?;

    for (filename, prediction) in rows {
        let mut record = vec![filename.as_str()];
        for pollutant in Pollutant::ALL {
            record.push(prediction.get(pollutant).unwrap_or(""));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
