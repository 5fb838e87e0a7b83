//! ラベルスケーラ（Min-Max）
//!
//! 学習時にラベルを `feature_range` へ線形に写した変換を保持し、推論時にはその逆変換で
//! モデル出力を物理単位に戻します。値の範囲チェック（クランプ）は行いません。
//! 学習分布の外側の出力は、そのまま現実的でない物理値になり得ます。

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AqiError, Result};
use crate::types::{Pollutant, PollutantValues, RawPrediction, NUM_POLLUTANTS};

/// 各次元ごとの Min-Max スケーラ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScaler {
    /// 変換先の範囲 (min, max)
    pub feature_range: (f64, f64),
    /// ラベル順（検証用）
    pub labels: Vec<String>,
    /// 学習データの各ラベルの最小値
    pub data_min: Vec<f64>,
    /// 学習データの各ラベルの最大値
    pub data_max: Vec<f64>,
}

impl LabelScaler {
    /// 学習データのラベル行から最小値・最大値を求める
    pub fn fit(rows: &[PollutantValues]) -> anyhow::Result<Self> {
        if rows.is_empty() {
            bail!("スケーラの学習データが空です");
        }

        let mut data_min = vec![f64::INFINITY; NUM_POLLUTANTS];
        let mut data_max = vec![f64::NEG_INFINITY; NUM_POLLUTANTS];
        for row in rows {
            for (i, &value) in row.iter().enumerate() {
                if !value.is_finite() {
                    bail!("{} に有限でない値があります: {}", Pollutant::ALL[i], value);
                }
                data_min[i] = data_min[i].min(value);
                data_max[i] = data_max[i].max(value);
            }
        }

        Ok(Self {
            feature_range: (0.0, 1.0),
            labels: Pollutant::label_names(),
            data_min,
            data_max,
        })
    }

    pub fn with_feature_range(mut self, min: f64, max: f64) -> Self {
        self.feature_range = (min, max);
        self
    }

    /// スケーラファイル（JSON）を読み込む
    ///
    /// ファイルが存在しない、または各パラメータの数が 7 でない場合は `RescalerLoad`。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AqiError::RescalerLoad(format!("{}: {}", path.display(), e)))?;
        let scaler: LabelScaler = serde_json::from_str(&content)
            .map_err(|e| AqiError::RescalerLoad(format!("{}: {}", path.display(), e)))?;
        scaler
            .validate()
            .map_err(|reason| AqiError::RescalerLoad(format!("{}: {}", path.display(), reason)))?;

        info!("スケーラを読み込みました: {}", path.display());
        Ok(scaler)
    }

    /// スケーラファイル（JSON）を保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write scaler file: {:?}", path))?;
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.data_min.len() != NUM_POLLUTANTS || self.data_max.len() != NUM_POLLUTANTS {
            return Err(format!(
                "パラメータ数が不正です: data_min={} data_max={} (期待: {})",
                self.data_min.len(),
                self.data_max.len(),
                NUM_POLLUTANTS
            ));
        }
        if self.labels != Pollutant::label_names() {
            return Err(format!("ラベル順が一致しません: {}", self.labels.join(", ")));
        }
        let (lo, hi) = self.feature_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(format!("feature_range が不正です: ({}, {})", lo, hi));
        }
        if self
            .data_min
            .iter()
            .chain(&self.data_max)
            .any(|v| !v.is_finite())
        {
            return Err("有限でない値が含まれています".to_string());
        }
        Ok(())
    }

    /// i 番目の次元の倍率（範囲ゼロの列は 1 として扱う）
    fn scale(&self, i: usize) -> f64 {
        let (lo, hi) = self.feature_range;
        let data_range = self.data_max[i] - self.data_min[i];
        let data_range = if data_range.abs() < 10.0 * f64::EPSILON {
            1.0
        } else {
            data_range
        };
        (hi - lo) / data_range
    }

    fn offset(&self, i: usize) -> f64 {
        self.feature_range.0 - self.data_min[i] * self.scale(i)
    }

    /// 物理値 -> 正規化空間
    pub fn transform(&self, physical: &PollutantValues) -> PollutantValues {
        std::array::from_fn(|i| physical[i] * self.scale(i) + self.offset(i))
    }

    /// モデル出力 -> 物理値（クランプなし）
    pub fn inverse_transform(&self, raw: &RawPrediction) -> PollutantValues {
        let values = raw.values();
        std::array::from_fn(|i| (values[i] as f64 - self.offset(i)) / self.scale(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<PollutantValues> {
        vec![
            [50.0, 10.0, 20.0, 5.0, 0.1, 1.0, 2.0],
            [250.0, 110.0, 320.0, 85.0, 2.1, 21.0, 52.0],
            [150.0, 60.0, 170.0, 45.0, 1.1, 11.0, 27.0],
        ]
    }

    #[test]
    fn test_fit_min_max() {
        let scaler = LabelScaler::fit(&sample_rows()).unwrap();
        assert_eq!(scaler.data_min, vec![50.0, 10.0, 20.0, 5.0, 0.1, 1.0, 2.0]);
        assert_eq!(scaler.data_max, vec![250.0, 110.0, 320.0, 85.0, 2.1, 21.0, 52.0]);
        assert_eq!(scaler.labels, Pollutant::label_names());
    }

    #[test]
    fn test_fit_rejects_empty_and_non_finite() {
        assert!(LabelScaler::fit(&[]).is_err());
        let mut rows = sample_rows();
        rows[1][3] = f64::NAN;
        assert!(LabelScaler::fit(&rows).is_err());
    }

    #[test]
    fn test_inverse_transform_known_values() {
        let scaler = LabelScaler::fit(&sample_rows()).unwrap();
        let physical = scaler.inverse_transform(&RawPrediction::new([0.0, 1.0, 0.5, 0.0, 0.5, 1.0, 0.0]));
        let expected = [50.0, 110.0, 170.0, 5.0, 1.1, 21.0, 2.0];
        for (p, e) in physical.iter().zip(expected.iter()) {
            assert!((p - e).abs() < 1e-6, "{} != {}", p, e);
        }
    }

    #[test]
    fn test_round_trip_law() {
        let scaler = LabelScaler::fit(&sample_rows()).unwrap().with_feature_range(-1.0, 1.0);
        let raw = RawPrediction::new([0.1, -0.3, 0.9, 0.0, 0.75, -1.0, 0.42]);
        let physical = scaler.inverse_transform(&raw);
        let back = scaler.transform(&physical);
        for (b, r) in back.iter().zip(raw.values().iter()) {
            assert!((b - *r as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn test_out_of_distribution_is_not_clamped() {
        let scaler = LabelScaler::fit(&sample_rows()).unwrap();
        let physical = scaler.inverse_transform(&RawPrediction::new([-0.5; 7]));
        // PM2.5: 10 + (-0.5) * 100 = -40
        assert!((physical[Pollutant::Pm25.index()] + 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_column_uses_unit_range() {
        let rows = vec![[3.0; 7], [3.0; 7]];
        let scaler = LabelScaler::fit(&rows).unwrap();
        let physical = scaler.inverse_transform(&RawPrediction::new([0.5; 7]));
        assert!(physical.iter().all(|v| (v - 3.5).abs() < 1e-9));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("label_scaler.json");
        let scaler = LabelScaler::fit(&sample_rows()).unwrap();
        scaler.save(&path).unwrap();
        assert_eq!(LabelScaler::load(&path).unwrap(), scaler);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LabelScaler::load("no/such/scaler.json").unwrap_err();
        assert!(matches!(err, AqiError::RescalerLoad(_)));
    }

    #[test]
    fn test_load_rejects_wrong_parameter_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let mut scaler = LabelScaler::fit(&sample_rows()).unwrap();
        scaler.data_min.pop();
        scaler.save(&path).unwrap();
        assert!(matches!(LabelScaler::load(&path), Err(AqiError::RescalerLoad(_))));
    }

    #[test]
    fn test_load_rejects_wrong_labels_and_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let mut scaler = LabelScaler::fit(&sample_rows()).unwrap();
        scaler.labels.reverse();
        scaler.save(&path).unwrap();
        assert!(matches!(LabelScaler::load(&path), Err(AqiError::RescalerLoad(_))));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(LabelScaler::load(&path), Err(AqiError::RescalerLoad(_))));
    }
}
