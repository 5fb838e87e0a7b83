//! 推定対象の汚染物質ラベルと単位
//!
//! ラベル順と単位表はこのモジュールでのみ定義します。
//! モデル出力、スケーラ、整形、CSV はすべてここを参照します。

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{AqiError, Result};

/// 出力次元数
pub const NUM_POLLUTANTS: usize = 7;

/// 物理単位に戻した推定値（ラベル順）
pub type PollutantValues = [f64; NUM_POLLUTANTS];

/// 推定対象のラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "AQI")]
    Aqi,
    #[serde(rename = "PM2.5")]
    Pm25,
    #[serde(rename = "PM10")]
    Pm10,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "SO2")]
    So2,
    #[serde(rename = "NO2")]
    No2,
}

impl Pollutant {
    /// モデル出力の並び順
    pub const ALL: [Pollutant; NUM_POLLUTANTS] = [
        Pollutant::Aqi,
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::Co,
        Pollutant::So2,
        Pollutant::No2,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Pollutant::Aqi => "AQI",
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::O3 => "O3",
            Pollutant::Co => "CO",
            Pollutant::So2 => "SO2",
            Pollutant::No2 => "NO2",
        }
    }

    /// 物理単位（AQI は無次元なので空文字）
    pub fn unit(self) -> &'static str {
        match self {
            Pollutant::Aqi => "",
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::O3 | Pollutant::So2 | Pollutant::No2 => "ppb",
            Pollutant::Co => "ppm",
        }
    }

    /// モデル出力ベクトル内の位置
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    /// ラベル名の一覧（メタデータ・スケーラファイル用）
    pub fn label_names() -> Vec<String> {
        Self::ALL.iter().map(|p| p.label().to_string()).collect()
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// モデルの生出力（学習時に正規化された空間の値）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPrediction([f32; NUM_POLLUTANTS]);

impl RawPrediction {
    pub fn new(values: [f32; NUM_POLLUTANTS]) -> Self {
        Self(values)
    }

    /// 推論結果のスライスから作成（長さが 7 以外ならエラー）
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let values: [f32; NUM_POLLUTANTS] = values.try_into().map_err(|_| {
            AqiError::InferenceRuntime(format!(
                "出力次元が不正です: {} (期待: {})",
                values.len(),
                NUM_POLLUTANTS
            ))
        })?;
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32; NUM_POLLUTANTS] {
        &self.0
    }

    pub fn get(&self, pollutant: Pollutant) -> f32 {
        self.0[pollutant.index()]
    }
}

/// 単位付きで整形された推定結果
///
/// JSON にはラベル順を保ったオブジェクトとして書き出されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalPrediction {
    entries: Vec<(Pollutant, String)>,
}

impl PhysicalPrediction {
    pub(crate) fn from_entries(entries: Vec<(Pollutant, String)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| *p == pollutant)
            .map(|(_, text)| text.as_str())
    }

    pub fn get_label(&self, label: &str) -> Option<&str> {
        Pollutant::from_label(label).and_then(|p| self.get(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, &str)> {
        self.entries.iter().map(|(p, text)| (*p, text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PhysicalPrediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (pollutant, text) in &self.entries {
            map.serialize_entry(pollutant.label(), text)?;
        }
        map.end()
    }
}
