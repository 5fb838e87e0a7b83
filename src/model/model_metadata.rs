//! モデルメタデータの定義
//!
//! モデルアーカイブ（tar.gz）内の `metadata.json` に保存される情報です。
//! 重みのバイナリ自体は形状情報を持たないため、読み込み時にはまずこの内容を
//! 要求されたバックボーンと照合します。

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::{Backbone, IMAGE_SIZE};
use crate::types::{Pollutant, NUM_POLLUTANTS};

/// モデルメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// バックボーン名（例: "resnet34"）
    pub architecture: Backbone,

    /// 出力ラベル（出力ベクトルの並び順）
    pub labels: Vec<String>,

    /// 出力次元数（常に 7）
    pub num_outputs: usize,

    /// モデル入力サイズ（正方形、通常 224）
    pub model_input_size: u32,

    /// 作成時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(architecture: Backbone) -> Self {
        Self {
            architecture,
            labels: Pollutant::label_names(),
            num_outputs: NUM_POLLUTANTS,
            model_input_size: IMAGE_SIZE as u32,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 指定したバックボーンで読み込めるか検証
    pub fn validate_for(&self, backbone: Backbone) -> Result<()> {
        if self.architecture != backbone {
            bail!(
                "アーキテクチャが一致しません: アーカイブ={} 要求={}",
                self.architecture,
                backbone
            );
        }
        if self.num_outputs != NUM_POLLUTANTS {
            bail!(
                "出力次元が不正です: {} (期待: {})",
                self.num_outputs,
                NUM_POLLUTANTS
            );
        }
        if self.labels != Pollutant::label_names() {
            bail!("ラベル順が一致しません: {}", self.labels.join(", "));
        }
        if self.model_input_size as usize != IMAGE_SIZE {
            bail!(
                "入力サイズが不正です: {} (期待: {})",
                self.model_input_size,
                IMAGE_SIZE
            );
        }
        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }

    /// ログ出力用の要約
    pub fn summary(&self) -> String {
        format!(
            "architecture={} outputs={} labels=[{}] input={}x{} trained_at={}",
            self.architecture,
            self.num_outputs,
            self.labels.join(", "),
            self.model_input_size,
            self.model_input_size,
            self.trained_at
        )
    }
}
