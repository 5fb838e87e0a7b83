//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデル・スケーラのパス、HTTP サーバ設定をJSON形式で保存・読み込みします。
//! コマンドライン引数で個別の項目を上書きできます。

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::ml::Backbone;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド（`wgpu` feature が必要）
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "ndarray" => Ok(DeviceType::Cpu),
            "wgpu" | "gpu" => Ok(DeviceType::Wgpu),
            other => Err(format!("未知のデバイスです: {} (cpu / wgpu)", other)),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// モデルアーカイブ（tar.gz）のパス
    pub model_path: PathBuf,
    /// スケーラファイル（JSON）のパス
    pub scaler_path: PathBuf,
    /// バックボーン名 (resnet18 / resnet34 / mobilenet_v2)
    pub architecture: String,
}

impl ModelSettings {
    /// バックボーン名を解釈（未対応の名前は `UnsupportedArchitecture`）
    pub fn backbone(&self) -> Result<Backbone> {
        self.architecture.parse()
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/resnet34_aqi.tar.gz"),
            scaler_path: PathBuf::from("models/label_scaler.json"),
            architecture: Backbone::ResNet34.name().to_string(),
        }
    }
}

/// HTTP サーバ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// 待ち受けアドレス
    pub bind_addr: String,
    /// アップロードの最大サイズ（バイト）
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// HTTP サーバ設定
    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("設定ファイルが存在しません。デフォルト設定を使用します: {}", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        info!("計算デバイス: {}", self.device_type);
        info!("アーキテクチャ: {}", self.model.architecture);
        info!("モデルパス: {}", self.model.model_path.display());
        info!("スケーラパス: {}", self.model.scaler_path.display());
        info!("待ち受けアドレス: {}", self.server.bind_addr);
    }
}

/// コマンドライン引数による設定の上書き
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// 設定ファイル（JSON）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// モデルアーカイブ（tar.gz）
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// スケーラファイル（JSON）
    #[arg(long, global = true)]
    pub scaler: Option<PathBuf>,

    /// バックボーン (resnet18 / resnet34 / mobilenet_v2)
    #[arg(long, global = true)]
    pub arch: Option<Backbone>,

    /// 計算デバイス (cpu / wgpu)
    #[arg(long, global = true)]
    pub device: Option<DeviceType>,
}

impl ConfigOverrides {
    /// 設定ファイルを読み、引数で指定された項目を上書きする
    pub fn resolve(&self) -> AppConfig {
        let path = self.config.clone().unwrap_or_else(AppConfig::default_path);
        let mut config = AppConfig::load_or_default(path);
        self.apply(&mut config);
        config
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model.model_path = model.clone();
        }
        if let Some(scaler) = &self.scaler {
            config.model.scaler_path = scaler.clone();
        }
        if let Some(arch) = self.arch {
            config.model.architecture = arch.name().to_string();
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }
    }
}
