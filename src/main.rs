//! sky_aqi コマンド
//!
//! - `serve`       推論 HTTP サーバを起動
//! - `predict`     画像ファイルを推定して JSON を出力
//! - `fit-scaler`  データセット CSV からラベルスケーラを作成
//! - `init-model`  初期化済み（未学習）のモデルアーカイブを作成
//! - `inspect`     モデルアーカイブのメタデータを表示
//! - `init-config` デフォルト設定ファイルを作成

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use clap::{Parser, Subcommand};
use tracing::info;

use sky_aqi_lib::api::{self, handlers::PredictionResponse};
use sky_aqi_lib::csv_loader::load_label_rows;
use sky_aqi_lib::logging::init_logging;
use sky_aqi_lib::ml::{run_on_device, BackendTask, InferenceEngine};
use sky_aqi_lib::model::{
    load_metadata, save_model_with_metadata, AppConfig, ConfigOverrides, LabelScaler,
    ModelMetadata,
};
use sky_aqi_lib::InferenceContext;

#[derive(Parser, Debug)]
#[command(name = "sky_aqi", version, about = "空の写真から AQI と汚染物質濃度を推定します")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 推論 HTTP サーバを起動
    Serve {
        /// 待ち受けアドレス（例: 0.0.0.0:8000）
        #[arg(long)]
        bind: Option<String>,

        /// アップロードの最大サイズ（バイト）
        #[arg(long)]
        max_upload_bytes: Option<usize>,
    },

    /// 画像ファイルを推定
    Predict {
        /// 画像ファイル
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// 整形済み JSON で出力
        #[arg(long)]
        pretty: bool,
    },

    /// データセット CSV からラベルスケーラを作成
    FitScaler {
        /// `Filename` と 7 つのラベル列を持つ CSV
        #[arg(long)]
        csv: PathBuf,

        /// 出力先（省略時は設定のスケーラパス）
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// 初期化済み（未学習）のモデルアーカイブを作成
    InitModel {
        /// 出力先（省略時は設定のモデルパス）
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// モデルアーカイブのメタデータを表示
    Inspect {
        /// モデルアーカイブ（省略時は設定のモデルパス）
        path: Option<PathBuf>,
    },

    /// デフォルト設定ファイルを作成
    InitConfig {
        /// 出力先
        #[arg(long, default_value = "config.json")]
        output: PathBuf,
    },
}

/// モデルとスケーラを読み込んでサーバを起動
struct ServeTask {
    config: AppConfig,
}

impl BackendTask for ServeTask {
    type Output = ();

    fn run<B: Backend>(self, device: B::Device) -> Result<()> {
        let context = InferenceContext::<InferenceEngine<B>>::load(&self.config.model, device)?;
        let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
        runtime.block_on(api::serve(Arc::new(context), &self.config.server))
    }
}

/// 画像ファイルを順に推定して 1 行ずつ JSON を出力
struct PredictTask {
    config: AppConfig,
    images: Vec<PathBuf>,
    pretty: bool,
}

impl BackendTask for PredictTask {
    type Output = ();

    fn run<B: Backend>(self, device: B::Device) -> Result<()> {
        let context = InferenceContext::<InferenceEngine<B>>::load(&self.config.model, device)?;
        for path in &self.images {
            let predictions = context
                .predict(path.as_path())
                .with_context(|| format!("推定に失敗しました: {}", path.display()))?;
            let response = PredictionResponse {
                filename: path.display().to_string(),
                predictions,
            };
            let json = if self.pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{}", json);
        }
        Ok(())
    }
}

/// 初期化済みモデルをアーカイブとして保存
struct InitModelTask {
    config: AppConfig,
    output: PathBuf,
}

impl BackendTask for InitModelTask {
    type Output = PathBuf;

    fn run<B: Backend>(self, device: B::Device) -> Result<PathBuf> {
        let architecture = self.config.model.backbone()?;
        let model = architecture.init::<B>(&device);
        info!("{} を初期化しました ({} パラメータ)", architecture, model.num_params());

        let binary = model
            .to_bytes()
            .map_err(|e| anyhow::anyhow!("モデルのシリアライズに失敗しました: {:?}", e))?;
        save_model_with_metadata(&self.output, &ModelMetadata::new(architecture), &binary)
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = cli.overrides.resolve();

    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
        } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(max) = max_upload_bytes {
                config.server.max_upload_bytes = max;
            }
            config.log_summary();
            run_on_device(config.device_type, ServeTask { config })
        }
        Command::Predict { images, pretty } => run_on_device(
            config.device_type,
            PredictTask {
                config,
                images,
                pretty,
            },
        ),
        Command::FitScaler { csv, output } => {
            let rows = load_label_rows(&csv)?;
            info!("{} 行を読み込みました: {}", rows.len(), csv.display());
            let values: Vec<_> = rows.iter().map(|row| row.values).collect();
            let scaler = LabelScaler::fit(&values)?;

            let output = output.unwrap_or(config.model.scaler_path);
            scaler.save(&output)?;
            info!("スケーラを保存しました: {}", output.display());
            Ok(())
        }
        Command::InitModel { output } => {
            let output = output.unwrap_or_else(|| config.model.model_path.clone());
            let saved = run_on_device(config.device_type, InitModelTask { config, output })?;
            info!("モデルを保存しました: {}", saved.display());
            Ok(())
        }
        Command::Inspect { path } => {
            let path = path.unwrap_or_else(|| config.model.model_path.clone());
            let metadata = load_metadata(&path)?;
            println!("=== {} ===", path.display());
            println!("アーキテクチャ: {}", metadata.architecture);
            println!("ラベル: {}", metadata.labels.join(", "));
            println!("出力次元: {}", metadata.num_outputs);
            println!(
                "入力サイズ: {}x{}",
                metadata.model_input_size, metadata.model_input_size
            );
            println!("作成日時: {}", metadata.trained_at);
            match config.model.backbone() {
                Ok(backbone) => match metadata.validate_for(backbone) {
                    Ok(()) => println!("設定のアーキテクチャ {} で読み込めます", backbone),
                    Err(e) => println!("警告: {:#}", e),
                },
                Err(e) => println!("警告: {}", e),
            }
            Ok(())
        }
        Command::InitConfig { output } => {
            config.save(&output)?;
            info!("設定ファイルを保存しました: {}", output.display());
            Ok(())
        }
    }
}
