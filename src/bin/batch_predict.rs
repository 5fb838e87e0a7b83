//! ディレクトリ内の画像を一括推定して CSV に書き出す

use std::path::PathBuf;

use anyhow::Result;
use burn::tensor::backend::Backend;
use clap::Parser;
use tracing::info;

use sky_aqi_lib::batch::predict_directory;
use sky_aqi_lib::csv_loader::write_predictions;
use sky_aqi_lib::logging::init_logging;
use sky_aqi_lib::ml::{run_on_device, BackendTask, InferenceEngine};
use sky_aqi_lib::model::{ConfigOverrides, ModelSettings};
use sky_aqi_lib::InferenceContext;

#[derive(Parser, Debug)]
#[command(name = "batch_predict", about = "ディレクトリ内の画像 (png/jpg/jpeg) を一括推定します")]
struct Args {
    /// 画像ディレクトリ
    dir: PathBuf,

    /// 出力 CSV
    #[arg(long, short, default_value = "predictions.csv")]
    output: PathBuf,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

struct BatchTask {
    settings: ModelSettings,
    dir: PathBuf,
    output: PathBuf,
}

impl BackendTask for BatchTask {
    type Output = usize;

    fn run<B: Backend>(self, device: B::Device) -> Result<usize> {
        let context = InferenceContext::<InferenceEngine<B>>::load(&self.settings, device)?;
        let results = predict_directory(&context, &self.dir)?;
        write_predictions(&self.output, &results)?;
        Ok(results.len())
    }
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = args.overrides.resolve();

    let output = args.output.clone();
    let count = run_on_device(
        config.device_type,
        BatchTask {
            settings: config.model,
            dir: args.dir,
            output: args.output,
        },
    )?;
    info!("{} 件の推定結果を保存しました: {}", count, output.display());
    Ok(())
}
