//! モデル推論機能
//!
//! `PollutantModel` は前処理済みテンソルから 7 次元の生出力を返す推論の境界です。
//! 実装は学習済みの重みを持つ `InferenceEngine` ですが、テストでは重みを持たない
//! モックに差し替えられます。

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor};
use tracing::{debug, info};

use crate::error::{AqiError, Result};
use crate::ml::backbone::{Backbone, PollutantRegressor};
use crate::ml::preprocess::{ImageTensor, IMAGE_SIZE};
use crate::model::{load_model_with_metadata, ModelMetadata};
use crate::types::{RawPrediction, NUM_POLLUTANTS};

/// 推論モデルの共通インターフェース
///
/// 複数スレッドから同時に呼ばれても安全である必要があります。
pub trait PollutantModel: Send + Sync {
    /// ログやヘルスチェック用の説明
    fn describe(&self) -> String;

    /// 前処理済みの画像 1 枚から正規化空間の 7 値を推定
    fn infer(&self, input: &ImageTensor) -> Result<RawPrediction>;
}

/// 推論エンジン
///
/// 順伝播は内部の `Mutex` で直列化されます。
pub struct InferenceEngine<B: Backend> {
    model: Mutex<PollutantRegressor<B>>,
    backbone: Backbone,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルアーカイブを読み込んで推論エンジンを初期化
    ///
    /// アーカイブが存在しない・壊れている、メタデータが要求と合わない、
    /// 重みの形状が合わない場合はすべて `ModelLoad` になります。
    pub fn load(backbone: Backbone, model_path: &Path, device: B::Device) -> Result<Self> {
        let start = Instant::now();

        let (metadata, model_binary) = load_model_with_metadata(model_path)
            .map_err(|e| AqiError::ModelLoad(format!("{}: {:#}", model_path.display(), e)))?;
        debug!("メタデータ: {}", metadata.summary());

        metadata
            .validate_for(backbone)
            .map_err(|e| AqiError::ModelLoad(format!("{}: {:#}", model_path.display(), e)))?;

        let restored = backbone
            .init::<B>(&device)
            .load_bytes(model_binary, &device)
            .map_err(|e| AqiError::ModelLoad(format!("重みの復元に失敗しました: {:?}", e)))?;

        let engine = Self::from_regressor(backbone, metadata, restored, device)?;

        info!(
            "モデルを読み込みました: {} ({} パラメータ, {:.2?})",
            model_path.display(),
            engine.num_params(),
            start.elapsed()
        );
        Ok(engine)
    }

    /// 構築済みのネットワークから推論エンジンを作成
    ///
    /// 回帰ヘッドの形状を確認し、ゼロ画像で一度順伝播して読み込み時に不整合を検出します。
    pub fn from_regressor(
        backbone: Backbone,
        metadata: ModelMetadata,
        model: PollutantRegressor<B>,
        device: B::Device,
    ) -> Result<Self> {
        let expected = [backbone.feature_dim(), NUM_POLLUTANTS];
        let actual = model.head_dims();
        if actual != expected {
            return Err(AqiError::ModelLoad(format!(
                "回帰ヘッドの形状が不正です: {:?} (期待: {:?})",
                actual, expected
            )));
        }

        let engine = Self {
            model: Mutex::new(model),
            backbone,
            metadata,
            device,
        };

        let blank = ImageTensor::zeros();
        engine
            .infer(&blank)
            .map_err(|e| AqiError::ModelLoad(format!("試行推論に失敗しました: {}", e)))?;

        Ok(engine)
    }

    pub fn backbone(&self) -> Backbone {
        self.backbone
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn num_params(&self) -> usize {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .num_params()
    }

    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        // Tensorに変換 [1, 3, 224, 224]
        let tensor = Tensor::<B, 1>::from_floats(input.as_slice(), &self.device)
            .reshape([1, 3, IMAGE_SIZE, IMAGE_SIZE]);

        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let output = panic::catch_unwind(AssertUnwindSafe(|| model.forward(tensor)))
            .map_err(|payload| AqiError::InferenceRuntime(panic_message(&payload)))?;
        drop(model);

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| AqiError::InferenceRuntime(format!("推論結果の取得エラー: {:?}", e)))
    }
}

impl<B: Backend> PollutantModel for InferenceEngine<B> {
    fn describe(&self) -> String {
        self.backbone.to_string()
    }

    fn infer(&self, input: &ImageTensor) -> Result<RawPrediction> {
        let start = Instant::now();
        let output = self.forward(input)?;
        debug!("順伝播: {:.2?}", start.elapsed());
        RawPrediction::from_slice(&output)
    }
}

pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "不明なパニック".to_string()
    }
}
