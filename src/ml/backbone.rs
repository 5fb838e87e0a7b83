//! 対応バックボーンの列挙と回帰モデル
//!
//! バックボーンは閉じた列挙で扱い、各バリアントが自身の回帰ヘッド付きネットワークを
//! 構築します。バックボーンを追加するときは `Backbone` と `PollutantRegressor` の
//! 両方に分岐を足す必要があり、漏れはコンパイル時に検出されます。

use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use burn::{
    module::Module,
    nn::Linear,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder, RecorderError},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::error::AqiError;
use crate::ml::inference::panic_message;
use crate::ml::mobilenet::{MobileNetV2, MobileNetV2Config, MOBILENET_FEATURE_DIM};
use crate::ml::resnet::{ResNet, ResNetConfig, RESNET_FEATURE_DIM};

/// 対応バックボーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backbone {
    #[serde(rename = "resnet18")]
    ResNet18,
    #[serde(rename = "resnet34")]
    ResNet34,
    #[serde(rename = "mobilenet_v2")]
    MobileNetV2,
}

impl Backbone {
    pub const ALL: [Backbone; 3] = [Backbone::ResNet18, Backbone::ResNet34, Backbone::MobileNetV2];

    pub fn name(self) -> &'static str {
        match self {
            Backbone::ResNet18 => "resnet18",
            Backbone::ResNet34 => "resnet34",
            Backbone::MobileNetV2 => "mobilenet_v2",
        }
    }

    /// 回帰ヘッドの入力次元
    pub fn feature_dim(self) -> usize {
        match self {
            Backbone::ResNet18 | Backbone::ResNet34 => RESNET_FEATURE_DIM,
            Backbone::MobileNetV2 => MOBILENET_FEATURE_DIM,
        }
    }

    /// 回帰ヘッド付きのモデルを初期化
    pub fn init<B: Backend>(self, device: &B::Device) -> PollutantRegressor<B> {
        match self {
            Backbone::ResNet18 => PollutantRegressor::ResNet(ResNetConfig::resnet18().init(device)),
            Backbone::ResNet34 => PollutantRegressor::ResNet(ResNetConfig::resnet34().init(device)),
            Backbone::MobileNetV2 => {
                PollutantRegressor::MobileNetV2(MobileNetV2Config::regression().init(device))
            }
        }
    }
}

impl std::fmt::Display for Backbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backbone {
    type Err = AqiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backbone::ALL
            .into_iter()
            .find(|backbone| backbone.name() == s)
            .ok_or_else(|| {
                let supported: Vec<&str> = Backbone::ALL.iter().map(|b| b.name()).collect();
                AqiError::UnsupportedArchitecture(format!(
                    "{} (対応: {})",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

/// 汚染物質回帰モデル
#[derive(Debug, Clone)]
pub enum PollutantRegressor<B: Backend> {
    ResNet(ResNet<B>),
    MobileNetV2(MobileNetV2<B>),
}

impl<B: Backend> PollutantRegressor<B> {
    /// 順伝播 [batch_size, 3, H, W] -> [batch_size, 7]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            PollutantRegressor::ResNet(net) => net.forward(images),
            PollutantRegressor::MobileNetV2(net) => net.forward(images),
        }
    }

    /// 回帰ヘッド
    pub fn head(&self) -> &Linear<B> {
        match self {
            PollutantRegressor::ResNet(net) => &net.fc,
            PollutantRegressor::MobileNetV2(net) => &net.classifier,
        }
    }

    #[cfg(test)]
    pub(crate) fn head_mut(&mut self) -> &mut Linear<B> {
        match self {
            PollutantRegressor::ResNet(net) => &mut net.fc,
            PollutantRegressor::MobileNetV2(net) => &mut net.classifier,
        }
    }

    /// 回帰ヘッドの重みの形状 [入力次元, 出力次元]
    pub fn head_dims(&self) -> [usize; 2] {
        self.head().weight.val().dims()
    }

    pub fn num_params(&self) -> usize {
        match self {
            PollutantRegressor::ResNet(net) => net.num_params(),
            PollutantRegressor::MobileNetV2(net) => net.num_params(),
        }
    }

    /// バイナリ（BinBytesRecorder 形式）から重みを復元
    ///
    /// 壊れたバイナリや構造の異なる重みでは `BinBytesRecorder` がパニックするため、
    /// パニックも `RecorderError::DeserializeError` として返します。
    pub fn load_bytes(self, bytes: Vec<u8>, device: &B::Device) -> Result<Self, RecorderError> {
        panic::catch_unwind(AssertUnwindSafe(move || self.restore(bytes, device))).unwrap_or_else(
            |payload| Err(RecorderError::DeserializeError(panic_message(&payload))),
        )
    }

    fn restore(self, bytes: Vec<u8>, device: &B::Device) -> Result<Self, RecorderError> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        Ok(match self {
            PollutantRegressor::ResNet(net) => {
                let record = recorder.load(bytes, device)?;
                PollutantRegressor::ResNet(net.load_record(record))
            }
            PollutantRegressor::MobileNetV2(net) => {
                let record = recorder.load(bytes, device)?;
                PollutantRegressor::MobileNetV2(net.load_record(record))
            }
        })
    }

    /// 重みを BinBytesRecorder 形式のバイナリに変換
    pub fn to_bytes(self) -> Result<Vec<u8>, RecorderError> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        match self {
            PollutantRegressor::ResNet(net) => recorder.record(net.into_record(), ()),
            PollutantRegressor::MobileNetV2(net) => recorder.record(net.into_record(), ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NUM_POLLUTANTS;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_parse_supported_names() {
        for backbone in Backbone::ALL {
            assert_eq!(backbone.name().parse::<Backbone>().unwrap(), backbone);
            assert_eq!(backbone.to_string(), backbone.name());
        }
    }

    #[test]
    fn test_parse_unsupported_name() {
        let err = "vgg16".parse::<Backbone>().unwrap_err();
        assert!(matches!(err, AqiError::UnsupportedArchitecture(_)));
        assert!("ResNet18".parse::<Backbone>().is_err());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&Backbone::MobileNetV2).unwrap();
        assert_eq!(json, "\"mobilenet_v2\"");
        let parsed: Backbone = serde_json::from_str("\"resnet34\"").unwrap();
        assert_eq!(parsed, Backbone::ResNet34);
    }

    #[test]
    fn test_head_is_replaced_with_seven_outputs() {
        let device = Default::default();
        for backbone in Backbone::ALL {
            let model = backbone.init::<TestBackend>(&device);
            assert_eq!(model.head_dims(), [backbone.feature_dim(), NUM_POLLUTANTS]);
        }
    }

    #[test]
    fn test_bytes_round_trip_preserves_outputs() {
        let device = Default::default();
        let model = Backbone::MobileNetV2.init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([1, 3, 64, 64], Distribution::Default, &device);
        let expected = model.forward(images.clone()).into_data().to_vec::<f32>().unwrap();

        let bytes = model.to_bytes().unwrap();
        let restored = Backbone::MobileNetV2
            .init::<TestBackend>(&device)
            .load_bytes(bytes, &device)
            .unwrap();

        let actual = restored.forward(images).into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_load_bytes_rejects_garbage() {
        let device = Default::default();
        let model = Backbone::ResNet18.init::<TestBackend>(&device);
        let err = model.load_bytes(vec![1, 2, 3], &device).unwrap_err();
        assert!(matches!(err, RecorderError::DeserializeError(_)));
    }
}
