//! MobileNetV2 バックボーン
//!
//! classifier の Linear を 7 出力の回帰ヘッドに置き換えた MobileNetV2 (width 1.0) です。

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

use crate::ml::layers::{global_avg_pool, ConvNorm};
use crate::types::NUM_POLLUTANTS;

/// 最終特徴の次元（回帰ヘッドの入力次元）
pub const MOBILENET_FEATURE_DIM: usize = 1280;

/// 反転残差ブロックの設定 (拡張率 t, 出力チャネル c, 繰り返し n, stride s)
const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// MobileNetV2 設定
#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    /// 出力次元数
    #[config(default = 7)]
    pub num_outputs: usize,
    /// 回帰ヘッド前のドロップアウト率（推論時は無効）
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl MobileNetV2Config {
    pub fn regression() -> Self {
        Self::new().with_num_outputs(NUM_POLLUTANTS)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV2<B> {
        let mut in_channels = 32;
        let mut blocks = Vec::new();

        for &(expand_ratio, out_channels, repeats, stride) in INVERTED_RESIDUAL_SETTINGS.iter() {
            for i in 0..repeats {
                let block_stride = if i == 0 { stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    block_stride,
                    expand_ratio,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        MobileNetV2 {
            stem: ConvNorm::new([3, 32], 3, 2, 1, device),
            blocks,
            last_conv: ConvNorm::new([in_channels, MOBILENET_FEATURE_DIM], 1, 1, 1, device),
            dropout: DropoutConfig::new(self.dropout).init(),
            classifier: LinearConfig::new(MOBILENET_FEATURE_DIM, self.num_outputs).init(device),
        }
    }
}

/// 反転残差ブロック（expand 1x1 -> depthwise 3x3 -> project 1x1）
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<ConvNorm<B>>,
    depthwise: ConvNorm<B>,
    project: ConvNorm<B>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expand_ratio: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand =
            (expand_ratio != 1).then(|| ConvNorm::new([in_channels, hidden], 1, 1, 1, device));

        Self {
            expand,
            depthwise: ConvNorm::new([hidden, hidden], 3, stride, hidden, device),
            project: ConvNorm::new([hidden, out_channels], 1, 1, 1, device),
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward_relu6(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward_relu6(x);
        // 射影は線形（活性化なし）
        let x = self.project.forward(x);

        if self.use_residual {
            x + input
        } else {
            x
        }
    }
}

/// 回帰ヘッド付き MobileNetV2
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    stem: ConvNorm<B>,
    blocks: Vec<InvertedResidual<B>>,
    last_conv: ConvNorm<B>,
    dropout: Dropout,
    pub classifier: Linear<B>,
}

impl<B: Backend> MobileNetV2<B> {
    /// 順伝播
    ///
    /// - `images`: [batch_size, 3, height, width] -> [batch_size, num_outputs]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward_relu6(images);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.last_conv.forward_relu6(x);

        let x = self.dropout.forward(global_avg_pool(x));
        self.classifier.forward(x)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_block_count() {
        let device = Default::default();
        let model = MobileNetV2Config::regression().init::<TestBackend>(&device);
        assert_eq!(model.num_blocks(), 17);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = MobileNetV2Config::regression().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(model.forward(images).dims(), [1, NUM_POLLUTANTS]);
    }
}
