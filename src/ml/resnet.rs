//! ResNet-18 / ResNet-34 バックボーン
//!
//! 最終の分類層を 7 出力の回帰ヘッドに置き換えた ResNet です。
//!
//! # アーキテクチャ
//! - Conv 7x7 (stride 2) + BN + ReLU + MaxPool 3x3 (stride 2)
//! - BasicBlock x blocks[0..4]（チャネル 64 / 128 / 256 / 512）
//! - 全体平均プーリング
//! - FC: 512 -> num_outputs

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};

use crate::ml::layers::{global_avg_pool, ConvNorm};
use crate::types::NUM_POLLUTANTS;

/// 最終ステージのチャネル数（回帰ヘッドの入力次元）
pub const RESNET_FEATURE_DIM: usize = 512;

const STAGE_CHANNELS: [usize; 4] = [64, 128, 256, 512];

/// ResNet 設定
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// 各ステージの BasicBlock 数
    pub blocks: [usize; 4],
    /// 出力次元数
    #[config(default = 7)]
    pub num_outputs: usize,
}

impl ResNetConfig {
    pub fn resnet18() -> Self {
        Self::new([2, 2, 2, 2]).with_num_outputs(NUM_POLLUTANTS)
    }

    pub fn resnet34() -> Self {
        Self::new([3, 4, 6, 3]).with_num_outputs(NUM_POLLUTANTS)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let mut in_channels = 64;
        let mut stages = Vec::with_capacity(4);

        for (stage, (&num_blocks, &channels)) in
            self.blocks.iter().zip(STAGE_CHANNELS.iter()).enumerate()
        {
            // 2 段目以降は最初のブロックで解像度を半分にする
            let stride = if stage == 0 { 1 } else { 2 };
            let mut blocks = Vec::with_capacity(num_blocks);
            for i in 0..num_blocks {
                let block_stride = if i == 0 { stride } else { 1 };
                blocks.push(BasicBlock::new(in_channels, channels, block_stride, device));
                in_channels = channels;
            }
            stages.push(blocks);
        }

        let mut stages = stages.into_iter();
        ResNet {
            stem: ConvNorm::new([3, 64], 7, 2, 1, device),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: stages.next().unwrap_or_default(),
            layer2: stages.next().unwrap_or_default(),
            layer3: stages.next().unwrap_or_default(),
            layer4: stages.next().unwrap_or_default(),
            fc: LinearConfig::new(RESNET_FEATURE_DIM, self.num_outputs).init(device),
        }
    }
}

/// 3x3 畳み込み 2 段の残差ブロック
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: ConvNorm<B>,
    conv2: ConvNorm<B>,
    /// 解像度かチャネル数が変わるときの 1x1 射影
    downsample: Option<ConvNorm<B>>,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| ConvNorm::new([in_channels, out_channels], 1, stride, 1, device));

        Self {
            conv1: ConvNorm::new([in_channels, out_channels], 3, stride, 1, device),
            conv2: ConvNorm::new([out_channels, out_channels], 3, 1, 1, device),
            downsample,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(projection) => projection.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward_relu(input);
        let x = self.conv2.forward(x);
        relu(x + identity)
    }
}

/// 回帰ヘッド付き ResNet
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: ConvNorm<B>,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, height, width]
    ///
    /// # 戻り値
    /// - 回帰出力 [batch_size, num_outputs]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem.forward_relu(images);
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        self.fc.forward(global_avg_pool(x))
    }

    /// ステージごとのブロック数
    pub fn block_counts(&self) -> [usize; 4] {
        [
            self.layer1.len(),
            self.layer2.len(),
            self.layer3.len(),
            self.layer4.len(),
        ]
    }
}
