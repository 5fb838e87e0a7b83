//! テスト用の画像生成とモックモデル

use std::io::Cursor;

use burn::module::Param;
use burn::tensor::{backend::Backend, Tensor};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{AqiError, Result};
use crate::ml::{ImageTensor, PollutantModel, PollutantRegressor};
use crate::model::LabelScaler;
use crate::types::{RawPrediction, NUM_POLLUTANTS};

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    }))
}

/// シード固定のノイズ画像
pub fn noise_image(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.gen(), rng.gen(), rng.gen()])
    }))
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// 各チャネルの平均値から出力を作るモック
///
/// 入力画像ごとに異なる出力を返すので、並行呼び出しの取り違えを検出できます。
pub struct ChannelMeanModel;

impl PollutantModel for ChannelMeanModel {
    fn describe(&self) -> String {
        "channel-mean".to_string()
    }

    fn infer(&self, input: &ImageTensor) -> Result<RawPrediction> {
        let mean = |c: usize| {
            let channel = input.channel(c);
            channel.iter().sum::<f32>() / channel.len() as f32
        };
        let (r, g, b) = (mean(0), mean(1), mean(2));
        Ok(RawPrediction::new([r, g, b, r - g, g - b, b - r, (r + g + b) / 3.0]))
    }
}

/// 常に同じ値を返すモック
pub struct FixedModel(pub RawPrediction);

impl PollutantModel for FixedModel {
    fn describe(&self) -> String {
        "fixed".to_string()
    }

    fn infer(&self, _input: &ImageTensor) -> Result<RawPrediction> {
        Ok(self.0)
    }
}

/// 常に数値エラーを返すモック
pub struct FailingModel;

impl PollutantModel for FailingModel {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn infer(&self, _input: &ImageTensor) -> Result<RawPrediction> {
        Err(AqiError::InferenceRuntime("モックの失敗".to_string()))
    }
}

/// data_min = 0, data_max = `max` のスケーラ（逆変換は `raw * max`）
pub fn scaler_with_max(max: [f64; NUM_POLLUTANTS]) -> LabelScaler {
    LabelScaler::fit(&[[0.0; NUM_POLLUTANTS], max]).unwrap()
}

/// 回帰ヘッドの重みをゼロにして、出力が常に `bias` になるようにする
pub fn set_constant_head<B: Backend>(
    model: &mut PollutantRegressor<B>,
    bias: [f32; NUM_POLLUTANTS],
    device: &B::Device,
) {
    let [d_input, d_output] = model.head_dims();
    let head = model.head_mut();
    head.weight = Param::from_tensor(Tensor::zeros([d_input, d_output], device));
    head.bias = Some(Param::from_tensor(Tensor::from_floats(bias, device)));
}
