//! 画像の前処理
//!
//! 任意サイズの画像を 224x224 にリサイズし、ImageNet の平均と標準偏差で正規化した
//! (C, H, W) 順の f32 配列に変換します。学習時と同じ変換です。

use std::path::Path;

use image::imageops::{self, FilterType};
use image::DynamicImage;

use crate::error::{AqiError, Result};

/// モデル入力の一辺のサイズ
pub const IMAGE_SIZE: usize = 224;

/// ImageNet の平均（RGB）
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet の標準偏差（RGB）
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// リサイズ時の補間方法（バイリニア）
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// 正規化済みの入力テンソル [3, 224, 224]
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub const SHAPE: [usize; 3] = [3, IMAGE_SIZE, IMAGE_SIZE];

    /// 全要素ゼロのテンソル（読み込み時の試行推論用）
    pub fn zeros() -> Self {
        Self {
            data: vec![0.0; 3 * IMAGE_SIZE * IMAGE_SIZE],
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// 1 チャネル分（H * W 要素）のデータ
    pub fn channel(&self, channel: usize) -> &[f32] {
        let plane = IMAGE_SIZE * IMAGE_SIZE;
        &self.data[channel * plane..(channel + 1) * plane]
    }
}

/// バイト列から画像をデコード
///
/// 形式は拡張子ではなく内容から判定します。
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AqiError::InvalidImage("空のデータです".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| AqiError::InvalidImage(e.to_string()))
}

/// 画像ファイルを読み込んでデコード
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| AqiError::InvalidImage(format!("{}: {}", path.display(), e)))?;
    decode_image(&bytes)
}

/// 画像をモデル入力テンソルに変換
///
/// アスペクト比は保持せず 224x224 に拡縮し、[0, 1] に変換した後
/// チャネルごとに `(value - mean) / std` で正規化します。
pub fn preprocess(image: &DynamicImage) -> Result<ImageTensor> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(AqiError::InvalidImage(format!(
            "画像サイズが不正です: {}x{}",
            width, height
        )));
    }

    // RGBA やグレースケールは RGB に変換（アルファは破棄）
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, IMAGE_SIZE as u32, IMAGE_SIZE as u32, RESIZE_FILTER);

    let mut data = Vec::with_capacity(3 * IMAGE_SIZE * IMAGE_SIZE);
    for channel in 0..3 {
        for pixel in resized.pixels() {
            let value = pixel[channel] as f32 / 255.0;
            data.push((value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]);
        }
    }

    Ok(ImageTensor { data })
}
