//! 推論パイプライン
//!
//! 画像 → 前処理 → 順伝播 → スケーラ逆変換 → 単位付き整形 の順に処理します。
//! モデルとスケーラは起動時に一度だけ読み込んだ `InferenceContext` にまとめ、
//! 呼び出し側が明示的に渡します。

use std::path::Path;
use std::time::Instant;

use burn::tensor::backend::Backend;
use image::DynamicImage;
use tracing::debug;

use crate::error::{AqiError, Result};
use crate::ml::{decode_image, open_image, preprocess, InferenceEngine, PollutantModel};
use crate::model::{LabelScaler, ModelSettings};
use crate::types::{PhysicalPrediction, Pollutant, PollutantValues};

/// 推論対象の画像
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// 画像ファイルのパス
    Path(&'a Path),
    /// エンコード済みの画像データ（JPEG / PNG など）
    Bytes(&'a [u8]),
}

impl<'a> From<&'a Path> for ImageSource<'a> {
    fn from(path: &'a Path) -> Self {
        ImageSource::Path(path)
    }
}

impl<'a> From<&'a [u8]> for ImageSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for ImageSource<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        ImageSource::Bytes(bytes.as_slice())
    }
}

impl ImageSource<'_> {
    fn decode(self) -> Result<DynamicImage> {
        match self {
            ImageSource::Path(path) => open_image(path),
            ImageSource::Bytes(bytes) => decode_image(bytes),
        }
    }
}

/// 読み込み済みのモデルとスケーラ
///
/// 読み込み後は不変なので `Arc` で共有して複数スレッドから `predict` できます。
pub struct InferenceContext<M: PollutantModel> {
    model: M,
    scaler: LabelScaler,
}

impl<B: Backend> InferenceContext<InferenceEngine<B>> {
    /// 設定に従ってモデルとスケーラを読み込む
    pub fn load(settings: &ModelSettings, device: B::Device) -> Result<Self> {
        let backbone = settings.backbone()?;
        let model = InferenceEngine::load(backbone, &settings.model_path, device)?;
        let scaler = LabelScaler::load(&settings.scaler_path)?;
        Ok(Self::new(model, scaler))
    }
}

impl<M: PollutantModel> InferenceContext<M> {
    pub fn new(model: M, scaler: LabelScaler) -> Self {
        Self { model, scaler }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn scaler(&self) -> &LabelScaler {
        &self.scaler
    }

    /// 画像 1 枚から単位付きの推定結果を返す
    ///
    /// 途中で失敗した場合は部分的な結果を返さずエラーになります。
    pub fn predict<'a>(&self, source: impl Into<ImageSource<'a>>) -> Result<PhysicalPrediction> {
        let image = source.into().decode()?;
        self.predict_image(&image)
    }

    /// デコード済みの画像から単位付きの推定結果を返す
    pub fn predict_image(&self, image: &DynamicImage) -> Result<PhysicalPrediction> {
        let values = self.predict_values(image)?;
        format_prediction(&values)
    }

    /// デコード済みの画像から物理単位の値（整形前）を返す
    pub fn predict_values(&self, image: &DynamicImage) -> Result<PollutantValues> {
        let start = Instant::now();
        let input = preprocess(image)?;
        let raw = self.model.infer(&input)?;
        let values = self.scaler.inverse_transform(&raw);
        debug!(
            "推論完了: {}x{} -> AQI={:.1} ({:.2?})",
            image.width(),
            image.height(),
            values[Pollutant::Aqi.index()],
            start.elapsed()
        );
        Ok(values)
    }
}

/// 物理単位の値を単位付き文字列に整形
///
/// - AQI: 最近接の整数（偶数丸め）の後に空白
/// - その他: 小数第 2 位で丸め、少なくとも 1 桁の小数を付けて `"<値> <単位>"`
pub fn format_prediction(values: &PollutantValues) -> Result<PhysicalPrediction> {
    let entries = Pollutant::ALL
        .iter()
        .map(|&pollutant| {
            let value = values[pollutant.index()];
            let text = match pollutant {
                Pollutant::Aqi => format!("{} {}", format_aqi(value)?, pollutant.unit()),
                _ => format!("{} {}", format_decimal(value), pollutant.unit()),
            };
            Ok((pollutant, text))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PhysicalPrediction::from_entries(entries))
}

fn format_aqi(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(AqiError::InferenceRuntime(format!(
            "AQI を整数に丸められません: {}",
            value
        )));
    }
    // -0.0 を 0 として表示
    Ok(format!("{:.0}", value.round_ties_even() + 0.0))
}

/// 小数第 2 位で丸めた値を最短表現で返す（`30.0`, `0.5`, `12.35`）
pub fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let rounded: f64 = format!("{:.2}", value).parse().unwrap_or(value);
    // 1e16 以上は指数表記（`1e+16`, `-2.5e+20`）
    if rounded.abs() >= 1e16 {
        return exponent_notation(rounded);
    }
    let text = rounded.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn exponent_notation(value: f64) -> String {
    let text = format!("{:e}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}
