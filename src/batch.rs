//! ディレクトリ内の画像の一括推定

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::ml::PollutantModel;
use crate::predictor::InferenceContext;
use crate::types::PhysicalPrediction;

/// 対象とする画像の拡張子
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// ディレクトリ直下の画像ファイルをファイル名順に列挙
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// ディレクトリ内の全画像を推定する
///
/// 1 枚でも失敗したらその画像のエラーで中断します。
pub fn predict_directory<M: PollutantModel>(
    context: &InferenceContext<M>,
    dir: &Path,
) -> Result<Vec<(String, PhysicalPrediction)>> {
    let images = collect_images(dir)?;
    info!("{} 枚の画像を推定します: {}", images.len(), dir.display());

    let mut results = Vec::with_capacity(images.len());
    for (i, path) in images.iter().enumerate() {
        let prediction = context
            .predict(path.as_path())
            .with_context(|| format!("推定に失敗しました: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("[{}/{}] {}", i + 1, images.len(), filename);
        results.push((filename, prediction));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::types::NUM_POLLUTANTS;

    fn context() -> InferenceContext<ChannelMeanModel> {
        InferenceContext::new(ChannelMeanModel, scaler_with_max([500.0; NUM_POLLUTANTS]))
    }

    #[test]
    fn test_collect_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "c.jpeg", "notes.txt", "d.gif"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = collect_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.png", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn test_predict_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.png"), encode_png(&noise_image(30, 20, 1))).unwrap();
        std::fs::write(dir.path().join("two.png"), encode_png(&noise_image(30, 20, 2))).unwrap();

        let results = predict_directory(&context(), dir.path()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "one.png");
        assert_eq!(results[1].1.len(), NUM_POLLUTANTS);
    }

    #[test]
    fn test_predict_directory_aborts_on_bad_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), encode_png(&gradient_image(10, 10))).unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"truncated").unwrap();

        let err = predict_directory(&context(), dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("b.jpg"));
    }
}
