//! 推論パイプラインのエラー定義

use thiserror::Error;

/// 推論パイプラインで発生するエラー
///
/// 起動時に発生するもの（`ModelLoad` / `RescalerLoad` / `UnsupportedArchitecture`）は
/// プロセスにとって致命的で、リクエスト単位のもの（`InvalidImage` / `InferenceRuntime`）は
/// 呼び出し元にそのまま返されます。
#[derive(Debug, Error)]
pub enum AqiError {
    /// 画像がデコードできない、空、または面積ゼロ
    #[error("画像を読み込めません: {0}")]
    InvalidImage(String),

    /// モデルの重みが存在しない、壊れている、または形状が合わない
    #[error("モデルの読み込みに失敗しました: {0}")]
    ModelLoad(String),

    /// スケーラファイルが存在しない、またはパラメータ数が 7 ではない
    #[error("スケーラの読み込みに失敗しました: {0}")]
    RescalerLoad(String),

    #[error("未対応のアーキテクチャです: {0}")]
    UnsupportedArchitecture(String),

    /// 順伝播中の数値ランタイムのエラー
    #[error("推論に失敗しました: {0}")]
    InferenceRuntime(String),
}

pub type Result<T> = std::result::Result<T, AqiError>;
