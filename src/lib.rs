//! 空の写真から AQI と大気汚染物質の濃度を推定するライブラリ
//!
//! 推論は [`predictor::InferenceContext`] を起点に行います。

pub mod api;
pub mod batch;
pub mod csv_loader;
pub mod error;
pub mod logging;
pub mod ml;
pub mod model;
pub mod predictor;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use error::{AqiError, Result};
pub use predictor::{format_prediction, ImageSource, InferenceContext};
pub use types::{PhysicalPrediction, Pollutant, PollutantValues, RawPrediction, NUM_POLLUTANTS};
