pub mod config;
pub mod model_metadata;
pub mod model_storage;
pub mod scaler;

pub use config::{AppConfig, ConfigOverrides, DeviceType, ModelSettings, ServerSettings};
pub use model_metadata::ModelMetadata;
pub use model_storage::{load_metadata, load_model_binary, load_model_with_metadata, save_model_with_metadata};
pub use scaler::LabelScaler;
