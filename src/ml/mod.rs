pub mod backbone;
pub mod device;
pub mod inference;
pub mod layers;
pub mod mobilenet;
pub mod preprocess;
pub mod resnet;

pub use backbone::{Backbone, PollutantRegressor};
pub use device::{run_on_device, BackendTask};
pub use inference::{InferenceEngine, PollutantModel};
pub use preprocess::{decode_image, open_image, preprocess, ImageTensor, IMAGE_SIZE};
