//! 計算デバイスの選択
//!
//! 設定の `DeviceType` から Burn のバックエンドを選び、バックエンドに依存する処理を実行します。
//! WGPU バックエンドは `wgpu` feature を有効にしたときのみ使えます。

use anyhow::Result;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::tensor::backend::Backend;
use tracing::info;

use crate::model::DeviceType;

/// バックエンドを型引数として受け取る処理
pub trait BackendTask {
    type Output;

    fn run<B: Backend>(self, device: B::Device) -> Result<Self::Output>;
}

/// 指定されたデバイスで処理を実行
pub fn run_on_device<T: BackendTask>(device_type: DeviceType, task: T) -> Result<T::Output> {
    info!("計算デバイス: {}", device_type);
    match device_type {
        DeviceType::Cpu => task.run::<NdArray>(NdArrayDevice::Cpu),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => {
            task.run::<burn::backend::Wgpu>(burn::backend::wgpu::WgpuDevice::default())
        }
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => anyhow::bail!(
            "WGPU バックエンドは無効です。`--features wgpu` でビルドするか、デバイスに cpu を指定してください"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, Tensor};

    struct SumTask(Vec<f32>);

    impl BackendTask for SumTask {
        type Output = f32;

        fn run<B: Backend>(self, device: B::Device) -> Result<f32> {
            let tensor = Tensor::<B, 1>::from_floats(self.0.as_slice(), &device);
            Ok(tensor.sum().into_scalar().elem::<f32>())
        }
    }

    #[test]
    fn test_run_on_cpu() {
        let sum = run_on_device(DeviceType::Cpu, SumTask(vec![1.0, 2.0, 3.5])).unwrap();
        assert!((sum - 6.5).abs() < 1e-6);
    }

    #[cfg(not(feature = "wgpu"))]
    #[test]
    fn test_wgpu_requires_feature() {
        assert!(run_on_device(DeviceType::Wgpu, SumTask(vec![1.0])).is_err());
    }
}
