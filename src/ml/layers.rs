//! バックボーン共通の層
//!
//! 推論専用なので BatchNorm は学習済みの移動平均・分散を固定して使います。

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};

/// 統計量を固定した BatchNorm (2D)
#[derive(Module, Debug)]
pub struct FrozenBatchNorm2d<B: Backend> {
    pub gamma: Param<Tensor<B, 1>>,
    pub beta: Param<Tensor<B, 1>>,
    pub running_mean: Param<Tensor<B, 1>>,
    pub running_var: Param<Tensor<B, 1>>,
    epsilon: f64,
}

impl<B: Backend> FrozenBatchNorm2d<B> {
    /// 恒等変換に近い初期値（gamma=1, beta=0, mean=0, var=1）で作成
    pub fn new(num_features: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([num_features], device)),
            beta: Param::from_tensor(Tensor::zeros([num_features], device)),
            running_mean: Param::from_tensor(Tensor::zeros([num_features], device)),
            running_var: Param::from_tensor(Tensor::ones([num_features], device)),
            epsilon: 1e-5,
        }
    }

    /// 順伝播
    ///
    /// - `input`: [batch_size, channels, height, width]
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.gamma.val().dims();

        let scale = self.gamma.val() / self.running_var.val().add_scalar(self.epsilon).sqrt();
        let shift = self.beta.val() - self.running_mean.val() * scale.clone();

        input * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

/// Conv + BatchNorm の組
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    conv: Conv2d<B>,
    norm: FrozenBatchNorm2d<B>,
}

impl<B: Backend> ConvNorm<B> {
    /// バイアス無しの畳み込みを作成（padding は kernel_size / 2）
    pub fn new(
        channels: [usize; 2],
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        Self {
            conv: Conv2dConfig::new(channels, [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            norm: FrozenBatchNorm2d::new(channels[1], device),
        }
    }

    /// 活性化なし
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(input))
    }

    pub fn forward_relu(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.forward(input))
    }

    /// ReLU6（MobileNetV2 用）
    pub fn forward_relu6(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(input).clamp(0.0, 6.0)
    }
}

/// 空間方向の全体平均プーリング [B, C, H, W] -> [B, C]
pub fn global_avg_pool<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch_size, channels, _, _] = input.dims();
    input.mean_dim(3).mean_dim(2).reshape([batch_size, channels])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_frozen_batch_norm_default_is_near_identity() {
        let device = Default::default();
        let norm = FrozenBatchNorm2d::<TestBackend>::new(4, &device);
        let input = Tensor::<TestBackend, 4>::random([2, 4, 5, 5], Distribution::Default, &device);

        let output = norm.forward(input.clone());
        let expected = input.div_scalar((1.0f64 + 1e-5).sqrt());

        let diff: f32 = (output - expected).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }

    #[test]
    fn test_frozen_batch_norm_applies_statistics() {
        let device = Default::default();
        let mut norm = FrozenBatchNorm2d::<TestBackend>::new(1, &device);
        norm.running_mean = Param::from_tensor(Tensor::from_floats([2.0], &device));
        norm.running_var = Param::from_tensor(Tensor::from_floats([4.0], &device));
        norm.gamma = Param::from_tensor(Tensor::from_floats([3.0], &device));
        norm.beta = Param::from_tensor(Tensor::from_floats([1.0], &device));

        let input = Tensor::<TestBackend, 4>::full([1, 1, 1, 1], 6.0, &device);
        let value: f32 = norm.forward(input).into_scalar();

        // (6 - 2) / sqrt(4 + eps) * 3 + 1
        assert!((value - 7.0).abs() < 1e-3);
    }

    #[test]
    fn test_conv_norm_stride_halves_resolution() {
        let device = Default::default();
        let block = ConvNorm::<TestBackend>::new([3, 8], 3, 2, 1, &device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(block.forward_relu6(input).dims(), [1, 8, 16, 16]);
    }

    #[test]
    fn test_global_avg_pool() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 7, 7], &device);
        let pooled = global_avg_pool(input);
        assert_eq!(pooled.dims(), [2, 3]);
    }
}
