//! CNN Model Architecture for Image Classification
//!
//! A stack of convolution stages followed by global average pooling and a
//! two-layer head. Depth and width come from the [`Architecture`] preset; the
//! number of outputs is taken from the label map at training time.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use super::Architecture;

/// Configuration for the KanjiClassifier CNN model
#[derive(Config, Debug)]
pub struct KanjiClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "64")]
    pub input_size: usize,

    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first stage; every later stage doubles it
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of convolution stages, each halving the resolution
    #[config(default = "4")]
    pub num_stages: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,
}

impl KanjiClassifierConfig {
    /// Configuration for a named backbone
    pub fn for_architecture(architecture: Architecture, num_classes: usize, input_size: usize) -> Self {
        let (num_stages, base_filters, hidden_units, dropout_rate) = match architecture {
            Architecture::Compact => (3, 8, 64, 0.2),
            Architecture::Standard => (4, 32, 256, 0.3),
            Architecture::Wide => (4, 48, 512, 0.4),
        };

        Self::new(num_classes)
            .with_input_size(input_size)
            .with_num_stages(num_stages)
            .with_base_filters(base_filters)
            .with_hidden_units(hidden_units)
            .with_dropout_rate(dropout_rate)
    }

    /// Channels leaving the last stage
    pub fn feature_channels(&self) -> usize {
        match self.num_stages {
            0 => self.in_channels,
            n => self.base_filters << (n - 1),
        }
    }

    /// Create the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> KanjiClassifier<B> {
        KanjiClassifier::new(self, device)
    }
}

/// 3x3 convolution, batch norm, ReLU and a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        self.pool.forward(activation::relu(x))
    }
}

/// Image classifier CNN
#[derive(Module, Debug)]
pub struct KanjiClassifier<B: Backend> {
    pub stages: Vec<ConvStage<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub hidden: Linear<B>,
    pub dropout: Dropout,
    pub head: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> KanjiClassifier<B> {
    pub fn new(config: &KanjiClassifierConfig, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(config.num_stages);
        let mut channels = config.in_channels;
        for stage in 0..config.num_stages {
            let filters = config.base_filters << stage;
            stages.push(ConvStage::new(channels, filters, device));
            channels = filters;
        }

        Self {
            stages,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(config.feature_channels(), config.hidden_units).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            head: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Logits of shape `[batch, num_classes]` for input `[batch, 3, height, width]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = activation::relu(self.hidden.forward(x));
        self.head.forward(self.dropout.forward(x))
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
