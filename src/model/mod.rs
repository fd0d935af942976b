pub mod architecture;
pub mod checkpoint;
pub mod gcn_conv;
pub mod loss;

use burn::prelude::*;

/// Model configuration
#[derive(Config, Debug)]
pub struct GcnConfig {
    /// Number of input features per gene
    #[config(default = "12")]
    pub input_size: usize,

    /// Output size of the first graph convolution
    #[config(default = "4")]
    pub hidden_size_1: usize,

    /// Output size of the second graph convolution
    #[config(default = "4")]
    pub hidden_size_2: usize,

    /// Output size of the third graph convolution (embedding space)
    #[config(default = "2")]
    pub embedding_size: usize,

    /// Number of output classes (passenger, driver)
    #[config(default = "2")]
    pub num_classes: usize,
}

impl GcnConfig {
    /// Driver/passenger classifier for a given feature width
    pub fn for_features(input_size: usize) -> Self {
        Self::new().with_input_size(input_size)
    }
}
