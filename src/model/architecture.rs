use crate::model::gcn_conv::{GcnConv, GcnConvConfig, Propagation};
use crate::model::GcnConfig;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{softmax, tanh};

/// Driver/passenger gene classifier
#[derive(Module, Debug)]
pub struct GeneGcn<B: Backend> {
    /// First graph convolution
    conv1: GcnConv<B>,
    /// Second graph convolution
    conv2: GcnConv<B>,
    /// Third graph convolution, producing the embedding
    conv3: GcnConv<B>,
    /// Linear classifier head
    classifier: Linear<B>,
}

/// Model output
#[derive(Debug, Clone)]
pub struct GcnOutput<B: Backend> {
    /// Class logits `[num_nodes, num_classes]`
    pub logits: Tensor<B, 2>,
    /// Final graph embedding `[num_nodes, embedding_size]`
    pub embedding: Tensor<B, 2>,
}

impl<B: Backend> GcnOutput<B> {
    /// Class probabilities (softmax over logits)
    pub fn probabilities(&self) -> Tensor<B, 2> {
        softmax(self.logits.clone(), 1)
    }

    /// Most likely class per node
    pub fn predictions(&self) -> Tensor<B, 1, Int> {
        self.logits.clone().argmax(1).squeeze::<1>(1)
    }
}

impl<B: Backend> GeneGcn<B> {
    /// Forward pass over the whole graph
    pub fn forward(&self, x: Tensor<B, 2>, propagation: &Propagation<B>) -> GcnOutput<B> {
        let h = tanh(self.conv1.forward(x, propagation));
        let h = tanh(self.conv2.forward(h, propagation));
        let embedding = tanh(self.conv3.forward(h, propagation));

        let logits = self.classifier.forward(embedding.clone());

        GcnOutput { logits, embedding }
    }
}

/// Initialize the classifier from configuration
pub fn init_model<B: Backend>(config: &GcnConfig, device: &B::Device) -> GeneGcn<B> {
    let conv1 = GcnConvConfig::new(config.input_size, config.hidden_size_1).init(device);
    let conv2 = GcnConvConfig::new(config.hidden_size_1, config.hidden_size_2).init(device);
    let conv3 = GcnConvConfig::new(config.hidden_size_2, config.embedding_size).init(device);

    let classifier = LinearConfig::new(config.embedding_size, config.num_classes)
        .with_bias(true)
        .init(device);

    GeneGcn {
        conv1,
        conv2,
        conv3,
        classifier,
    }
}
