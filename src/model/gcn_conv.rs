//! Graph convolution (Kipf & Welling, 2017).
//!
//! `X' = D^-1/2 (A + I) D^-1/2 X W + b`
//!
//! Messages flow from edge source to edge target and degrees are counted at
//! the target, matching the usual `GCNConv` convention. Self loops are added
//! once per node; self loops already present in the edge list are replaced.

use crate::data::graph::GeneGraph;
use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::TensorData;

/// Normalized edge set shared by every convolution of a forward pass
#[derive(Debug, Clone)]
pub struct Propagation<B: Backend> {
    /// Source node of every edge, self loops included
    pub sources: Tensor<B, 1, Int>,
    /// Target node of every edge, self loops included
    pub targets: Tensor<B, 1, Int>,
    /// Symmetric normalization coefficient `[num_edges, 1]`
    pub weights: Tensor<B, 2>,
    num_nodes: usize,
}

impl<B: Backend> Propagation<B> {
    /// Build from a gene graph
    pub fn from_graph(graph: &GeneGraph, device: &B::Device) -> Self {
        Self::from_edges(graph.num_nodes(), graph.edges(), device)
    }

    /// Build from `(source, target)` pairs over `num_nodes` nodes
    pub fn from_edges<I>(num_nodes: usize, edges: I, device: &B::Device) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let (mut sources, mut targets): (Vec<usize>, Vec<usize>) = edges
            .into_iter()
            .filter(|(s, t)| s != t && *s < num_nodes && *t < num_nodes)
            .unzip();
        sources.extend(0..num_nodes);
        targets.extend(0..num_nodes);

        let mut degree = vec![0.0f32; num_nodes];
        for &t in &targets {
            degree[t] += 1.0;
        }
        let inv_sqrt: Vec<f32> = degree.iter()
            .map(|&d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
            .collect();

        let weights: Vec<f32> = sources.iter()
            .zip(&targets)
            .map(|(&s, &t)| inv_sqrt[s] * inv_sqrt[t])
            .collect();

        let num_edges = sources.len();
        let as_int = |v: Vec<usize>| -> Tensor<B, 1, Int> {
            let values: Vec<i64> = v.into_iter().map(|i| i as i64).collect();
            Tensor::from_data(TensorData::new(values, [num_edges]), device)
        };

        Self {
            sources: as_int(sources),
            targets: as_int(targets),
            weights: Tensor::from_data(TensorData::new(weights, [num_edges, 1]), device),
            num_nodes,
        }
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of normalized edges (self loops included)
    pub fn num_edges(&self) -> usize {
        self.sources.dims()[0]
    }
}

/// Graph convolution configuration
#[derive(Config, Debug)]
pub struct GcnConvConfig {
    /// Input feature size
    pub d_input: usize,
    /// Output feature size
    pub d_output: usize,
}

/// Graph convolution layer
#[derive(Module, Debug)]
pub struct GcnConv<B: Backend> {
    /// Feature transform `W`, applied before aggregation
    linear: Linear<B>,
    /// Bias, applied after aggregation
    bias: Param<Tensor<B, 1>>,
}

impl GcnConvConfig {
    /// Initialize with Glorot weights and zero bias
    pub fn init<B: Backend>(&self, device: &B::Device) -> GcnConv<B> {
        let linear = LinearConfig::new(self.d_input, self.d_output)
            .with_bias(false)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        let bias = Initializer::Zeros.init([self.d_output], device);

        GcnConv { linear, bias }
    }
}

impl<B: Backend> GcnConv<B> {
    /// Apply the convolution to node features `[num_nodes, d_input]`
    pub fn forward(&self, x: Tensor<B, 2>, propagation: &Propagation<B>) -> Tensor<B, 2> {
        let h = self.linear.forward(x);
        let [num_nodes, d_output] = h.dims();

        let messages = h
            .select(0, propagation.sources.clone())
            .mul(propagation.weights.clone());

        let aggregated = Tensor::<B, 2>::zeros([num_nodes, d_output], &messages.device())
            .select_assign(0, propagation.targets.clone(), messages);

        aggregated + self.bias.val().unsqueeze::<2>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_normalization_with_self_loops() {
        let device = <TestBackend as Backend>::Device::default();
        // 0 -> 1, plus an explicit self loop on 1 that gets replaced
        let propagation = Propagation::<TestBackend>::from_edges(2, vec![(0, 1), (1, 1)], &device);

        assert_eq!(propagation.num_edges(), 3);

        let weights: Vec<f32> = propagation.weights.clone().into_data().iter::<f32>().collect();
        // deg(0) = 1, deg(1) = 2
        let expected = [1.0 / 2.0f32.sqrt(), 1.0, 0.5];
        for (w, e) in weights.iter().zip(expected) {
            assert!((w - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_isolated_nodes_keep_own_features() {
        let device = <TestBackend as Backend>::Device::default();
        let propagation = Propagation::<TestBackend>::from_edges(3, Vec::<(usize, usize)>::new(), &device);
        let conv = GcnConvConfig::new(2, 3).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2]),
            &device,
        );
        let out = conv.forward(x.clone(), &propagation);
        let direct = conv.linear.forward(x);

        assert_eq!(out.dims(), [3, 3]);
        let out: Vec<f32> = out.into_data().iter::<f32>().collect();
        let direct: Vec<f32> = direct.into_data().iter::<f32>().collect();
        for (a, b) in out.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_message_reaches_target_only() {
        let device = <TestBackend as Backend>::Device::default();
        let propagation = Propagation::<TestBackend>::from_edges(2, vec![(0, 1)], &device);
        let conv = GcnConvConfig::new(1, 1).init::<TestBackend>(&device);

        let base = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![0.0f32, 0.0], [2, 1]), &device);
        let bumped = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [2, 1]), &device);

        let base: Vec<f32> = conv.forward(base, &propagation).into_data().iter::<f32>().collect();
        let bumped: Vec<f32> = conv.forward(bumped, &propagation).into_data().iter::<f32>().collect();

        // deg(0) = 1 (own loop), deg(1) = 2 (loop + edge from 0)
        let w: f32 = conv.linear.weight.val().into_scalar();
        assert!((bumped[0] - base[0] - w).abs() < 1e-6);
        assert!((bumped[1] - base[1] - w / 2.0f32.sqrt()).abs() < 1e-6);
    }
}
