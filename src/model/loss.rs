use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::TensorData;

/// Index tensor of the nodes selected by a boolean mask
pub fn mask_indices<B: Backend>(mask: &[bool], device: &B::Device) -> Tensor<B, 1, Int> {
    let indices: Vec<i64> = mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i as i64))
        .collect();
    let len = indices.len();
    Tensor::from_data(TensorData::new(indices, [len]), device)
}

/// Cross-entropy over the masked nodes only
///
/// # Arguments
/// * `logits` - Model output `[num_nodes, num_classes]`
/// * `mask` - Indices of labeled nodes `[num_labeled]`
/// * `labels` - Class per node `[num_nodes]`, only read at `mask`
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    mask: Tensor<B, 1, Int>,
    labels: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let logits = logits.select(0, mask.clone());
    let targets = labels.select(0, mask);

    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// Classification metrics with driver (1) as the positive class
pub mod metrics {
    use burn::prelude::*;
    use burn::tensor::ElementConversion;

    fn count<B: Backend>(tensor: Tensor<B, 1, Int>) -> f32 {
        tensor.sum().into_scalar().elem::<f32>()
    }

    /// Compute accuracy
    pub fn accuracy<B: Backend>(
        predictions: Tensor<B, 1, Int>,
        targets: Tensor<B, 1, Int>,
    ) -> f32 {
        let total = predictions.dims()[0] as f32;
        if total == 0.0 {
            return 0.0;
        }
        count(predictions.equal(targets).int()) / total
    }

    /// Compute precision
    pub fn precision<B: Backend>(
        predictions: Tensor<B, 1, Int>,
        targets: Tensor<B, 1, Int>,
    ) -> f32 {
        let true_positives = count(
            predictions.clone().equal_elem(1).int().mul(targets.equal_elem(1).int()),
        );
        let predicted_positives = count(predictions.equal_elem(1).int());

        if predicted_positives > 0.0 {
            true_positives / predicted_positives
        } else {
            0.0
        }
    }

    /// Compute recall
    pub fn recall<B: Backend>(
        predictions: Tensor<B, 1, Int>,
        targets: Tensor<B, 1, Int>,
    ) -> f32 {
        let true_positives = count(
            predictions.equal_elem(1).int().mul(targets.clone().equal_elem(1).int()),
        );
        let actual_positives = count(targets.equal_elem(1).int());

        if actual_positives > 0.0 {
            true_positives / actual_positives
        } else {
            0.0
        }
    }

    /// Compute F1 score
    pub fn f1_score<B: Backend>(
        predictions: Tensor<B, 1, Int>,
        targets: Tensor<B, 1, Int>,
    ) -> f32 {
        let p = precision(predictions.clone(), targets.clone());
        let r = recall(predictions, targets);

        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}
