use ndarray::Array2;
use rand::Rng;

use crate::horizon::Horizon;
use crate::layers::dropout::Dropout;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::optimizers::Optimizer;
use crate::utils::{relu, relu_derivative};

/// Intermediate activations kept from a training forward pass
#[derive(Clone, Debug)]
pub struct FeedForwardCache {
    pub input: Array2<f64>,
    pub z1: Array2<f64>,
    pub dropped: Array2<f64>,
    pub z2: Array2<f64>,
    pub a2: Array2<f64>,
}

/// Parameter gradients for every dense layer of the network
#[derive(Clone, Debug)]
pub struct FeedForwardGradients {
    pub hidden1: LinearGradients,
    pub hidden2: LinearGradients,
    pub output: LinearGradients,
}

/// Small regressor: dense(ReLU) → dropout → dense(ReLU) → dense(linear, 1 unit)
///
/// Inputs are (features, batch) columns, outputs are (1, batch).
#[derive(Clone, Debug)]
pub struct FeedForwardNetwork {
    pub hidden1: LinearLayer,
    pub dropout: Dropout,
    pub hidden2: LinearLayer,
    pub output: LinearLayer,
    pub input_size: usize,
    pub hidden_sizes: [usize; 2],
    pub is_training: bool,
}

impl FeedForwardNetwork {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_sizes: [usize; 2], dropout_rate: f64, rng: &mut R) -> Self {
        let [h1, h2] = hidden_sizes;
        FeedForwardNetwork {
            hidden1: LinearLayer::he_normal(input_size, h1, rng),
            dropout: Dropout::new(dropout_rate),
            hidden2: LinearLayer::he_normal(h1, h2, rng),
            output: LinearLayer::xavier(h2, 1, rng),
            input_size,
            hidden_sizes,
            is_training: true,
        }
    }

    /// Network sized for one forecast horizon (6→12→8→1 hourly, 5→10→6→1 weekly)
    pub fn for_horizon<R: Rng + ?Sized>(horizon: Horizon, dropout_rate: f64, rng: &mut R) -> Self {
        Self::new(horizon.feature_count(), horizon.hidden_sizes(), dropout_rate, rng)
    }

    /// Assemble a network from restored layers; `None` if the shapes do not chain
    pub fn from_layers(
        hidden1: LinearLayer,
        hidden2: LinearLayer,
        output: LinearLayer,
        dropout_rate: f64,
    ) -> Option<Self> {
        if hidden1.output_size != hidden2.input_size
            || hidden2.output_size != output.input_size
            || output.output_size != 1
        {
            return None;
        }

        let mut network = FeedForwardNetwork {
            input_size: hidden1.input_size,
            hidden_sizes: [hidden1.output_size, hidden2.output_size],
            hidden1,
            dropout: Dropout::new(dropout_rate),
            hidden2,
            output,
            is_training: false,
        };
        network.eval();
        Some(network)
    }

    pub fn train(&mut self) {
        self.is_training = true;
        self.dropout.train();
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        self.dropout.eval();
    }

    /// Training forward pass; dropout is active when in training mode
    pub fn forward_with_cache<R: Rng + ?Sized>(&mut self, input: &Array2<f64>, rng: &mut R) -> (Array2<f64>, FeedForwardCache) {
        let z1 = self.hidden1.forward(input);
        let a1 = z1.mapv(relu);
        let dropped = self.dropout.forward(&a1, rng);
        let z2 = self.hidden2.forward(&dropped);
        let a2 = z2.mapv(relu);
        let output = self.output.forward(&a2);

        let cache = FeedForwardCache {
            input: input.clone(),
            z1,
            dropped,
            z2,
            a2,
        };
        (output, cache)
    }

    /// Inference forward pass; dropout is skipped and nothing is cached
    pub fn predict(&self, input: &Array2<f64>) -> Array2<f64> {
        let a1 = self.hidden1.forward(input).mapv(relu);
        let a1 = self.dropout.infer(&a1);
        let a2 = self.hidden2.forward(&a1).mapv(relu);
        self.output.forward(&a2)
    }

    /// Backpropagate the loss gradient through all layers
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &FeedForwardCache) -> FeedForwardGradients {
        let (output_grads, d_a2) = self.output.backward(&cache.a2, grad_output);
        let d_z2 = d_a2 * cache.z2.mapv(relu_derivative);

        let (hidden2_grads, d_dropped) = self.hidden2.backward(&cache.dropped, &d_z2);
        let d_a1 = self.dropout.backward(&d_dropped);
        let d_z1 = d_a1 * cache.z1.mapv(relu_derivative);

        let (hidden1_grads, _) = self.hidden1.backward(&cache.input, &d_z1);

        FeedForwardGradients {
            hidden1: hidden1_grads,
            hidden2: hidden2_grads,
            output: output_grads,
        }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &FeedForwardGradients, optimizer: &mut O) {
        self.hidden1.update_parameters(&gradients.hidden1, optimizer, "hidden1");
        self.hidden2.update_parameters(&gradients.hidden2, optimizer, "hidden2");
        self.output.update_parameters(&gradients.output, optimizer, "output");
    }

    pub fn num_parameters(&self) -> usize {
        self.hidden1.num_parameters() + self.hidden2.num_parameters() + self.output.num_parameters()
    }

    pub fn is_finite(&self) -> bool {
        self.hidden1.is_finite() && self.hidden2.is_finite() && self.output.is_finite()
    }

    /// Human-readable layer stack
    pub fn architecture(&self) -> Vec<String> {
        vec![
            format!("Dense ({} → {} units, ReLU, He-normal)", self.input_size, self.hidden_sizes[0]),
            format!("Dropout ({})", self.dropout.dropout_rate),
            format!("Dense ({} units, ReLU, He-normal)", self.hidden_sizes[1]),
            "Dense (1 unit, linear activation)".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::{LossFunction, MSELoss};
    use crate::optimizers::Adam;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_shapes_per_horizon() {
        let mut rng = StdRng::seed_from_u64(0);
        let hourly = FeedForwardNetwork::for_horizon(Horizon::Hourly, 0.2, &mut rng);
        assert_eq!(hourly.input_size, 6);
        assert_eq!(hourly.hidden_sizes, [12, 8]);
        assert_eq!(hourly.num_parameters(), 6 * 12 + 12 + 12 * 8 + 8 + 8 + 1);

        let weekly = FeedForwardNetwork::for_horizon(Horizon::Weekly, 0.2, &mut rng);
        let out = weekly.predict(&Array2::zeros((5, 3)));
        assert_eq!(out.shape(), &[1, 3]);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(21);
        let network = FeedForwardNetwork::for_horizon(Horizon::Hourly, 0.5, &mut rng);
        let input = Array2::from_elem((6, 1), 0.4);
        assert_eq!(network.predict(&input), network.predict(&input));
    }

    #[test]
    fn test_backward_shapes_match_parameters() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut network = FeedForwardNetwork::for_horizon(Horizon::Weekly, 0.2, &mut rng);
        let input = Array2::from_elem((5, 4), 0.3);
        let (output, cache) = network.forward_with_cache(&input, &mut rng);
        let grads = network.backward(&Array2::ones(output.raw_dim()), &cache);

        assert_eq!(grads.hidden1.weight.shape(), network.hidden1.weight.shape());
        assert_eq!(grads.hidden2.weight.shape(), network.hidden2.weight.shape());
        assert_eq!(grads.output.weight.shape(), network.output.weight.shape());
    }

    #[test]
    fn test_fits_constant_target() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut network = FeedForwardNetwork::for_horizon(Horizon::Weekly, 0.0, &mut rng);
        let mut optimizer = Adam::new(0.01);
        let input = Array2::from_shape_fn((5, 8), |(i, j)| ((i + j) % 5) as f64 / 5.0);
        let target = Array2::from_elem((1, 8), 0.3);

        for _ in 0..300 {
            let (output, cache) = network.forward_with_cache(&input, &mut rng);
            let grad = MSELoss.compute_gradient(&output, &target);
            let grads = network.backward(&grad, &cache);
            network.update_parameters(&grads, &mut optimizer);
        }
        let trained = MSELoss.compute_loss(&network.predict(&input), &target);

        assert!(trained < 5e-3, "loss after fitting: {}", trained);
    }

    #[test]
    fn test_from_layers_rejects_mismatched_shapes() {
        let ok = FeedForwardNetwork::from_layers(
            LinearLayer::new_zeros(6, 12),
            LinearLayer::new_zeros(12, 8),
            LinearLayer::new_zeros(8, 1),
            0.2,
        );
        assert!(ok.is_some());

        let bad = FeedForwardNetwork::from_layers(
            LinearLayer::new_zeros(6, 12),
            LinearLayer::new_zeros(10, 8),
            LinearLayer::new_zeros(8, 1),
            0.2,
        );
        assert!(bad.is_none());
    }
}
