use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use rand::Rng;
use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

/// A fully connected (dense) layer
///
/// Performs the transformation: output = weight · input + bias
/// where weight has shape (output_size, input_size) and bias has shape (output_size, 1).
/// Inputs are laid out as (features, batch).
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,     // (output_size, input_size)
    pub bias: Array2<f64>,       // (output_size, 1)
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a layer with He-normal weights, suited to ReLU activations
    ///
    /// Weights are drawn from N(0, 2 / input_size); biases start at zero.
    pub fn he_normal<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let std = (2.0 / input_size.max(1) as f64).sqrt();
        let weight = Array2::random_using((output_size, input_size), StandardNormal, rng) * std;
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Create a layer with Xavier/Glorot uniform weights, used for the linear output unit
    pub fn xavier<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_size + output_size).max(1) as f64).sqrt();
        let weight = Array2::random_using((output_size, input_size), Uniform::new(-limit, limit), rng);
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    pub fn new_zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weight: Array2::zeros((output_size, input_size)),
            bias: Array2::zeros((output_size, 1)),
            input_size,
            output_size,
        }
    }

    /// Rebuild a layer from stored weights, checking that the shapes agree
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Option<Self> {
        let (output_size, input_size) = weight.dim();
        if bias.dim() != (output_size, 1) {
            return None;
        }

        Some(Self {
            weight,
            bias,
            input_size,
            output_size,
        })
    }

    /// `(input_size, batch)` in, `(output_size, batch)` out
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        // bias broadcasts across the batch columns
        &self.weight.dot(input) + &self.bias
    }

    /// Parameter gradients and the gradient w.r.t. `input`
    ///
    /// The layer keeps no activations, so the caller hands back the input it
    /// fed to `forward`.
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let weight_grad = grad_output.dot(&input.t());
        let bias_grad = grad_output.sum_axis(Axis(1)).insert_axis(Axis(1));
        let input_grad = self.weight.t().dot(grad_output);

        (
            LinearGradients {
                weight: weight_grad,
                bias: bias_grad,
            },
            input_grad,
        )
    }

    /// Apply one optimizer step; `prefix` keeps optimizer state per layer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// True when every weight and bias is a finite number
    pub fn is_finite(&self) -> bool {
        self.weight.iter().chain(self.bias.iter()).all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use crate::optimizers::Adam;

    #[test]
    fn test_linear_layer_creation() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LinearLayer::he_normal(6, 12, &mut rng);
        assert_eq!(layer.input_size, 6);
        assert_eq!(layer.output_size, 12);
        assert_eq!(layer.weight.shape(), &[12, 6]);
        assert_eq!(layer.bias.shape(), &[12, 1]);
        assert!(layer.bias.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_seeded_initialization_is_reproducible() {
        let a = LinearLayer::he_normal(5, 10, &mut StdRng::seed_from_u64(42));
        let b = LinearLayer::he_normal(5, 10, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.weight, b.weight);
    }

    #[test]
    fn test_linear_layer_forward() {
        let layer = LinearLayer::new_zeros(3, 2);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]); // (3, 2)

        let output = layer.forward(&input);
        assert_eq!(output.shape(), &[2, 2]);
        assert!(output.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_linear_layer_backward() {
        let layer = LinearLayer::xavier(3, 2, &mut StdRng::seed_from_u64(1));
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight.shape(), &[2, 3]);
        assert_eq!(gradients.bias.shape(), &[2, 1]);
        assert_eq!(gradients.bias, arr2(&[[2.0], [2.0]]));
        assert_eq!(input_grad.shape(), &[3, 2]);
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = LinearLayer::new_zeros(2, 1);
        let mut optimizer = Adam::new(0.1);

        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);

        let output = layer.forward(&input);
        let grad_output = &output - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "linear");

        // first Adam step moves every parameter by the learning rate
        assert!((layer.weight[[0, 0]] - 0.1).abs() < 1e-6);
        assert!((layer.weight[[0, 1]] - 0.1).abs() < 1e-6);
        assert!((layer.bias[[0, 0]] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_parameter_count_and_finiteness() {
        let mut layer = LinearLayer::new_zeros(12, 8);
        assert_eq!(layer.num_parameters(), 12 * 8 + 8);
        assert!(layer.is_finite());

        layer.bias[[3, 0]] = f64::NAN;
        assert!(!layer.is_finite());
    }

    #[test]
    fn test_from_weights() {
        let weight = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let bias = arr2(&[[0.5], [-0.5]]);

        let layer = LinearLayer::from_weights(weight.clone(), bias.clone()).unwrap();
        assert_eq!(layer.weight, weight);
        assert_eq!(layer.bias, bias);
        assert_eq!(layer.input_size, 2);
        assert_eq!(layer.output_size, 2);

        assert!(LinearLayer::from_weights(weight, arr2(&[[0.0]])).is_none());
    }
}
