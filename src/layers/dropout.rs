use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

/// Inverted dropout layer for regularization
///
/// During training each activation is zeroed with probability `dropout_rate`
/// and survivors are scaled by `1 / keep_prob`, so inference needs no rescaling.
#[derive(Clone, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
    pub is_training: bool,
    mask: Option<Array2<f64>>,
}

impl Dropout {
    pub fn new(dropout_rate: f64) -> Self {
        Dropout {
            dropout_rate: dropout_rate.clamp(0.0, 0.95),
            is_training: true,
            mask: None,
        }
    }

    pub fn train(&mut self) {
        self.is_training = true;
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        self.mask = None;
    }

    /// Apply dropout, drawing a fresh mask from `rng` when training
    pub fn forward<R: Rng + ?Sized>(&mut self, input: &Array2<f64>, rng: &mut R) -> Array2<f64> {
        if !self.is_training || self.dropout_rate == 0.0 {
            return input.clone();
        }

        let keep_prob = 1.0 - self.dropout_rate;
        let mask = Array2::random_using(input.raw_dim(), Uniform::new(0.0, 1.0), rng)
            .mapv(|x| if x < keep_prob { 1.0 } else { 0.0 });
        let output = input * &mask / keep_prob;
        self.mask = Some(mask);
        output
    }

    /// Inference path: identity
    pub fn infer(&self, input: &Array2<f64>) -> Array2<f64> {
        input.clone()
    }

    pub fn backward(&self, grad_output: &Array2<f64>) -> Array2<f64> {
        if !self.is_training || self.dropout_rate == 0.0 {
            return grad_output.clone();
        }

        let keep_prob = 1.0 - self.dropout_rate;

        match self.mask {
            Some(ref mask) => grad_output * mask / keep_prob,
            None => grad_output.clone(),
        }
    }
}
