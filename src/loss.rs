use ndarray::Array2;

/// Scalar training objective over `(1, batch)` predictions
pub trait LossFunction {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64;

    /// d(loss)/d(predictions), same shape as `predictions`
    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64>;
}

/// Mean squared error, averaged over every element
#[derive(Clone, Copy, Debug, Default)]
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        (predictions - targets)
            .mapv(|d| d * d)
            .mean()
            .unwrap_or(0.0)
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let n = predictions.len().max(1) as f64;
        (predictions - targets).mapv(|d| 2.0 * d / n)
    }
}
