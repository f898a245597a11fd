/// Activation functions used by the feed-forward layers.

/// Rectified linear unit: relu(x) = max(0, x)
pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

/// Derivative of ReLU with respect to its pre-activation input.
///
/// Uses 0 at the kink, matching the usual subgradient choice.
pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}
