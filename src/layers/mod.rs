/// Fully connected layer.
pub mod linear;

/// Dropout regularization.
pub mod dropout;
