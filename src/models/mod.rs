/// Module for the feed-forward AQI regressor.
pub mod feed_forward;
