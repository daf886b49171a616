mod bayesian_filter;
mod extended_kalman_filter;
mod filter;

pub use bayesian_filter::BayesianFilter;
pub use extended_kalman_filter::{Ekf, ExtendedKalmanFilter, Innovation};
pub use filter::Filter;
