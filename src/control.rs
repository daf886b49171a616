pub mod lqr;
pub mod riccati;
