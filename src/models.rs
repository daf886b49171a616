pub mod measurement;
pub mod motion;
pub mod state;
