use thiserror::Error;

/// Failures surfaced by the estimation and control core.
///
/// Both variants carry a static description only, so building and returning
/// one never allocates inside a control cycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Dimensions or cost matrices handed to a component are unusable.
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    /// A linear system could not be solved within tolerance.
    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
