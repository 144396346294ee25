use core::fmt;

/// Error taxonomy of the detection core.
///
/// All validation happens at the edges of each operation; interior loops
/// assume the invariants hold. Messages name the offending parameter and its
/// value or shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A parameter value is out of range (non-positive sigma, even boxsize, ...).
    ParameterValue(String),
    /// Dimensional mismatch between sizes, sigma matrices, stacks or buffers.
    ParameterShape(String),
    /// An internal precondition was violated (too-short axis on the fast
    /// path, maxima capacity overflow, non-contiguous interior buffer).
    Logical(String),
    /// Reserved for numerical failures; no current code path raises it.
    Numerical(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterValue(msg) => write!(f, "invalid parameter value: {msg}"),
            Self::ParameterShape(msg) => write!(f, "parameter shape mismatch: {msg}"),
            Self::Logical(msg) => write!(f, "logical error: {msg}"),
            Self::Numerical(msg) => write!(f, "numerical error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
