/// Validation failures raised before any sampling work starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("standard deviation must be > 0 (got {0})")]
    InvalidStdDev(f64),

    #[error("distribution parameters must be finite (mean {mean}, std dev {std_dev})")]
    InvalidDistribution { mean: f64, std_dev: f64 },

    #[error("truncation bounds must be finite with lower < upper (got [{lower}, {upper}])")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("{name} must be between {min} and {max} (got {value})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{name} weight must be a finite non-negative number (got {value})")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("attempt counts must be > 0")]
    ZeroAttempts,

    #[error("at least one attempt count is required")]
    EmptyAttempts,

    #[error("{0} must be > 0")]
    InvalidConfig(&'static str),

    #[error("normal distribution setup failed: {0}")]
    Distribution(String),
}
