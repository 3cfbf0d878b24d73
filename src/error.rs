use thiserror::Error;

#[derive(Error, Debug)]
pub enum FundFlowError {
    #[error("Invalid merge threshold {0}: must be between 0.0 and 1.0")]
    InvalidMergeThreshold(f64),

    #[error("Invalid amount tolerance {0}: must be non-negative")]
    InvalidAmountTolerance(f64),

    #[error("Invalid date window {0}: must be non-negative")]
    InvalidDateWindow(i64),

    #[error("Invalid confidence floor {0}: must be between 0.0 and 1.0")]
    InvalidConfidenceFloor(f64),

    #[error("Invalid flag threshold {0}: must be between 0.0 and 1.0")]
    InvalidFlagThreshold(f64),

    #[error("Invalid match weights (amount={amount}, date={date}, description={description}): {details}")]
    InvalidMatchWeights {
        amount: f64,
        date: f64,
        description: f64,
        details: String,
    },

    #[error("Invalid ensemble weights (ml={ml}, merchant={merchant}, behavioral={behavioral}): {details}")]
    InvalidEnsembleWeights {
        ml: f64,
        merchant: f64,
        behavioral: f64,
        details: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FundFlowError>;
