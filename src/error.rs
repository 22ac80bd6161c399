use thiserror::Error;

// Unified error type for partmat

#[derive(Error, Debug)]
pub enum PmError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("structure mismatch: {0}")]
    StructureMismatch(String),
    #[error("zero pivot in block row {0}")]
    ZeroPivot(usize),
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("communication error: {0}")]
    Communication(String),
}
