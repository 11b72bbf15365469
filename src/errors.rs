use thiserror::Error;

#[derive(Error, Debug)]
pub enum GosgraphError {
    #[error("Cannot create tensor: {0}")]
    TensorCreateError(String),

    #[error("Tensor `{0}` not found")]
    TensorNotFound(String),

    #[error("Op `{0}` not found")]
    OpNotFound(String),

    #[error("Name `{0}` is already used in this graph")]
    DuplicateName(String),

    #[error("Tensor `{0}` is not a placeholder and cannot be fed")]
    NotAPlaceholder(String),

    #[error("Placeholder `{0}` must be fed a value")]
    MissingFeed(String),

    #[error("Invalid number of inputs: expected {expected}, found {found}")]
    InvalidInputNo { expected: usize, found: usize },

    #[error("Invalid type: expected {expected}, found {found}")]
    InvalidType { expected: String, found: String },

    #[error("{msg}: expected {expected:?}, found {found:?}")]
    IncompatibleShape {
        msg: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },

    #[error("Shader compile error: {0}")]
    ShaderCompileError(String),

    #[error("No GPU adapter available")]
    AdapterUnavailable,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequestError(String),

    #[error("Buffer readback failed: {0}")]
    BufferReadError(String),

    #[error("Invalid index {index} (library holds {size})")]
    InvalidIndex { index: usize, size: usize },

    #[error("Index {0} is not checked out")]
    IndexNotCheckedOut(usize),

    #[error("No staging slot available")]
    SlotsExhausted,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Error(String),
}

pub type Result<T> = std::result::Result<T, GosgraphError>;
