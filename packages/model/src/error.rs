use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown component type: {0}")]
    UnknownComponent(String),

    #[error("Component registered twice: {0}")]
    DuplicateComponent(String),

    #[error("Component {component} has default content for undeclared slot {slot}")]
    UndeclaredDefaultSlot { component: String, slot: String },

    #[error("Default slot content of {0} nests itself")]
    RecursiveDefaults(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;
