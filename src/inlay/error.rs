use thiserror::Error;

#[derive(Error, Debug)]
pub enum InlayError {
    /// An association writer or concat received an object of the wrong model.
    #[error("Expected `{expected}`, but got `{got}`")]
    AssociationTypeMismatch { expected: String, got: String },

    /// Strict association save could not persist every member.
    #[error("Association `{0}` was not saved")]
    AssociationNotSaved(String),

    #[error("Validation failed: {}", errors.join(", "))]
    RecordInvalid { model: String, errors: Vec<String> },

    #[error("Record was not saved")]
    RecordNotSaved,

    #[error("Record was not destroyed")]
    RecordNotDestroyed,

    /// A reference key is set but the finder returned no object for it.
    #[error("Couldn't find {model} with {key} = {value} for {owner}")]
    RecordNotFound {
        model: String,
        key: String,
        value: String,
        owner: String,
    },

    #[error("Unknown attribute `{name}` for model `{model}`")]
    UnknownAttribute { model: String, name: String },

    #[error("Unknown association `{name}` for model `{model}`")]
    UnknownAssociation { model: String, name: String },

    #[error("Unknown model `{0}`")]
    UnknownModel(String),

    #[error("Model `{0}` is already defined")]
    DuplicateModel(String),

    #[error("Could not find typecaster for `{0}`")]
    TypecasterMissing(String),

    #[error("Could not find normalizer `{0}`")]
    NormalizerMissing(String),

    /// Declaration-level misuse that cannot be expressed in the type system,
    /// e.g. a reference association with no finder attached.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InlayError>;
