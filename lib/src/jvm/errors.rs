use thiserror::Error;

/// Failures reading, decoding, or resolving classes
///
/// These are problems with the inputs handed to the verifier, not verification failures of a
/// method body (see `verifier::VerifierError` for those).
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed class file: {0}")]
    MalformedClassFile(String),

    #[error("Bad constant #{index}: {message}")]
    BadConstant { index: u16, message: String },

    #[error("Bad descriptor '{0}': {1}")]
    BadDescriptor(String, String),

    #[error("Bad name: {0}")]
    BadName(String),

    #[error("Bad bytecode at offset {offset}: {message}")]
    BadBytecode { offset: usize, message: String },

    #[error("Missing class {0}")]
    MissingClass(String),

    #[error("Class circularity involving {0}")]
    ClassCircularity(String),
}
