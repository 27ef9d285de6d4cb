//! Standard error and result types for the library.
use crate::script::ScriptError;
use hex::FromHexError;

/// Standard error type used in the library
#[derive(Debug)]
pub enum Error {
    /// An argument provided is invalid
    BadArgument(String),
    /// Hex string could not be decoded
    FromHexError(FromHexError),
    /// The state is not valid
    IllegalState(String),
    /// Error evaluating a script
    Script(ScriptError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadArgument(s) => write!(f, "Bad argument: {}", s),
            Error::FromHexError(e) => write!(f, "Hex decoding error: {}", e),
            Error::IllegalState(s) => write!(f, "Illegal state: {}", s),
            Error::Script(e) => write!(f, "Script error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FromHexError(e) => Some(e),
            Error::Script(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FromHexError> for Error {
    fn from(e: FromHexError) -> Self {
        Error::FromHexError(e)
    }
}

impl From<ScriptError> for Error {
    fn from(e: ScriptError) -> Self {
        Error::Script(e)
    }
}

/// Standard Result used in the library
pub type Result<T> = std::result::Result<T, Error>;
