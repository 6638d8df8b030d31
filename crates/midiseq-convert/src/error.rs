//! Error types for the converters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input is too short to hold a header")]
    TooShort,

    #[error("Invalid signature: {0}")]
    InvalidSignature(&'static str),

    #[error("Unexpected end of data while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("Container holds no songs")]
    NoSongs,

    #[error("Failed to write SMF: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
