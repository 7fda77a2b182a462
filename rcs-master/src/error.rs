use std::{num::ParseIntError, str::Utf8Error};

use nom::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error of kind {kind:?} at location {location:?}")]
    ParseError { location: Vec<u8>, kind: ErrorKind },

    #[error("master begins with an encrypted-archive marker, cannot be parsed")]
    Encrypted,

    #[error("malformed RCS date: {0}")]
    InvalidDate(String),

    #[error(transparent)]
    ParseInt(#[from] ParseIntError),

    #[error(transparent)]
    ParseUtf8(#[from] Utf8Error),

    #[error(transparent)]
    Revision(#[from] crate::revision::Error),
}
