//! Error type for programmer-error contract violations (spec §7 class 1/2).
//! Corruption detected while decoding a differential record is
//! [`crate::redo::RedoError`], kept separate since it is a recovery-time
//! concern rather than a misuse of this crate's API.

use thiserror::Error;

use crate::redo::RedoError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no transaction in progress: call start() first")]
    NotStarted,
    #[error("a transaction is already in progress")]
    AlreadyStarted,
    #[error("buffer already registered with this transaction")]
    DuplicateBuffer,
    #[error("buffer is not registered with this transaction")]
    NotRegistered,
    #[error("transaction already holds the maximum number of registered pages")]
    NoFreeSlots,
    #[error("offset {offset} + length {length} extends past the page")]
    OutOfRange { offset: usize, length: usize },
    #[error(transparent)]
    Redo(#[from] RedoError),
}
