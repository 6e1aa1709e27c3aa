//! Group error types.

use arcstr::ArcStr;

use crate::id::ElementId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A group method was called, but a member has no handler for it.
    #[error("element {id} has no handler for group method `{method}`")]
    MissingHandler { method: ArcStr, id: ElementId },
    #[error("no group method named `{0}` has been attached")]
    UnknownMethod(ArcStr),
    #[error("element is not a member of this group")]
    NotAMember,
    #[error("identifier length must be at least 1")]
    InvalidIdLength,
    #[error("every identifier of length {length} has already been issued")]
    IdSpaceExhausted { length: usize },
    #[error("element arena is full")]
    ArenaFull,
}
