use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreapError {
    /// An operation needed at least one element and found none.
    #[error("{op}: map is empty")]
    Underflow { op: &'static str },
}
