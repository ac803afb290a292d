/// Reasons an event was not accepted by a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("the loop has been disposed")]
    Disposed,

    #[error("the loop is paused and discards events sent while paused")]
    Paused,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
