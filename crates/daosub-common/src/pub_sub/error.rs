//! Error types for the pub-sub module.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Error
pub enum Error {
    /// The listener was removed before a value was published
    #[error("Channel is closed")]
    ChannelClosed,

    /// Nothing was published yet
    #[error("Channel is empty")]
    Empty,
}
