use thiserror::Error;

/// Errors surfaced across the programmatic surface (`start`/`stop`).
///
/// Packet-path conditions — stranger-source drops, an empty policy
/// output, cancelled selection keys observed mid-iteration — are never
/// represented here; they are handled as silent control flow on the
/// reactor thread per the best-effort design of the relay.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// `start()` was called on an instance that was already stopped.
    #[error("instance channel already closed, instance is not reusable")]
    ChannelClosed,

    /// An I/O error occurred while binding or registering the channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller was interrupted while joining the reactor thread during `stop()`.
    #[error("interrupted while waiting for reactor shutdown")]
    Interrupted,
}
