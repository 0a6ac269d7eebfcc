use thiserror::Error;

/// Boxed error produced by the persistence collaborators (notification store,
/// interest directory).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the realtime core.
///
/// Delivery failures are deliberately absent: a half-closed socket is caught
/// and logged per connection inside the dispatcher and never reaches the
/// broadcaster. Unknown rooms and unknown identities resolve to an empty
/// member set, not an error, so a racing unsubscribe cannot fail a caller.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// A second handshake reused a connection id. Transport bug — surfaced
    /// immediately to the caller.
    #[error("connection {0} is already registered")]
    DuplicateConnection(String),

    /// Join/leave referenced a connection id the registry does not know.
    #[error("connection {0} is not registered")]
    UnknownConnection(String),

    /// Notification persistence failed; the live push was skipped.
    #[error("notification persistence failed: {0}")]
    Persistence(#[source] StoreError),
}
