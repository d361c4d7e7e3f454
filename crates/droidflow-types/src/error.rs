//! Error taxonomy shared across the droidflow crates.

/// Errors that can occur across the droidflow runtime.
///
/// The relay-protocol variants (`InvalidOrExpiredToken`, `RequestTimeout`)
/// are surfaced synchronously to the caller and never crash the task loop;
/// adapter and model failures are recovered in-loop and only reach this type
/// when a caller wants to report them.
#[derive(Debug, thiserror::Error)]
pub enum DroidflowError {
    /// A resolve or poll call presented a stale, wrong, or already-consumed
    /// token. The request state is never mutated on this path.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// The request expired with no decision recorded.
    #[error("request timed out")]
    RequestTimeout,

    /// An ordinary device action failed to apply.
    #[error("device action failed: {0}")]
    Device(String),

    /// A transient failure while polling the relay for a decision.
    #[error("decision poll failed: {0}")]
    DecisionPoll(String),

    /// The model returned output that could not be parsed into an action.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    /// Relay-side failure outside the token/timeout protocol (I/O, bind, ...).
    #[error("relay error: {0}")]
    Relay(String),

    /// Configuration load or validation failure.
    #[error("configuration error: {0}")]
    Config(String),
}
