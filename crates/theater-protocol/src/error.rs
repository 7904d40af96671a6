//! Error types for the protocol layer.
//!
//! Protocol errors are always scoped to a single command: a missing
//! or malformed field makes that command unusable, never the
//! connection that carried it.

/// Errors raised while reading typed values out of a [`Command`](crate::Command).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A field the operation requires was not present.
    #[error("{op}: missing field {field}")]
    MissingField {
        /// Operation code of the offending command.
        op: String,
        /// Name of the absent field.
        field: String,
    },

    /// A field was present but its value could not be parsed.
    #[error("{op}: invalid value {value:?} for field {field}")]
    InvalidField {
        /// Operation code of the offending command.
        op: String,
        /// Name of the malformed field.
        field: String,
        /// The raw value as received.
        value: String,
    },

    /// The command was routed to a handler for a different operation.
    #[error("expected {expected} command, got {actual}")]
    UnexpectedOp {
        /// Operation the typed view expects.
        expected: String,
        /// Operation the command actually carries.
        actual: String,
    },
}
