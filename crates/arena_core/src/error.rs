//! Error types for the combat core.

use thiserror::Error;

use crate::components::{Side, UnitId};

/// Result type alias using [`ArenaError`].
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Error returned by an [`EventSink`](crate::dispatcher::EventSink) that
/// refused an event.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for all combat core errors.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// A unit failed validation at construction time.
    #[error("Invalid unit '{unit}': {reason}")]
    InvalidUnit {
        /// Name or id of the offending unit.
        unit: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An effect definition is malformed.
    #[error("Invalid effect definition in '{context}': {reason}")]
    InvalidEffect {
        /// Where the effect was defined (template or skill name).
        context: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Data file parsing error.
    #[error("Failed to parse data '{origin}': {message}")]
    DataParseError {
        /// File path or other description of the data origin.
        origin: String,
        /// Error message.
        message: String,
    },

    /// A scenario referenced a template that is not registered.
    #[error("Unknown unit template: {0}")]
    UnknownTemplate(String),

    /// Simulation configuration rejected before the run started.
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    /// The event sink refused an event. The seq was not consumed.
    #[error("Event sink rejected {event_type} (seq {seq} withheld): {source}")]
    Delivery {
        /// Sequence number the event would have received.
        seq: u64,
        /// Wire name of the event type.
        event_type: &'static str,
        /// Error raised by the sink.
        #[source]
        source: SinkError,
    },

    /// An event referenced a unit the reconstructor does not know about.
    #[error("Event {event_type} (seq {seq:?}) references unknown {side} unit {unit}")]
    UnknownUnit {
        /// Side the unit was expected on.
        side: Side,
        /// Unit identifier.
        unit: UnitId,
        /// Wire name of the event type.
        event_type: &'static str,
        /// Sequence number of the offending event, if any.
        seq: Option<u64>,
    },

    /// Reconstruction was attempted without an initial snapshot.
    #[error("Reconstruction has no initial snapshot")]
    MissingSnapshot,

    /// Reconstructed state disagrees with authoritative state.
    #[error("Desync on {side} unit {unit} field '{field}': expected {expected}, got {actual}")]
    DesyncDetected {
        /// Side of the diverging unit.
        side: Side,
        /// Diverging unit.
        unit: UnitId,
        /// Name of the diverging field.
        field: &'static str,
        /// Authoritative value.
        expected: String,
        /// Reconstructed value.
        actual: String,
    },

    /// Reading or writing a combat record failed.
    #[error("Combat record error: {0}")]
    Record(String),
}
