//! Error types for tmesh.
//!
//! Scheduling and framing errors never abort the host loop: every variant
//! except [`ChunkError::AllocationFailure`] describes a unit of work that was
//! skipped and can simply be retried on the next iteration.

use thiserror::Error;

use super::link::LinkId;
use crate::radio::{MediumId, RadioId};

/// Errors in the chunked framing protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Empty or otherwise unusable input; nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A chunk declares more payload than was supplied.
    #[error("chunk declares {declared} bytes but only {supplied} supplied")]
    ProtocolViolation {
        /// Length from the chunk's prefix byte.
        declared: usize,
        /// Payload bytes actually present.
        supplied: usize,
    },

    /// Buffer growth could not be satisfied.
    #[error("buffer allocation failed")]
    AllocationFailure,

    /// Cloaked payload could not be restored.
    #[error("decloak failed: {0}")]
    Cloak(String),

    /// Cursor or frame bound exceeded.
    #[error("out of range: requested {requested}, available {available}")]
    OutOfRange {
        /// Bytes requested.
        requested: usize,
        /// Bytes available.
        available: usize,
    },
}

/// Errors from the radio driver registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// No registered driver recognizes the medium.
    #[error("no driver recognizes medium {0}")]
    NoMediumMatch(MediumId),

    /// The registry is already at capacity.
    #[error("radio registry full ({0} drivers)")]
    RegistryFull(usize),

    /// No driver registered under this id.
    #[error("unknown radio device {0:?}")]
    UnknownDevice(RadioId),

    /// Driver-reported hardware failure.
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Errors from epoch scheduling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The mote has no usable epoch.
    #[error("no schedule")]
    NoSchedule,

    /// Unusable scheduling input (zero channels, exhausted windows).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Top-level tmesh errors.
#[derive(Debug, Error)]
pub enum TmeshError {
    /// Framing error.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Radio error.
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    /// Scheduling error.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Community is at its neighbor cap.
    #[error("community {community} is full ({max} motes)")]
    CapacityExceeded {
        /// Community name.
        community: String,
        /// Configured capacity.
        max: usize,
    },

    /// No community under this id or name.
    #[error("unknown community")]
    UnknownCommunity,

    /// No mote under this id.
    #[error("unknown mote")]
    UnknownMote,

    /// Link already bound to another mote of the community.
    #[error("link {0} already bound")]
    AlreadyBound(LinkId),

    /// Radio frame failed validation.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from a host transceiver.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TmeshError {
    /// Check if this error means an inbound unit was dropped.
    ///
    /// Recovery is the peer's job via its own resend/ack cycle, so the host
    /// just carries on.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            TmeshError::MalformedFrame(_)
                | TmeshError::Chunk(ChunkError::ProtocolViolation { .. })
                | TmeshError::Chunk(ChunkError::Cloak(_))
        )
    }

    /// Check if this error is a hard failure of the operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TmeshError::Chunk(ChunkError::AllocationFailure))
    }
}

/// Result type for tmesh operations.
pub type TmeshResult<T> = Result<T, TmeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_errors() {
        assert!(TmeshError::MalformedFrame("short".into()).is_drop());
        assert!(
            TmeshError::from(ChunkError::ProtocolViolation {
                declared: 9,
                supplied: 3
            })
            .is_drop()
        );
        assert!(TmeshError::from(ChunkError::Cloak("short".into())).is_drop());

        assert!(!TmeshError::UnknownMote.is_drop());
        assert!(!TmeshError::from(ChunkError::AllocationFailure).is_drop());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(TmeshError::from(ChunkError::AllocationFailure).is_fatal());

        assert!(!TmeshError::from(ScheduleError::NoSchedule).is_fatal());
        assert!(
            !TmeshError::CapacityExceeded {
                community: "lora".into(),
                max: 8
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_error_display() {
        let err = ChunkError::ProtocolViolation {
            declared: 12,
            supplied: 4,
        };
        assert_eq!(err.to_string(), "chunk declares 12 bytes but only 4 supplied");

        let err = RadioError::NoMediumMatch(MediumId::from_bytes([1, 2, 3, 4, 5]));
        assert_eq!(err.to_string(), "no driver recognizes medium 0102030405");
    }
}
