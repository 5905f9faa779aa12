use core::fmt;

use nema_protocol::NemaCmdDecodeError;
use slate_memory::GuestMemoryError;
use thiserror::Error;

use crate::surface::PixelFormat;

/// Coarse fault category, used for logging and by tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The guest wrote something outside the command vocabulary.
    Protocol,
    /// Pipeline bindings or flags are inconsistent at a draw.
    State,
    /// Memory or surface layout could not be satisfied.
    Resource,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NemaError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),
    #[error("invalid texture slot {0}")]
    InvalidTextureSlot(u8),

    #[error("no destination surface bound")]
    DestinationNotBound,
    #[error("clip region was never set")]
    ClipNotSet,
    #[error("mask flag is {flag} but mask bound is {bound}")]
    MaskBindingMismatch { flag: bool, bound: bool },
    #[error("opacity flag is {flag} but constant color set is {set}")]
    OpacityBindingMismatch { flag: bool, set: bool },
    #[error("blit without a source surface")]
    SourceNotBound,
    #[error("path drawing with a bound mask is not supported")]
    MaskedPathUnsupported,

    #[error(transparent)]
    Memory(GuestMemoryError),
    #[error("mapping at 0x{paddr:x} truncated: requested {requested} bytes, got {mapped}")]
    MappingTruncated {
        paddr: u64,
        requested: usize,
        mapped: u64,
    },
    #[error("command list count {count} exceeds capacity")]
    CommandListOverflow { count: usize },
    #[error("invalid stride {stride} for {width} px of {format:?}")]
    InvalidStride {
        stride: i32,
        width: u32,
        format: PixelFormat,
    },
    #[error("surface of {height} rows at stride {stride} is too large")]
    SurfaceTooLarge { stride: i32, height: u32 },
}

impl NemaError {
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::InvalidOpcode(_) | Self::InvalidTextureSlot(_) => FaultKind::Protocol,
            Self::DestinationNotBound
            | Self::ClipNotSet
            | Self::MaskBindingMismatch { .. }
            | Self::OpacityBindingMismatch { .. }
            | Self::SourceNotBound
            | Self::MaskedPathUnsupported => FaultKind::State,
            Self::Memory(_)
            | Self::MappingTruncated { .. }
            | Self::CommandListOverflow { .. }
            | Self::InvalidStride { .. }
            | Self::SurfaceTooLarge { .. } => FaultKind::Resource,
        }
    }
}

impl From<GuestMemoryError> for NemaError {
    fn from(err: GuestMemoryError) -> Self {
        match err {
            GuestMemoryError::MappingTruncated {
                paddr,
                requested,
                mapped,
            } => Self::MappingTruncated {
                paddr,
                requested,
                mapped,
            },
            other => Self::Memory(other),
        }
    }
}

impl From<NemaCmdDecodeError> for NemaError {
    fn from(err: NemaCmdDecodeError) -> Self {
        match err {
            NemaCmdDecodeError::UnknownOpcode { found } => Self::InvalidOpcode(found),
            NemaCmdDecodeError::InvalidTexSlot { found } => Self::InvalidTextureSlot(found),
            NemaCmdDecodeError::TooManyCommands { count } => Self::CommandListOverflow { count },
            NemaCmdDecodeError::BufferTooSmall { needed, found } => Self::MappingTruncated {
                paddr: 0,
                requested: needed,
                mapped: found as u64,
            },
        }
    }
}

/// A faulted submission.
///
/// `index`/`opcode` locate the failing record; both are `None` when the list itself could not be
/// acquired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFault {
    pub index: Option<usize>,
    pub opcode: Option<u8>,
    pub error: NemaError,
}

impl ListFault {
    pub fn list(error: NemaError) -> Self {
        Self {
            index: None,
            opcode: None,
            error,
        }
    }

    pub fn record(index: usize, opcode: u8, error: NemaError) -> Self {
        Self {
            index: Some(index),
            opcode: Some(opcode),
            error,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.error.kind()
    }
}

impl fmt::Display for ListFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, self.opcode) {
            (Some(index), Some(opcode)) => {
                write!(f, "command {index} (opcode {opcode}) faulted: {}", self.error)
            }
            _ => write!(f, "command list faulted: {}", self.error),
        }
    }
}

impl std::error::Error for ListFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_mappings_surface_as_their_own_variant() {
        let err = NemaError::from(GuestMemoryError::MappingTruncated {
            paddr: 0x10,
            requested: 32,
            mapped: 8,
        });
        assert_eq!(
            err,
            NemaError::MappingTruncated {
                paddr: 0x10,
                requested: 32,
                mapped: 8
            }
        );
        assert_eq!(err.kind(), FaultKind::Resource);
        assert_eq!(NemaError::from(GuestMemoryError::Busy).kind(), FaultKind::Resource);
    }

    #[test]
    fn decode_errors_map_onto_fault_categories() {
        let opcode = NemaError::from(NemaCmdDecodeError::UnknownOpcode { found: 42 });
        assert_eq!(opcode, NemaError::InvalidOpcode(42));
        assert_eq!(opcode.kind(), FaultKind::Protocol);

        let overflow = NemaError::from(NemaCmdDecodeError::TooManyCommands { count: 251 });
        assert_eq!(overflow.kind(), FaultKind::Resource);
    }

    #[test]
    fn list_fault_display_names_the_record() {
        let fault = ListFault::record(3, 8, NemaError::ClipNotSet);
        assert_eq!(
            fault.to_string(),
            "command 3 (opcode 8) faulted: clip region was never set"
        );
        assert_eq!(fault.kind(), FaultKind::State);

        let fault = ListFault::list(NemaError::CommandListOverflow { count: 251 });
        assert_eq!(
            fault.to_string(),
            "command list faulted: command list count 251 exceeds capacity"
        );
    }
}
