//! Error types for the fragmentation engine.
//!
//! This module defines all possible errors that can occur while
//! fragmenting, acknowledging or reassembling a packet.

use core::fmt;

/// Result type alias for fragmentation operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for the fragmentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer is too small for the operation.
    BufferTooSmall,

    /// Inbound frame is shorter than its header demands.
    FrameTooShort,

    /// Wire-layout parameters are inconsistent or exceed the
    /// compile-time capacities.
    InvalidParams,

    /// No MTU was configured for the connection.
    MissingMtu,

    /// Configured MTU exceeds `MAX_MTU_LENGTH`.
    MtuTooLarge,

    /// The compressed packet is empty.
    EmptyPacket,

    /// The compressed packet exceeds `MAX_PACKET_SIZE`.
    PacketTooLarge,

    /// The packet is smaller than the MTU and can be sent as-is.
    NoFragmentationNeeded,

    /// The receive-connection pool is exhausted.
    NoConnection,

    /// Invalid state for this operation.
    InvalidState,
}

impl Error {
    /// Returns a human-readable description of the error.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Error::BufferTooSmall => "buffer too small",
            Error::FrameTooShort => "frame too short",
            Error::InvalidParams => "invalid wire parameters",
            Error::MissingMtu => "no mtu specified",
            Error::MtuTooLarge => "mtu exceeds maximum",
            Error::EmptyPacket => "empty packet",
            Error::PacketTooLarge => "packet too large",
            Error::NoFragmentationNeeded => "no fragmentation needed",
            Error::NoConnection => "no free connections",
            Error::InvalidState => "invalid state",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
