#![cfg_attr(not(feature = "std"), no_std)]

//! A SCHC fragmentation engine for constrained links.
//!
//! A compressed packet larger than the link MTU is cut into fragments
//! with bit-packed headers, delivered window by window, repaired
//! through bitmap acknowledgements and sealed with a CRC32 message
//! integrity check. The engine is sans-I/O: transmission and timers are
//! capabilities the host injects through [`LinkLayer`].

#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod frag;
pub mod link;
pub mod wire;

pub use config::{FragParams, MAX_MTU_LENGTH, MAX_PACKET_SIZE, SCHC_CONF_RX_CONNS};
pub use error::{Error, Result};
pub use frag::{input, InputOutcome, RxConnection, RxEvent, RxPool, TxConnection, TxState};
pub use link::{CaptureLink, LinkLayer, NullLink, TimerKind};
pub use wire::{AckHeader, Bitmap, FragmentHeader, Mic};
