//! Fragmentation sessions: transmit state machine, reassembly and the
//! receive-connection pool.

mod pool;
mod receiver;
mod sender;

pub use pool::RxPool;
pub use receiver::{RxConnection, RxEvent};
pub use sender::{TxConnection, TxState};

use crate::error::Result;
use crate::link::LinkLayer;

/// How an inbound frame was consumed by [`input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The frame was an acknowledgement for the transmit connection.
    Ack(TxState),

    /// The frame went to the reassembler.
    Reassembly(RxEvent),
}

/// Dispatches one inbound frame.
///
/// A frame is an acknowledgement only while the transmit connection is
/// waiting for a bitmap and the frame opens with its rule id; anything
/// else is data for the device's reassembly session.
pub fn input<L: LinkLayer>(
    data: &[u8],
    tx: &mut TxConnection<'_>,
    pool: &mut RxPool,
    device_id: u32,
    link: &mut L,
) -> Result<InputOutcome> {
    if tx.input(data, link)? {
        return Ok(InputOutcome::Ack(tx.state()));
    }

    pool.reassemble(data, device_id, link)
        .map(InputOutcome::Reassembly)
}
