//! Fixed pool of receive connections.
//!
//! Reassembly state is kept in a process-wide array of
//! `SCHC_CONF_RX_CONNS` slots keyed by device id. A lookup first
//! returns the slot already serving the device, then claims a free one,
//! and fails once the pool is exhausted.

use log::debug;

use crate::config::{FragParams, SCHC_CONF_RX_CONNS};
use crate::error::{Error, Result};
use crate::frag::receiver::{RxConnection, RxEvent};
use crate::link::LinkLayer;

/// The receive-connection pool.
#[derive(Debug)]
pub struct RxPool {
    conns: [RxConnection; SCHC_CONF_RX_CONNS],
}

impl RxPool {
    /// Creates a pool of free slots sharing one wire profile and link MTU.
    pub fn new(params: FragParams, mtu: usize) -> Self {
        Self {
            conns: core::array::from_fn(|_| RxConnection::new(params, mtu)),
        }
    }

    /// Looks up the connection for a device, claiming a free slot when
    /// the device has none yet.
    pub fn connection(&mut self, device_id: u32) -> Result<&mut RxConnection> {
        if device_id == 0 {
            return Err(Error::NoConnection);
        }

        if let Some(i) = self.conns.iter().position(|c| c.device_id() == device_id) {
            return Ok(&mut self.conns[i]);
        }

        if let Some(i) = self.conns.iter().position(|c| c.device_id() == 0) {
            debug!("pool: slot {} opened for device {}", i, device_id);
            self.conns[i].open(device_id);
            return Ok(&mut self.conns[i]);
        }

        debug!("pool: no free connections for device {}", device_id);
        Err(Error::NoConnection)
    }

    /// Feeds a received frame to the device's reassembly session.
    pub fn reassemble<L: LinkLayer>(
        &mut self,
        data: &[u8],
        device_id: u32,
        link: &mut L,
    ) -> Result<RxEvent> {
        self.connection(device_id)?.receive(data, link)
    }

    /// Releases the slot serving a device, if any.
    pub fn release(&mut self, device_id: u32) {
        if let Some(conn) = self
            .conns
            .iter_mut()
            .find(|c| c.device_id() == device_id)
        {
            conn.reset();
        }
    }

    /// Resets every slot to the free state.
    pub fn reset_all(&mut self) {
        for conn in &mut self.conns {
            conn.reset();
        }
    }

    /// Number of slots currently serving a device.
    pub fn active(&self) -> usize {
        self.conns.iter().filter(|c| c.device_id() != 0).count()
    }
}
