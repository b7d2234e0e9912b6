//! Receive side: windowed reassembly and acknowledgement emission.
//!
//! An [`RxConnection`] rebuilds one compressed packet from its
//! fragments. Within a window fragments may arrive in any order; the
//! window-relative index is recovered from the FCN and the payload is
//! placed at its stream offset. The final fragment is stashed until
//! every normal fragment before it has arrived, because only then is
//! its own offset known; reconstruction restores the rule id with the
//! fragmentation flag cleared and verifies the MIC over the whole
//! packet.
//!
//! Acknowledgements carry the received bitmap and are emitted at every
//! window boundary (FCN 0), when a retransmission completes a window,
//! and after every reconstruction attempt of the final window.

use log::{debug, trace, warn};

use crate::config::{FragParams, MAX_MTU_LENGTH, MAX_PACKET_SIZE, RULE_SIZE_BYTES};
use crate::error::{Error, Result};
use crate::link::LinkLayer;
use crate::wire::bits::{self, Bitmap};
use crate::wire::{matches_rule, AckHeader, FragmentHeader, Mic};

/// Outcome of feeding one frame to a receive connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    /// Fragment stored (or dropped as duplicate); nothing emitted.
    Pending,

    /// An acknowledgement went out for the current window.
    Acked,

    /// The packet is fully reassembled and its MIC confirmed.
    Complete,
}

/// The stashed final fragment, waiting for its offset to be known.
#[derive(Debug, Default)]
struct TerminalFrag {
    payload: heapless::Vec<u8, MAX_MTU_LENGTH>,
    raw_bits: usize,
    mic: Mic,
}

/// One reassembly session for a single device.
#[derive(Debug)]
pub struct RxConnection {
    device_id: u32,
    mtu: usize,
    params: FragParams,

    started: bool,
    rule_id: [u8; RULE_SIZE_BYTES],
    dtag: u8,
    window: u8,
    window_cnt: u32,
    bitmap: Bitmap,
    boundary_seen: bool,

    /// Payload bits per full-size normal fragment, fixed by the MTU.
    per_fragment_bits: usize,

    /// The one normal fragment allowed to run short: the stream tail.
    tail_normal: Option<(usize, usize)>,

    /// The packet being rebuilt: restored rule id, then payload bits.
    buffer: [u8; MAX_PACKET_SIZE],
    terminal: Option<TerminalFrag>,
    complete: bool,
    packet_len: usize,
}

impl RxConnection {
    /// Creates a free connection slot for a link with the given MTU.
    pub fn new(params: FragParams, mtu: usize) -> Self {
        Self {
            device_id: 0,
            mtu,
            params,
            started: false,
            rule_id: [0u8; RULE_SIZE_BYTES],
            dtag: 0,
            window: 0,
            window_cnt: 0,
            bitmap: Bitmap::new(),
            boundary_seen: false,
            per_fragment_bits: (mtu * 8).saturating_sub(params.header_bits()),
            tail_normal: None,
            buffer: [0u8; MAX_PACKET_SIZE],
            terminal: None,
            complete: false,
            packet_len: 0,
        }
    }

    /// The device this slot serves; zero means free.
    pub const fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Claims a free slot for a device.
    pub fn open(&mut self, device_id: u32) {
        self.device_id = device_id;
    }

    /// The received bitmap of the current window.
    pub const fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// The reassembled packet once the MIC has been confirmed.
    pub fn packet(&self) -> Option<&[u8]> {
        if self.complete {
            Some(&self.buffer[..self.packet_len])
        } else {
            None
        }
    }

    /// Returns the slot to the free state.
    pub fn reset(&mut self) {
        *self = Self::new(self.params, self.mtu);
    }

    /// Feeds one received frame into the session.
    ///
    /// Acknowledgements are transmitted through `link` as the protocol
    /// demands them; the caller learns about completion both from the
    /// returned event and from [`packet`](Self::packet).
    pub fn receive<L: LinkLayer>(&mut self, data: &[u8], link: &mut L) -> Result<RxEvent> {
        if self.per_fragment_bits == 0 {
            return Err(Error::InvalidParams);
        }

        let (header, payload_at) = FragmentHeader::decode(data, &self.params)?;

        if !self.started {
            self.started = true;
            self.rule_id = header.rule_id;
            self.dtag = header.dtag;
            // restore the original rule bits, fragmentation flag cleared
            bits::copy(
                &mut self.buffer,
                0,
                &header.rule_id,
                0,
                self.params.rule_size_bits as usize,
            );
            bits::clear(&mut self.buffer, self.params.frag_pos as usize, 1);
        } else if !matches_rule(data, &self.rule_id, &self.params) || header.dtag != self.dtag {
            debug!(
                "device {}: fragment for unknown rule or dtag, dropped",
                self.device_id
            );
            return Ok(RxEvent::Pending);
        }

        if header.fcn == self.params.all1_fcn() {
            return self.receive_terminal(&header, data, payload_at, link);
        }

        if self.complete {
            trace!("device {}: late fragment after completion", self.device_id);
            return Ok(RxEvent::Complete);
        }

        if header.window != self.window {
            debug!(
                "device {}: fragment for window {} while expecting {}, dropped",
                self.device_id, header.window, self.window
            );
            return Ok(RxEvent::Pending);
        }

        if header.fcn > self.params.max_wind_fcn {
            debug!("device {}: fcn {} out of range, dropped", self.device_id, header.fcn);
            return Ok(RxEvent::Pending);
        }
        let index = (self.params.max_wind_fcn - header.fcn) as usize;

        if self.bitmap.is_set(index) {
            trace!("device {}: duplicate fragment {}, dropped", self.device_id, index);
            return Ok(RxEvent::Pending);
        }

        let window_size = self.params.window_size();
        let absolute = self.window_cnt as usize * window_size + index;
        let head = self.params.rule_size_bits as usize + absolute * self.per_fragment_bits;
        let payload_bits = self
            .per_fragment_bits
            .min(data.len() * 8 - payload_at);
        if head + payload_bits > MAX_PACKET_SIZE * 8 {
            return Err(Error::PacketTooLarge);
        }

        bits::copy(&mut self.buffer, head, data, payload_at, payload_bits);
        if payload_bits < self.per_fragment_bits {
            // the stream tail: its shortfall is settled at reassembly
            self.tail_normal = Some((absolute, payload_bits));
        }
        self.bitmap.set(index);
        trace!(
            "device {}: fragment {} of window {} stored",
            self.device_id,
            index + 1,
            self.window_cnt
        );

        if header.fcn == 0 {
            self.boundary_seen = true;
        }

        if self.terminal.is_some() {
            // a retransmission for the final window
            return self.try_finish(link, false);
        }

        if self.boundary_seen && (header.fcn == 0 || self.bitmap.is_full(window_size)) {
            let advance = self.bitmap.is_full(window_size);
            self.send_ack(link, None)?;
            if advance {
                self.advance_window();
            }
            return Ok(RxEvent::Acked);
        }

        Ok(RxEvent::Pending)
    }

    fn receive_terminal<L: LinkLayer>(
        &mut self,
        header: &FragmentHeader,
        data: &[u8],
        payload_at: usize,
        link: &mut L,
    ) -> Result<RxEvent> {
        if self.complete {
            // the peer keeps sending the all-1: our final ack was lost
            debug!("device {}: repeating final ack", self.device_id);
            self.send_ack(link, Some(true))?;
            return Ok(RxEvent::Complete);
        }

        if header.window != self.window {
            debug!(
                "device {}: final fragment for window {} while expecting {}, dropped",
                self.device_id, header.window, self.window
            );
            return Ok(RxEvent::Pending);
        }

        if self.terminal.is_none() {
            let Some(mic) = header.mic else {
                return Err(Error::FrameTooShort);
            };

            let raw_bits = data.len() * 8 - payload_at;
            let mut aligned = [0u8; MAX_MTU_LENGTH];
            bits::copy(&mut aligned, 0, data, payload_at, raw_bits);

            let mut payload = heapless::Vec::new();
            payload
                .extend_from_slice(&aligned[..raw_bits.div_ceil(8)])
                .map_err(|_| Error::BufferTooSmall)?;

            self.terminal = Some(TerminalFrag {
                payload,
                raw_bits,
                mic,
            });
            self.bitmap.set(self.params.max_wind_fcn as usize);
            debug!("device {}: final fragment stashed", self.device_id);
        }

        self.try_finish(link, true)
    }

    /// Attempts to place the final fragment and verify the MIC.
    ///
    /// `emit_always` forces an acknowledgement even when normal
    /// fragments are still missing (the all-1 itself just arrived);
    /// otherwise one goes out only once the verdict is known.
    fn try_finish<L: LinkLayer>(&mut self, link: &mut L, emit_always: bool) -> Result<RxEvent> {
        let window_size = self.params.window_size();
        let rule_bits = self.params.rule_size_bits as usize;

        let mut have_all = false;
        let mut mic_ok = false;

        if let Some(term) = &self.terminal {
            let normals = self.bitmap.leading_set(window_size - 1);
            let no_gaps = (normals..window_size - 1).all(|i| !self.bitmap.is_set(i));

            if no_gaps {
                have_all = true;
                let normal_count = self.window_cnt as usize * window_size + normals;
                let mut normal_bits = normal_count * self.per_fragment_bits;
                if let Some((absolute, bits)) = self.tail_normal {
                    if absolute < normal_count {
                        normal_bits -= self.per_fragment_bits - bits;
                    }
                }
                let head = rule_bits + normal_bits;
                // the final fragment may carry trailing pad bits; the
                // reassembled packet must come out whole bytes
                let trim = (head + term.raw_bits) % 8;

                if term.raw_bits >= trim && head + term.raw_bits <= MAX_PACKET_SIZE * 8 {
                    let term_bits = term.raw_bits - trim;
                    bits::copy(&mut self.buffer, head, &term.payload, 0, term_bits);
                    let len = (head + term_bits) / 8;

                    let computed = Mic::compute(&self.buffer[..len]);
                    if computed == term.mic {
                        mic_ok = true;
                        self.complete = true;
                        self.packet_len = len;
                        debug!(
                            "device {}: packet of {} bytes reassembled, MIC {:08X} confirmed",
                            self.device_id,
                            len,
                            computed.value()
                        );
                    } else {
                        warn!(
                            "device {}: MIC mismatch, computed {:08X} received {:08X}",
                            self.device_id,
                            computed.value(),
                            term.mic.value()
                        );
                    }
                }
            }
        }

        if emit_always || have_all {
            self.send_ack(link, Some(mic_ok))?;
            Ok(if mic_ok {
                RxEvent::Complete
            } else {
                RxEvent::Acked
            })
        } else {
            Ok(RxEvent::Pending)
        }
    }

    fn send_ack<L: LinkLayer>(&mut self, link: &mut L, mic_ok: Option<bool>) -> Result<()> {
        let ack = AckHeader {
            dtag: self.dtag,
            window: self.window,
            mic_ok,
            bitmap: self.bitmap,
        };

        let mut buf = [0u8; 2 * RULE_SIZE_BYTES + 8];
        let len = ack.encode(&self.rule_id, &mut buf, &self.params)?;
        debug!(
            "device {}: ack window {} bitmap {:02X?} mic {:?}",
            self.device_id,
            self.window,
            self.bitmap.as_bytes(),
            mic_ok
        );
        link.send(&buf[..len], self.device_id)
    }

    fn advance_window(&mut self) {
        self.bitmap.clear_all();
        self.window ^= 1;
        self.window_cnt += 1;
        self.boundary_seen = false;
        trace!(
            "device {}: advancing to window {}",
            self.device_id,
            self.window_cnt
        );
    }
}
