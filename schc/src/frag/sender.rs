//! Transmit side of the fragmentation engine.
//!
//! A [`TxConnection`] drives one packet through the fragmentation state
//! machine:
//!
//! ```text
//! Init -> Send -> WaitBitmap -> Resend -> End
//!           ^         |  ^        |
//!           +---------+  +--------+
//! ```
//!
//! `Send` emits fragments paced by the duty-cycle timer until a window
//! boundary (FCN 0) or the final fragment (all-ones FCN, MIC appended),
//! then waits for the peer's bitmap. Reconciliation either advances the
//! window, ends the transfer on a confirmed MIC, or retransmits exactly
//! the fragments whose bits differ.

use log::{debug, trace};

use crate::config::{FragParams, MAX_MTU_LENGTH, MAX_PACKET_SIZE, RULE_SIZE_BYTES};
use crate::error::{Error, Result};
use crate::link::{LinkLayer, TimerKind};
use crate::wire::bits::{self, Bitmap};
use crate::wire::{AckHeader, FragmentHeader, Mic};

/// States of the transmit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    /// Not yet validated; entered again after a reset.
    #[default]
    Init,

    /// Emitting the fragments of the current window.
    Send,

    /// Waiting for the peer's bitmap acknowledgement.
    WaitBitmap,

    /// Retransmitting the fragments the peer reported missing.
    Resend,

    /// Transfer complete, MIC confirmed by the peer.
    End,
}

/// One in-flight fragmentation toward a single device.
///
/// The connection borrows the compressed packet for its whole lifetime;
/// the host owns the buffer and must keep it stable until [`TxState::End`]
/// or a reset.
#[derive(Debug)]
pub struct TxConnection<'a> {
    packet: &'a [u8],
    mtu: usize,
    device_id: u32,
    dtag: u8,
    params: FragParams,

    rule_id: [u8; RULE_SIZE_BYTES],
    window: u8,
    window_cnt: u32,
    fcn: u8,
    frag_cnt: u32,
    bitmap: Bitmap,
    resend: Bitmap,
    mic: Mic,
    attempts: u32,
    state: TxState,
    last_ack: Option<AckHeader>,
}

impl<'a> TxConnection<'a> {
    /// Creates a connection for one compressed packet.
    ///
    /// Validation is deferred to the first [`fragment`](Self::fragment)
    /// call.
    pub fn new(
        packet: &'a [u8],
        mtu: usize,
        device_id: u32,
        dtag: u8,
        params: FragParams,
    ) -> Self {
        Self {
            packet,
            mtu,
            device_id,
            dtag,
            params,
            rule_id: [0u8; RULE_SIZE_BYTES],
            window: 0,
            window_cnt: 0,
            fcn: 0,
            frag_cnt: 0,
            bitmap: Bitmap::new(),
            resend: Bitmap::new(),
            mic: Mic::default(),
            attempts: 0,
            state: TxState::Init,
            last_ack: None,
        }
    }

    /// Current state of the machine.
    pub const fn state(&self) -> TxState {
        self.state
    }

    /// Number of retransmission rounds entered so far. A cap on this is
    /// host policy; the engine only counts.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of completed windows.
    pub const fn window_cnt(&self) -> u32 {
        self.window_cnt
    }

    /// Absolute number of distinct fragment slots reached so far.
    pub const fn frag_cnt(&self) -> u32 {
        self.frag_cnt
    }

    /// The local bitmap of the current window.
    pub const fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// The MIC computed over the packet at init.
    pub const fn mic(&self) -> &Mic {
        &self.mic
    }

    /// The rule id as sent on the wire, fragmentation flag included.
    pub const fn rule_id(&self) -> &[u8; RULE_SIZE_BYTES] {
        &self.rule_id
    }

    /// The most recently parsed acknowledgement.
    pub const fn last_ack(&self) -> Option<&AckHeader> {
        self.last_ack.as_ref()
    }

    /// Advances the state machine by one step.
    ///
    /// Call once to start a transfer, then again whenever a timer armed
    /// through the [`LinkLayer`] fires. Every step either transmits one
    /// frame and schedules the next re-entry, or re-arms the
    /// retransmission timer while waiting for an acknowledgement.
    ///
    /// Returns [`Error::NoFragmentationNeeded`] when the packet fits the
    /// MTU as-is; the caller then sends it unfragmented.
    pub fn fragment<L: LinkLayer>(&mut self, link: &mut L) -> Result<TxState> {
        loop {
            match self.state {
                TxState::Init => {
                    self.init()?;
                    self.state = TxState::Send;
                }
                TxState::Send => {
                    self.step_send(link)?;
                    return Ok(self.state);
                }
                TxState::WaitBitmap => {
                    // a retransmission timeout re-enters here; keep waiting
                    link.schedule(TimerKind::Retransmit, self.params.retransmit_timeout_ms);
                    return Ok(self.state);
                }
                TxState::Resend => {
                    self.step_resend(link)?;
                    return Ok(self.state);
                }
                TxState::End => {
                    link.cancel(TimerKind::Retransmit);
                    return Ok(self.state);
                }
            }
        }
    }

    /// Offers an inbound frame to the sender.
    ///
    /// Returns `true` if the frame was consumed as an acknowledgement
    /// for this connection. Anything else, including acknowledgements
    /// arriving outside [`TxState::WaitBitmap`], is left to the caller
    /// to feed to the reassembler.
    pub fn input<L: LinkLayer>(&mut self, data: &[u8], link: &mut L) -> Result<bool> {
        if self.state != TxState::WaitBitmap
            || !crate::wire::matches_rule(data, &self.rule_id, &self.params)
        {
            return Ok(false);
        }

        let expect_mic = self.no_more_fragments();
        let ack = AckHeader::decode(data, &self.params, expect_mic)?;
        self.last_ack = Some(ack);
        trace!(
            "ack for device {}: window {} bitmap {:02X?} mic {:?}",
            self.device_id,
            ack.window,
            ack.bitmap.as_bytes(),
            ack.mic_ok
        );

        if ack.mic_ok == Some(true) {
            // integrity confirmed, transmission cycle ends
            debug!("device {}: MIC confirmed, ending transmission", self.device_id);
            link.cancel(TimerKind::Retransmit);
            self.state = TxState::End;
            return Ok(true);
        }

        if ack.window != self.window {
            debug!(
                "device {}: ack for window {} while in window {}, discarded",
                self.device_id, ack.window, self.window
            );
            return Ok(true);
        }

        let window_size = self.params.window_size();
        let missing = Bitmap::diff(&self.bitmap, &ack.bitmap, window_size);

        if missing.is_empty(window_size) && !self.no_more_fragments() {
            // window fully received, move on to the next one
            link.cancel(TimerKind::Retransmit);
            self.bitmap.clear_all();
            self.resend.clear_all();
            self.window ^= 1;
            self.window_cnt += 1;
            debug!("device {}: window {} complete", self.device_id, self.window_cnt);
            self.state = TxState::Send;
            self.fragment(link)?;
            return Ok(true);
        }

        // the differing bits are exactly the fragments to retransmit; an
        // empty set here means a complete bitmap with a failed MIC, and
        // the resend pass will fall straight back to WaitBitmap
        self.resend = missing;
        self.attempts += 1;
        self.frag_cnt = self.window_base();
        self.state = TxState::Resend;
        self.fragment(link)?;
        Ok(true)
    }

    /// Resets the connection for reuse, keeping the packet borrow.
    pub fn reset(&mut self) {
        self.rule_id = [0u8; RULE_SIZE_BYTES];
        self.window = 0;
        self.window_cnt = 0;
        self.fcn = 0;
        self.frag_cnt = 0;
        self.bitmap.clear_all();
        self.resend.clear_all();
        self.mic = Mic::default();
        self.attempts = 0;
        self.state = TxState::Init;
        self.last_ack = None;
    }

    fn init(&mut self) -> Result<()> {
        self.params.validate()?;
        if self.mtu == 0 {
            return Err(Error::MissingMtu);
        }
        if self.mtu > MAX_MTU_LENGTH {
            return Err(Error::MtuTooLarge);
        }
        if self.packet.is_empty() {
            return Err(Error::EmptyPacket);
        }
        if self.packet.len() > MAX_PACKET_SIZE {
            return Err(Error::PacketTooLarge);
        }
        if self.packet.len() < self.mtu {
            debug!("device {}: packet fits the mtu, no fragmentation", self.device_id);
            return Err(Error::NoFragmentationNeeded);
        }
        // even the enlarged final header must leave room for payload
        if self.params.header_bits_all1() >= self.mtu * 8 {
            return Err(Error::InvalidParams);
        }

        // carry the packet's rule id with the fragmentation flag raised
        bits::copy(
            &mut self.rule_id,
            0,
            self.packet,
            0,
            self.params.rule_size_bits as usize,
        );
        bits::set(&mut self.rule_id, self.params.frag_pos as usize, 1);

        self.window = 0;
        self.window_cnt = 0;
        self.bitmap.clear_all();
        self.resend.clear_all();
        self.fcn = self.params.max_wind_fcn;
        self.frag_cnt = 0;
        self.attempts = 0;
        self.last_ack = None;

        self.mic = Mic::compute(self.packet);
        debug!(
            "device {}: MIC over {} bytes is {:08X}",
            self.device_id,
            self.packet.len(),
            self.mic.value()
        );

        Ok(())
    }

    fn step_send<L: LinkLayer>(&mut self, link: &mut L) -> Result<()> {
        self.frag_cnt += 1;
        let rel = (self.frag_cnt - 1 - self.window_base()) as usize;

        if self.no_more_fragments() {
            // the final fragment always occupies the last bitmap slot
            self.bitmap.set(self.params.max_wind_fcn as usize);
            self.fcn = self.params.all1_fcn();
            debug!("device {}: all-1 fragment {}", self.device_id, self.frag_cnt);
            self.send_fragment(link)?;
            link.schedule(TimerKind::Retransmit, self.params.retransmit_timeout_ms);
            self.state = TxState::WaitBitmap;
        } else if self.fcn == 0 {
            self.bitmap.set(rel);
            debug!("device {}: all-0 fragment {}", self.device_id, self.frag_cnt);
            self.send_fragment(link)?;
            self.fcn = self.params.max_wind_fcn;
            link.schedule(TimerKind::Retransmit, self.params.retransmit_timeout_ms);
            self.state = TxState::WaitBitmap;
        } else {
            self.bitmap.set(rel);
            self.send_fragment(link)?;
            self.fcn -= 1;
            link.schedule(TimerKind::DutyCycle, self.params.dc_ms);
        }

        Ok(())
    }

    fn step_resend<L: LinkLayer>(&mut self, link: &mut L) -> Result<()> {
        let window_size = self.params.window_size();
        let start = (self.frag_cnt - self.window_base()) as usize;

        match self.resend.first_set_from(start, window_size) {
            Some(idx) => {
                self.frag_cnt = self.window_base() + idx as u32 + 1;
                self.fcn = (window_size as u32 * (self.window_cnt + 1) - self.frag_cnt) as u8;
                debug!(
                    "device {}: retransmitting fragment {} (fcn {})",
                    self.device_id, self.frag_cnt, self.fcn
                );
                self.send_fragment(link)?;
                link.schedule(TimerKind::DutyCycle, self.params.dc_ms);
            }
            None => {
                // nothing left to retransmit, await a fresh bitmap
                self.frag_cnt = self.window_base() + window_size as u32;
                link.schedule(TimerKind::Retransmit, self.params.retransmit_timeout_ms);
                self.state = TxState::WaitBitmap;
            }
        }

        Ok(())
    }

    /// Frames and transmits the fragment selected by `frag_cnt`.
    fn send_fragment<L: LinkLayer>(&mut self, link: &mut L) -> Result<()> {
        let mut buf = [0u8; MAX_MTU_LENGTH];
        let terminal = self.no_more_fragments();

        let header = FragmentHeader {
            rule_id: self.rule_id,
            dtag: self.dtag,
            window: self.window,
            fcn: self.fcn,
            mic: terminal.then_some(self.mic),
        };
        let bit_offset = header.encode(&mut buf, &self.params)?;

        let per_fragment = self.per_fragment_bits();
        let stream_offset = per_fragment * (self.frag_cnt as usize - 1);
        // the last normal fragment before the all-1 may be short when
        // the tail would not fit alongside the MIC-enlarged header
        let payload_bits = if terminal {
            self.stream_bits().saturating_sub(stream_offset)
        } else {
            per_fragment.min(self.stream_bits() - stream_offset)
        };

        bits::copy(
            &mut buf,
            bit_offset,
            self.packet,
            self.params.rule_size_bits as usize + stream_offset,
            payload_bits,
        );

        let len = (bit_offset + payload_bits).div_ceil(8);
        trace!(
            "device {}: fragment {} on the wire, {} bytes",
            self.device_id,
            self.frag_cnt,
            len
        );
        link.send(&buf[..len], self.device_id)
    }

    /// True once the packet tail plus the MIC-enlarged header fits into
    /// a single remaining fragment.
    fn no_more_fragments(&self) -> bool {
        let full_fragments = (self.packet.len() / self.mtu) as u32;
        if self.frag_cnt <= full_fragments {
            return false;
        }

        let consumed = self.per_fragment_bits() * (self.frag_cnt as usize - 1);
        let stream = self.stream_bits();
        if consumed >= stream {
            return true;
        }

        self.params.header_bits_all1() + (stream - consumed) <= self.mtu * 8
    }

    /// Payload bits carried by one non-final fragment.
    fn per_fragment_bits(&self) -> usize {
        self.mtu * 8 - self.params.header_bits()
    }

    /// Bits of the packet that travel as payload: everything after the
    /// rule id, which the fragment header re-carries.
    fn stream_bits(&self) -> usize {
        self.packet.len() * 8 - self.params.rule_size_bits as usize
    }

    fn window_base(&self) -> u32 {
        self.window_cnt * self.params.window_size() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::CaptureLink;

    /// 8-bit rule, 4-bit dtag, 1-bit window, 3-bit fcn: a 16-bit header
    /// that keeps the test arithmetic byte-aligned.
    fn aligned_params() -> FragParams {
        FragParams::new().with_dtag_size_bits(4).with_duty_cycle_ms(50)
    }

    /// A packet whose head byte has the fragmentation flag clear.
    fn packet(len: usize) -> std::vec::Vec<u8> {
        (0..len).map(|i| ((i * 31 + 5) % 256) as u8 & !0x01).collect()
    }

    /// Fires duty-cycle timers until the sender stops re-arming them,
    /// emitting the rest of the current window.
    fn pump(tx: &mut TxConnection<'_>, link: &mut CaptureLink) {
        for _ in 0..64 {
            match link.armed_timer() {
                Some(TimerKind::DutyCycle) => {
                    link.fire();
                    tx.fragment(link).unwrap();
                }
                _ => return,
            }
        }
        panic!("sender kept re-arming the duty-cycle timer");
    }

    fn full_bitmap(len: usize) -> Bitmap {
        let mut bitmap = Bitmap::new();
        for i in 0..len {
            bitmap.set(i);
        }
        bitmap
    }

    fn ack_frame(
        tx: &TxConnection<'_>,
        params: &FragParams,
        window: u8,
        mic_ok: Option<bool>,
        bitmap: Bitmap,
    ) -> std::vec::Vec<u8> {
        let ack = AckHeader {
            dtag: 1,
            window,
            mic_ok,
            bitmap,
        };
        let mut buf = [0u8; 16];
        let len = ack.encode(tx.rule_id(), &mut buf, params).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn test_small_packet_needs_no_fragmentation() {
        let params = aligned_params();
        let data = packet(50);
        let mut tx = TxConnection::new(&data, 128, 1, 1, params);
        let mut link = CaptureLink::new();

        assert_eq!(tx.fragment(&mut link), Err(Error::NoFragmentationNeeded));
        assert!(link.frames().is_empty());
    }

    #[test]
    fn test_init_rejects_bad_configuration() {
        let params = aligned_params();
        let data = packet(100);

        let mut link = CaptureLink::new();
        let mut tx = TxConnection::new(&data, 0, 1, 1, params);
        assert_eq!(tx.fragment(&mut link), Err(Error::MissingMtu));

        let mut tx = TxConnection::new(&data, MAX_MTU_LENGTH + 1, 1, 1, params);
        assert_eq!(tx.fragment(&mut link), Err(Error::MtuTooLarge));

        let mut tx = TxConnection::new(&[], 12, 1, 1, params);
        assert_eq!(tx.fragment(&mut link), Err(Error::EmptyPacket));
    }

    #[test]
    fn test_single_window_fcn_countdown_and_mic() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);

        assert_eq!(tx.state(), TxState::WaitBitmap);
        assert_eq!(link.armed_timer(), Some(TimerKind::Retransmit));

        // ceil(66 / (12 - 2)) fragments, counting down to the all-1
        let frames = link.frames();
        assert_eq!(frames.len(), 7);
        let mut fcns = std::vec::Vec::new();
        for frame in frames {
            let (header, _) = FragmentHeader::decode(&frame.data, &params).unwrap();
            fcns.push(header.fcn);
        }
        assert_eq!(fcns, [6, 5, 4, 3, 2, 1, 7]);

        // every non-final frame fills the mtu, the final one carries the MIC
        for frame in &frames[..6] {
            assert_eq!(frame.data.len(), 12);
        }
        let (last, _) = FragmentHeader::decode(&frames[6].data, &params).unwrap();
        assert_eq!(last.mic, Some(Mic::compute(&data)));

        // the rule id on the wire is the packet head plus the flag
        assert_eq!(frames[0].data[0], data[0] | 0x01);

        // every sent slot is tracked in the local bitmap
        assert!(tx.bitmap().is_full(params.window_size()));
    }

    #[test]
    fn test_clean_ack_with_mic_ends_transfer() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);

        let ack = ack_frame(&tx, &params, 0, Some(true), full_bitmap(7));
        assert!(tx.input(&ack, &mut link).unwrap());

        assert_eq!(tx.state(), TxState::End);
        assert_eq!(link.last_cancelled(), Some(TimerKind::Retransmit));
        assert_eq!(link.armed_timer(), None);
        assert_eq!(tx.attempts(), 0);
    }

    #[test]
    fn test_missing_fragments_are_resent_in_order() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);
        let originals = link.take_frames();

        // the peer lost fragments 2 and 3
        let mut bitmap = full_bitmap(7);
        bitmap.as_bytes_mut()[0] &= !0b0110_0000;
        let ack = ack_frame(&tx, &params, 0, Some(false), bitmap);
        assert!(tx.input(&ack, &mut link).unwrap());

        assert_eq!(tx.attempts(), 1);
        pump(&mut tx, &mut link);

        // exactly the missing fragments, ascending, byte-identical
        let resent = link.frames();
        assert_eq!(resent.len(), 2);
        assert_eq!(resent[0].data, originals[1].data);
        assert_eq!(resent[1].data, originals[2].data);

        // then back to waiting for a fresh bitmap
        assert_eq!(tx.state(), TxState::WaitBitmap);
        assert_eq!(link.armed_timer(), Some(TimerKind::Retransmit));

        let ack = ack_frame(&tx, &params, 0, Some(true), full_bitmap(7));
        assert!(tx.input(&ack, &mut link).unwrap());
        assert_eq!(tx.state(), TxState::End);
    }

    #[test]
    fn test_unexpected_window_is_discarded() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);
        link.take_frames();

        let ack = ack_frame(&tx, &params, 1, Some(false), Bitmap::new());
        assert!(tx.input(&ack, &mut link).unwrap());

        assert_eq!(tx.state(), TxState::WaitBitmap);
        assert!(link.frames().is_empty());
        assert_eq!(tx.attempts(), 0);
    }

    #[test]
    fn test_non_ack_input_is_not_consumed() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();

        // not in WaitBitmap yet: everything is data
        let frame = [0xA5u8, 0x00, 0x00];
        assert!(!tx.input(&frame, &mut link).unwrap());

        pump(&mut tx, &mut link);

        // wrong rule id: data as well
        let other_rule = [0x12u8, 0x00, 0x00];
        assert!(!tx.input(&other_rule, &mut link).unwrap());
    }

    #[test]
    fn test_two_windows_with_losses_in_the_first() {
        // 17-bit header: 10-fragment windows with unaligned payload
        let params = FragParams::new()
            .with_dtag_size_bits(4)
            .with_fcn(4, 9)
            .with_duty_cycle_ms(50);
        let data = packet(120);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);

        let window0 = link.take_frames();
        assert_eq!(window0.len(), 10);
        let (boundary, _) = FragmentHeader::decode(&window0[9].data, &params).unwrap();
        assert_eq!(boundary.fcn, 0);

        // fragments 2, 9 and 10 went missing
        let mut bitmap = full_bitmap(10);
        bitmap.as_bytes_mut()[0] &= !0b0100_0000;
        bitmap.as_bytes_mut()[1] &= !0b1100_0000;
        let ack = ack_frame(&tx, &params, 0, None, bitmap);
        assert!(tx.input(&ack, &mut link).unwrap());
        pump(&mut tx, &mut link);

        let resent = link.take_frames();
        assert_eq!(resent.len(), 3);
        assert_eq!(resent[0].data, window0[1].data);
        assert_eq!(resent[1].data, window0[8].data);
        assert_eq!(resent[2].data, window0[9].data);
        assert_eq!(tx.state(), TxState::WaitBitmap);

        // a clean bitmap advances to the second window
        let ack = ack_frame(&tx, &params, 0, None, full_bitmap(10));
        assert!(tx.input(&ack, &mut link).unwrap());
        pump(&mut tx, &mut link);

        assert_eq!(tx.window_cnt(), 1);
        let window1 = link.take_frames();
        assert_eq!(window1.len(), 3);
        let (first, _) = FragmentHeader::decode(&window1[0].data, &params).unwrap();
        assert_eq!(first.window, 1);
        assert_eq!(first.fcn, 9);
        let (last, _) = FragmentHeader::decode(&window1[2].data, &params).unwrap();
        assert_eq!(last.fcn, params.all1_fcn());
        assert!(last.mic.is_some());

        // final ack ends the transfer
        let mut final_bitmap = Bitmap::new();
        final_bitmap.set(0);
        final_bitmap.set(1);
        final_bitmap.set(9);
        let ack = ack_frame(&tx, &params, 1, Some(true), final_bitmap);
        assert!(tx.input(&ack, &mut link).unwrap());
        assert_eq!(tx.state(), TxState::End);
    }

    #[test]
    fn test_complete_bitmap_with_failed_mic_keeps_waiting() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);
        link.take_frames();

        let ack = ack_frame(&tx, &params, 0, Some(false), full_bitmap(7));
        assert!(tx.input(&ack, &mut link).unwrap());

        // nothing to retransmit: the round just re-arms and waits
        assert_eq!(tx.state(), TxState::WaitBitmap);
        assert!(link.frames().is_empty());
        assert_eq!(tx.attempts(), 1);
        assert_eq!(link.armed_timer(), Some(TimerKind::Retransmit));
    }

    #[test]
    fn test_retransmit_timeout_rearms_in_wait_bitmap() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);
        link.take_frames();

        assert_eq!(link.fire(), Some(TimerKind::Retransmit));
        tx.fragment(&mut link).unwrap();

        assert_eq!(tx.state(), TxState::WaitBitmap);
        assert_eq!(link.armed_timer(), Some(TimerKind::Retransmit));
        assert!(link.frames().is_empty());
    }

    #[test]
    fn test_reset_returns_to_init() {
        let params = aligned_params();
        let data = packet(66);
        let mut tx = TxConnection::new(&data, 12, 1, 1, params);
        let mut link = CaptureLink::new();

        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);

        tx.reset();
        assert_eq!(tx.state(), TxState::Init);
        assert_eq!(tx.frag_cnt(), 0);
        assert!(tx.bitmap().is_empty(params.window_size()));

        // the machine restarts cleanly after a reset
        link.clear();
        tx.fragment(&mut link).unwrap();
        pump(&mut tx, &mut link);
        assert_eq!(link.frames().len(), 7);
    }
}
