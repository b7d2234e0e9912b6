//! Fragment and acknowledgement header framing.
//!
//! Headers are packed MSB-first at bit granularity; none of the fields
//! is required to land on a byte boundary.
//!
//! # Fragment format
//!
//! ```text
//! | rule id (R bits) | dtag (T bits) | window (W bits) | fcn (N bits) |
//! | mic (32 bits, final fragment only) | payload bits ...             |
//! ```
//!
//! An all-ones FCN marks the final fragment, which carries the MIC; an
//! FCN of zero marks the last fragment of a non-final window.
//!
//! # Acknowledgement format
//!
//! ```text
//! | rule id (R bits) | dtag (T bits) | window (W bits) |
//! | mic ok (1 bit, final window only) | bitmap (max_wind_fcn + 1 bits) |
//! ```

use crate::config::{FragParams, RULE_SIZE_BYTES};
use crate::wire::bits::{self, BitReader, BitWriter, Bitmap};
use crate::wire::mic::Mic;
use crate::error::Result;

/// Header of one fragment on the wire.
///
/// The rule id carries the fragmentation flag so receivers can tell
/// fragments from unfragmented packets sharing the rule space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Rule id bits, fragmentation flag included.
    pub rule_id: [u8; RULE_SIZE_BYTES],

    /// Tag distinguishing concurrent fragmentations toward one peer.
    pub dtag: u8,

    /// Window the fragment belongs to.
    pub window: u8,

    /// Fragment compressed number within the window.
    pub fcn: u8,

    /// Message integrity check, present on the final fragment only.
    pub mic: Option<Mic>,
}

impl FragmentHeader {
    /// Packs the header into the front of `buf`.
    ///
    /// Returns the bit offset at which the payload starts.
    pub fn encode(&self, buf: &mut [u8], params: &FragParams) -> Result<usize> {
        let mut w = BitWriter::new(buf);

        w.write(&self.rule_id, 0, params.rule_size_bits as usize)?;
        w.write_u8(self.dtag, params.dtag_size_bits as usize)?;
        w.write_u8(self.window, params.window_size_bits as usize)?;
        w.write_u8(self.fcn, params.fcn_size_bits as usize)?;

        if let Some(mic) = &self.mic {
            w.write(mic.as_bytes(), 0, 32)?;
        }

        Ok(w.pos())
    }

    /// Unpacks a header from a received frame.
    ///
    /// The MIC is consumed when the FCN decodes to the all-ones value.
    /// Returns the header and the bit offset at which the payload starts.
    pub fn decode(data: &[u8], params: &FragParams) -> Result<(Self, usize)> {
        let mut r = BitReader::new(data);

        let mut rule_id = [0u8; RULE_SIZE_BYTES];
        r.read_into(&mut rule_id, 0, params.rule_size_bits as usize)?;
        let dtag = r.read_u8(params.dtag_size_bits as usize)?;
        let window = r.read_u8(params.window_size_bits as usize)?;
        let fcn = r.read_u8(params.fcn_size_bits as usize)?;

        let mic = if fcn == params.all1_fcn() {
            let mut mic_bytes = [0u8; 4];
            r.read_into(&mut mic_bytes, 0, 32)?;
            Some(Mic::from_bytes(mic_bytes))
        } else {
            None
        };

        Ok((
            Self {
                rule_id,
                dtag,
                window,
                fcn,
                mic,
            },
            r.pos(),
        ))
    }
}

/// Returns true if the frame opens with the given rule id.
pub fn matches_rule(data: &[u8], rule_id: &[u8; RULE_SIZE_BYTES], params: &FragParams) -> bool {
    let len = params.rule_size_bits as usize;
    data.len() * 8 >= len && bits::compare(data, rule_id, len)
}

/// An acknowledgement as exchanged after a window boundary or the final
/// fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    /// Tag echoed from the fragments being acknowledged.
    pub dtag: u8,

    /// Window the bitmap refers to.
    pub window: u8,

    /// Integrity verdict, present when acknowledging the final window.
    pub mic_ok: Option<bool>,

    /// Bitmap of received fragments, one bit per window slot.
    pub bitmap: Bitmap,
}

impl AckHeader {
    /// Packs the acknowledgement into `buf` under the given rule id.
    ///
    /// Returns the number of bytes occupied on the wire.
    pub fn encode(
        &self,
        rule_id: &[u8; RULE_SIZE_BYTES],
        buf: &mut [u8],
        params: &FragParams,
    ) -> Result<usize> {
        let mut w = BitWriter::new(buf);

        w.write(rule_id, 0, params.rule_size_bits as usize)?;
        w.write_u8(self.dtag, params.dtag_size_bits as usize)?;
        w.write_u8(self.window, params.window_size_bits as usize)?;

        if let Some(mic_ok) = self.mic_ok {
            w.write_u8(u8::from(mic_ok), 1)?;
        }

        w.write(self.bitmap.as_bytes(), 0, params.window_size())?;

        Ok(w.pos().div_ceil(8))
    }

    /// Unpacks an acknowledgement.
    ///
    /// The caller decides with `expect_mic` whether the frame carries
    /// the integrity flag; only the sender of the final fragment knows.
    /// The rule id has already been matched by the caller.
    pub fn decode(data: &[u8], params: &FragParams, expect_mic: bool) -> Result<Self> {
        let mut r = BitReader::new(data);

        let mut rule_id = [0u8; RULE_SIZE_BYTES];
        r.read_into(&mut rule_id, 0, params.rule_size_bits as usize)?;
        let dtag = r.read_u8(params.dtag_size_bits as usize)?;
        let window = r.read_u8(params.window_size_bits as usize)?;

        let mic_ok = if expect_mic {
            Some(r.read_u8(1)? != 0)
        } else {
            None
        };

        let mut bitmap = Bitmap::new();
        r.read_into(bitmap.as_bytes_mut(), 0, params.window_size())?;

        Ok(Self {
            dtag,
            window,
            mic_ok,
            bitmap,
        })
    }
}
