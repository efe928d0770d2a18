//! # 802.11 Neighbor Report frames
//!
//! An RRM Neighbor Report element body: a fixed 13-byte prefix followed
//! by a tagged subelement list (see [`crate::element`]).
//!
//! ```text
//!  0        5 6        9 10       11       12       13
//! +----------+----------+--------+---------+--------+----------------+
//! |  BSSID   |BSSID-info|op-class| channel |phy-type| subelements... |
//! +----------+----------+--------+---------+--------+----------------+
//! ```
//!
//! Templates arrive from the driver as hex strings; the helpers here
//! decode them once and let the candidate-list code stamp a preference
//! subelement per recipient.

use crate::element::{self, ElementError};

/// Length of the fixed neighbor-report prefix.
pub const NR_PREFIX_LEN: usize = 13;

/// Subelement carrying the BSS Transition candidate preference (0..255).
pub const NR_SUBELEMENT_PREFERENCE: u8 = 3;

/// Byte offset of the operating class within the prefix.
pub const NR_OFFSET_OP_CLASS: usize = 10;

/// Byte offset of the channel number within the prefix.
pub const NR_OFFSET_CHANNEL: usize = 11;

/// Byte offset of the PHY type within the prefix.
pub const NR_OFFSET_PHY_TYPE: usize = 12;

/// Length of the prefix plus a valid subelement list, or an error when
/// the buffer is shorter than the prefix or the subelement list is
/// malformed.
pub fn nr_len(buf: &[u8]) -> Result<usize, ElementError> {
    if buf.len() < NR_PREFIX_LEN {
        return Err(ElementError::Malformed);
    }

    let sub_len = element::element_list_len(&buf[NR_PREFIX_LEN..])?;
    Ok(NR_PREFIX_LEN + sub_len)
}

/// Whether `buf` starts with a well-formed neighbor report.
pub fn nr_valid(buf: &[u8]) -> bool {
    nr_len(buf).is_ok()
}

/// The BSSID from the prefix.
pub fn nr_bssid(buf: &[u8]) -> Option<[u8; 6]> {
    if buf.len() < NR_PREFIX_LEN {
        return None;
    }
    let mut bssid = [0u8; 6];
    bssid.copy_from_slice(&buf[..6]);
    Some(bssid)
}

/// The operating class from the prefix.
pub fn nr_op_class(buf: &[u8]) -> Option<u8> {
    buf.get(NR_OFFSET_OP_CLASS).copied()
}

/// The channel number from the prefix.
pub fn nr_channel(buf: &[u8]) -> Option<u8> {
    buf.get(NR_OFFSET_CHANNEL).copied()
}

/// Upsert a subelement in the report's subelement list.
pub fn nr_set_subelement(buf: &mut [u8], subelement: u8, data: &[u8]) -> Result<(), ElementError> {
    if buf.len() < NR_PREFIX_LEN {
        return Err(ElementError::Malformed);
    }

    element::element_list_set(&mut buf[NR_PREFIX_LEN..], subelement, data)
}

// ─── Hex helpers ────────────────────────────────────────────────────────────

/// Decode a hex string (case-insensitive, even length) into bytes.
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, ElementError> {
    if hex.len() % 2 != 0 {
        return Err(ElementError::Malformed);
    }

    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).map_err(|_| ElementError::Malformed)?;
            u8::from_str_radix(s, 16).map_err(|_| ElementError::Malformed)
        })
        .collect()
}

/// Encode bytes as an uppercase hex string.
pub fn dump_hex(buf: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(buf.len() * 2);
    for b in buf {
        let _ = write!(out, "{b:02X}");
    }
    out
}
