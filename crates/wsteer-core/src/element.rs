//! # Tagged Element Lists
//!
//! 802.11 information elements packed back-to-back in a fixed-size
//! buffer: 1-byte type, 1-byte length, `length` bytes of payload.
//!
//! ```text
//! +------+--------+----------------+------+--------+-----//-----+ 0 0 0
//! | type | length |    payload     | type | length |  payload   | (tail)
//! +------+--------+----------------+------+--------+-----//-----+
//! ```
//!
//! Lists are edited in place. Every byte past the last element up to the
//! end of the buffer must be zero; all mutators preserve that invariant,
//! so repeated edits yield identical bytes regardless of how much slack
//! the buffer carries.

/// Bytes occupied by an element header (type + length).
pub const ELEMENT_HEADER_LEN: usize = 2;

/// Errors raised by element-list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ElementError {
    /// The buffer does not hold a valid zero-tailed element list.
    #[error("malformed element list")]
    Malformed,
    /// The element does not fit in the remaining buffer space.
    #[error("no space left in element list buffer")]
    NoSpace,
    /// Element payloads are limited to 255 bytes by the length octet.
    #[error("element payload too long")]
    PayloadTooLong,
}

fn all_zero(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Total length (header + payload) of the element at `offset`.
/// Only meaningful when [`element_valid`] holds.
fn element_total_len(buf: &[u8], offset: usize) -> usize {
    ELEMENT_HEADER_LEN + buf[offset + 1] as usize
}

/// Whether `offset` points at a well-formed element: the header is in
/// bounds, the length is nonzero, and the payload lies within `buf`.
pub fn element_valid(buf: &[u8], offset: usize) -> bool {
    if offset + ELEMENT_HEADER_LEN > buf.len() {
        return false;
    }
    let len = buf[offset + 1] as usize;
    len > 0 && offset + ELEMENT_HEADER_LEN + len <= buf.len()
}

/// Length of the valid element-list prefix of `buf`.
///
/// Requires every byte beyond the last element to be zero; a wholly-zero
/// buffer is an empty list of length 0.
pub fn element_list_len(buf: &[u8]) -> Result<usize, ElementError> {
    if all_zero(buf) {
        return Ok(0);
    }

    if !element_valid(buf, 0) {
        return Err(ElementError::Malformed);
    }

    let mut pos = 0;
    loop {
        let next = pos + element_total_len(buf, pos);
        if element_valid(buf, next) {
            pos = next;
        } else {
            break;
        }
    }

    let end = pos + element_total_len(buf, pos);
    if end < buf.len() && !all_zero(&buf[end..]) {
        return Err(ElementError::Malformed);
    }

    Ok(end)
}

/// Whether `buf` holds a valid element list (possibly empty).
pub fn element_list_valid(buf: &[u8]) -> bool {
    element_list_len(buf).is_ok()
}

/// Offset of the first element of type `element_type`, if present.
pub fn element_list_find(buf: &[u8], element_type: u8) -> Option<usize> {
    let list_len = element_list_len(buf).ok()?;

    let mut pos = 0;
    while pos < list_len {
        if buf[pos] == element_type {
            return Some(pos);
        }
        pos += element_total_len(buf, pos);
    }

    None
}

/// Payload of the first element of type `element_type`, if present.
pub fn element_list_get(buf: &[u8], element_type: u8) -> Option<&[u8]> {
    let offset = element_list_find(buf, element_type)?;
    let len = buf[offset + 1] as usize;
    Some(&buf[offset + ELEMENT_HEADER_LEN..offset + ELEMENT_HEADER_LEN + len])
}

/// Remove the element at `offset`: shift the rest of the buffer down and
/// zero the freed tail.
fn element_remove_at(buf: &mut [u8], offset: usize) {
    let total = element_total_len(buf, offset);
    let buf_len = buf.len();

    buf.copy_within(offset + total.., offset);
    buf[buf_len - total..].fill(0);
}

/// Idempotent upsert of an element.
///
/// An existing element of the same type is removed first (tail shifted
/// down, freed bytes zeroed); the new element is then appended at the
/// end-of-list position. Fails without mutating if the resulting list
/// would exceed the buffer.
pub fn element_list_set(buf: &mut [u8], element_type: u8, data: &[u8]) -> Result<(), ElementError> {
    if data.len() > u8::MAX as usize {
        return Err(ElementError::PayloadTooLong);
    }

    let list_len = element_list_len(buf)?;

    if let Some(offset) = element_list_find(buf, element_type) {
        let old_len = buf[offset + 1] as usize;
        if old_len < data.len() && buf.len() - list_len + old_len < data.len() {
            return Err(ElementError::NoSpace);
        }
        element_remove_at(buf, offset);
    }

    let list_len = element_list_len(buf)?;
    if list_len + ELEMENT_HEADER_LEN + data.len() > buf.len() {
        return Err(ElementError::NoSpace);
    }

    buf[list_len] = element_type;
    buf[list_len + 1] = data.len() as u8;
    buf[list_len + ELEMENT_HEADER_LEN..list_len + ELEMENT_HEADER_LEN + data.len()]
        .copy_from_slice(data);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_empty_list() {
        let buf = [0u8; 16];
        assert_eq!(element_list_len(&buf), Ok(0));
        assert!(element_list_valid(&buf));
    }

    #[test]
    fn single_element_length() {
        let mut buf = [0u8; 16];
        buf[..4].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb]);
        assert_eq!(element_list_len(&buf), Ok(4));
    }

    #[test]
    fn list_exactly_filling_buffer() {
        let buf = [0x01, 0x02, 0xaa, 0xbb, 0x03, 0x02, 0xcc, 0xdd];
        assert_eq!(element_list_len(&buf), Ok(8));
    }

    #[test]
    fn nonzero_tail_is_malformed() {
        let mut buf = [0u8; 16];
        buf[..4].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb]);
        buf[10] = 0x55;
        assert_eq!(element_list_len(&buf), Err(ElementError::Malformed));
    }

    #[test]
    fn truncated_element_is_malformed() {
        // Claims 4 payload bytes, buffer ends after 2.
        let buf = [0x01, 0x04, 0xaa, 0xbb];
        assert_eq!(element_list_len(&buf), Err(ElementError::Malformed));
    }

    #[test]
    fn find_and_get() {
        let mut buf = [0u8; 16];
        buf[..7].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb, 0x03, 0x01, 0x05]);
        assert_eq!(element_list_find(&buf, 0x03), Some(4));
        assert_eq!(element_list_get(&buf, 0x01), Some(&[0xaa, 0xbb][..]));
        assert_eq!(element_list_get(&buf, 0x07), None);
    }

    #[test]
    fn set_appends_to_empty_list() {
        let mut buf = [0u8; 16];
        element_list_set(&mut buf, 0x03, &[0x42]).unwrap();
        assert_eq!(&buf[..3], &[0x03, 0x01, 0x42]);
        assert_eq!(element_list_len(&buf), Ok(3));
    }

    #[test]
    fn set_moves_existing_element_to_tail() {
        // Types 1 and 3 present, re-set type 1 with a new payload.
        // Type 3 shifts forward; type 1 is re-appended at the tail.
        let mut buf = [0u8; 32];
        buf[..7].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb, 0x03, 0x01, 0x05]);

        element_list_set(&mut buf, 0x01, &[0xcc, 0xdd, 0xee]).unwrap();

        assert_eq!(&buf[..8], &[0x03, 0x01, 0x05, 0x01, 0x03, 0xcc, 0xdd, 0xee]);
        assert_eq!(element_list_len(&buf), Ok(8));
        assert!(all_zero(&buf[8..]));
    }

    #[test]
    fn set_is_idempotent() {
        let mut buf_a = [0u8; 32];
        buf_a[..7].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb, 0x03, 0x01, 0x05]);
        let mut buf_b = buf_a;

        element_list_set(&mut buf_a, 0x01, &[0xcc, 0xdd]).unwrap();
        element_list_set(&mut buf_b, 0x01, &[0xcc, 0xdd]).unwrap();
        element_list_set(&mut buf_b, 0x01, &[0xcc, 0xdd]).unwrap();

        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn set_rejects_overflow_without_mutation() {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&[0x01, 0x02, 0xaa, 0xbb]);
        let before = buf;

        assert_eq!(
            element_list_set(&mut buf, 0x02, &[0; 6]),
            Err(ElementError::NoSpace)
        );
        assert_eq!(buf, before);
    }

    #[test]
    fn set_reuses_space_of_replaced_element() {
        // Buffer is full; replacing the only element with an
        // equally-sized payload must still succeed.
        let mut buf = [0x01, 0x04, 0x01, 0x02, 0x03, 0x04];
        element_list_set(&mut buf, 0x01, &[0x09, 0x08, 0x07, 0x06]).unwrap();
        assert_eq!(buf, [0x01, 0x04, 0x09, 0x08, 0x07, 0x06]);
    }

    #[test]
    fn set_rejects_growth_beyond_freed_space() {
        let mut buf = [0x01, 0x02, 0xaa, 0xbb, 0x02, 0x02, 0xcc, 0xdd];
        assert_eq!(
            element_list_set(&mut buf, 0x01, &[0; 3]),
            Err(ElementError::NoSpace)
        );
    }
}
