//! Byte I/O primitives: fixed-width little-endian loads and the NNINT
//! (non-negative integer) variable-width codec used throughout the dictionary
//! and SFL framing (spec §3, §4.A).

use alloc::vec::Vec;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

use crate::error::BejError;

/// Reads a little-endian `u16` from the first 2 bytes of `buf`.
#[inline]
pub fn read_u16_le(buf: &[u8]) -> Result<u16, BejError> {
    if buf.len() < 2 {
        return Err(BejError::UnexpectedEof);
    }
    Ok(LittleEndian::read_u16(&buf[..2]))
}

/// Reads a little-endian `u32` from the first 4 bytes of `buf`.
#[inline]
pub fn read_u32_le(buf: &[u8]) -> Result<u32, BejError> {
    if buf.len() < 4 {
        return Err(BejError::UnexpectedEof);
    }
    Ok(LittleEndian::read_u32(&buf[..4]))
}

/// Reads an NNINT from the start of `data`.
///
/// Wire format: one length byte `L` (`1 <= L <= 8`), then `L` little-endian
/// payload bytes. Zero-length NNINTs (`L == 0`) are a protocol error.
/// Returns `(value, bytes_consumed)`.
#[inline]
pub fn read_nnint(data: &[u8]) -> Result<(u64, usize), BejError> {
    if data.is_empty() {
        return Err(BejError::UnexpectedEof);
    }
    let len = data[0] as usize;
    if len == 0 || len > 8 {
        return Err(BejError::InvalidNnint(data[0]));
    }
    if data.len() < 1 + len {
        return Err(BejError::UnexpectedEof);
    }
    let mut value: u64 = 0;
    for (i, byte) in data[1..1 + len].iter().enumerate() {
        value |= (*byte as u64) << (8 * i);
    }
    Ok((value, 1 + len))
}

/// Writes `v` as an NNINT and appends it to `buf`.
///
/// Zero is special-cased to `01 00` (a zero-length payload is not valid per
/// spec §3). Otherwise the minimal number of little-endian bytes needed to
/// hold `v` is used.
#[inline]
pub fn write_nnint(buf: &mut Vec<u8>, v: u64) {
    if v == 0 {
        buf.push(1);
        buf.push(0);
        return;
    }
    let n = minimal_unsigned_width(v);
    buf.push(n as u8);
    let bytes = v.to_le_bytes();
    buf.extend_from_slice(&bytes[..n]);
}

/// Smallest number of bytes `n` (`1..=8`) such that `v` fits in `n`
/// little-endian unsigned bytes.
fn minimal_unsigned_width(v: u64) -> usize {
    let bits = 64 - v.leading_zeros() as usize;
    core::cmp::max(1, (bits + 7) / 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn nnint_zero_round_trips_as_len_one() {
        let mut buf = Vec::new();
        write_nnint(&mut buf, 0);
        assert_eq!(buf, vec![1, 0]);
        let (v, consumed) = read_nnint(&buf).unwrap();
        assert_eq!(v, 0);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn nnint_minimal_width() {
        let mut buf = Vec::new();
        write_nnint(&mut buf, 255);
        assert_eq!(buf, vec![1, 255]);

        let mut buf = Vec::new();
        write_nnint(&mut buf, 256);
        assert_eq!(buf, vec![2, 0, 1]);

        let mut buf = Vec::new();
        write_nnint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], 8);
    }

    #[test]
    fn nnint_rejects_length_over_eight() {
        let data = [9u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_nnint(&data), Err(BejError::InvalidNnint(9)));
    }

    #[test]
    fn nnint_rejects_zero_length() {
        let data = [0u8];
        assert_eq!(read_nnint(&data), Err(BejError::InvalidNnint(0)));
    }

    #[test]
    fn nnint_rejects_short_read() {
        let data = [3u8, 1, 2];
        assert_eq!(read_nnint(&data), Err(BejError::UnexpectedEof));
    }
}
