//! The streaming BEJ-to-JSON decoder (spec §4.E).

use alloc::string::String;
use alloc::vec::Vec;

use crate::byteio::read_nnint;
use crate::dictionary::{Dictionary, Entry, FormatCode, MAX_NESTING_DEPTH};
use crate::error::BejError;
use crate::frame::read_frame;

/// Decodes a full BEJ byte stream: consumes the 7-byte file header, reads
/// the outer SFL (must be `SET`), and decodes its payload using the
/// dictionary's root entry.
pub fn decode(
    data: &[u8],
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
) -> Result<serde_json::Value, BejError> {
    let rest = read_frame(data)?;
    let (sfl, body) = read_sfl(rest)?;
    if sfl.format != FormatCode::Set {
        log::error!("decode: outer SFL format is {:?}, expected SET", sfl.format);
        return Err(BejError::RootNotSet);
    }
    let root_entry = schema_dict.root()?;
    if body.len() != sfl.length {
        return Err(BejError::LengthOverrun {
            declared: sfl.length,
            available: body.len(),
        });
    }
    decode_set_payload(body, &root_entry, schema_dict, annot_dict, 0)
}

/// A decoded `(Sequence, Format, Length)` header: `sequence`/`selector` are
/// already split out of the raw wire NNINT.
struct Sfl {
    sequence: u16,
    selector: u8,
    format: FormatCode,
    bej_flags: u8,
    length: usize,
}

/// Reads one SFL tuple from the start of `data`. Returns the tuple and the
/// remaining bytes after its header (the payload is the front of that
/// remainder, `length` bytes long).
fn read_sfl(data: &[u8]) -> Result<(Sfl, &[u8]), BejError> {
    let (seq_raw, n1) = read_nnint(data)?;
    let rest = &data[n1..];
    if rest.is_empty() {
        return Err(BejError::UnexpectedEof);
    }
    let format_byte = rest[0];
    let format = FormatCode::try_from(format_byte >> 4)
        .map_err(|_| BejError::InvalidFormatCode(format_byte >> 4))?;
    let bej_flags = format_byte & 0x0F;
    let rest = &rest[1..];
    let (len_raw, n2) = read_nnint(rest)?;
    let rest = &rest[n2..];

    let selector = (seq_raw & 1) as u8;
    let sequence = (seq_raw >> 1) as u16;

    Ok((
        Sfl {
            sequence,
            selector,
            format,
            bej_flags,
            length: len_raw as usize,
        },
        rest,
    ))
}

/// Reads one SFL tuple without requiring a known format code: returns the
/// raw format nibble instead of erroring, so callers can apply the
/// unknown-format skip rule (spec §4.E).
struct RawSfl {
    sequence: u16,
    selector: u8,
    format_nibble: u8,
    length: usize,
}

fn read_raw_sfl(data: &[u8]) -> Result<(RawSfl, &[u8]), BejError> {
    let (seq_raw, n1) = read_nnint(data)?;
    let rest = &data[n1..];
    if rest.is_empty() {
        return Err(BejError::UnexpectedEof);
    }
    let format_byte = rest[0];
    let rest = &rest[1..];
    let (len_raw, n2) = read_nnint(rest)?;
    let rest = &rest[n2..];

    Ok((
        RawSfl {
            sequence: (seq_raw >> 1) as u16,
            selector: (seq_raw & 1) as u8,
            format_nibble: format_byte >> 4,
            length: len_raw as usize,
        },
        rest,
    ))
}

fn dict_for<'d>(
    selector: u8,
    schema_dict: &'d Dictionary,
    annot_dict: Option<&'d Dictionary>,
) -> Result<&'d Dictionary, BejError> {
    if selector == 1 {
        annot_dict.ok_or(BejError::NameNotFound)
    } else {
        Ok(schema_dict)
    }
}

/// Decodes a SET payload: NNINT property count, then that many SFL+entry
/// pairs, each becoming a JSON object key/value.
fn decode_set_payload(
    body: &[u8],
    parent: &Entry,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<serde_json::Value, BejError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BejError::ExceededMaxDepth(depth));
    }

    let (count, n) = read_nnint(body)?;
    let mut cursor = &body[n..];
    let mut map = serde_json::Map::new();

    for _ in 0..count {
        let (raw, after_header) = read_raw_sfl(cursor)?;
        if after_header.len() < raw.length {
            return Err(BejError::LengthOverrun {
                declared: raw.length,
                available: after_header.len(),
            });
        }
        let payload = &after_header[..raw.length];
        cursor = &after_header[raw.length..];

        let entry = if raw.selector == 1 {
            let dict = dict_for(1, schema_dict, annot_dict)?;
            dict.find_by_sequence(
                crate::dictionary::HEADER_SIZE as u16,
                crate::dictionary::UNBOUNDED_COUNT,
                raw.sequence,
            )?
            .ok_or(BejError::SequenceNotFound {
                sequence: raw.sequence,
                selector: raw.selector,
            })?
        } else {
            schema_dict
                .find_by_sequence(parent.child_pointer, parent.child_count, raw.sequence)?
                .ok_or(BejError::SequenceNotFound {
                    sequence: raw.sequence,
                    selector: raw.selector,
                })?
        };

        let key = entry
            .name(dict_for(raw.selector, schema_dict, annot_dict)?)
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .ok_or(BejError::NameNotFound)?;

        let entry_dict = dict_for(raw.selector, schema_dict, annot_dict)?;
        let value = decode_value(
            payload,
            &entry,
            entry_dict,
            raw.format_nibble,
            schema_dict,
            annot_dict,
            depth + 1,
        )?;
        if let Some(value) = value {
            map.insert(key, value);
        }
    }

    if !cursor.is_empty() {
        return Err(BejError::TrailingData(cursor.len()));
    }

    Ok(serde_json::Value::Object(map))
}

/// Decodes one value's payload, dispatching by the wire format nibble.
/// `entry_dict` is the dictionary `entry` itself was resolved from — the
/// one its own `child_pointer`/`child_count` point into, used for ENUM and
/// ARRAY structural children (as opposed to the per-key `@`-prefix routing
/// used for object properties). Recognized-but-unsupported codes are a
/// hard error; genuinely unknown codes are skipped and return `None`
/// (spec §4.E, §1 Non-goals).
fn decode_value(
    payload: &[u8],
    entry: &Entry,
    entry_dict: &Dictionary,
    format_nibble: u8,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<Option<serde_json::Value>, BejError> {
    let format = match FormatCode::try_from(format_nibble) {
        Ok(f) => f,
        Err(()) => {
            log::debug!("decode: skipping unknown format code {}", format_nibble);
            return Ok(None);
        }
    };

    let value = match format {
        FormatCode::Set => decode_set_payload(payload, entry, schema_dict, annot_dict, depth)?,
        FormatCode::Array => {
            decode_array_payload(payload, entry, entry_dict, schema_dict, annot_dict, depth)?
        }
        FormatCode::Integer => decode_integer_payload(payload)?,
        FormatCode::String => decode_string_payload(payload)?,
        FormatCode::Boolean => decode_boolean_payload(payload)?,
        FormatCode::Enum => decode_enum_payload(payload, entry, entry_dict)?,
        FormatCode::Null => serde_json::Value::Null,
        FormatCode::Real | FormatCode::PropertyAnnotation | FormatCode::ResourceLink => {
            log::warn!("decode: recognized but unsupported format code {:?}", format);
            return Err(BejError::UnsupportedFormat(format.as_err()));
        }
    };
    Ok(Some(value))
}

/// `ARRAY` payload: NNINT element count; each element decoded against the
/// sole element archetype, its own SFL sequence ignored (spec §4.E).
/// `array_entry_dict` is the dictionary `array_entry` itself (and therefore
/// its archetype child) was resolved from.
fn decode_array_payload(
    body: &[u8],
    array_entry: &Entry,
    array_entry_dict: &Dictionary,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<serde_json::Value, BejError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BejError::ExceededMaxDepth(depth));
    }
    let archetype = array_entry.array_archetype(array_entry_dict)?;

    let (count, n) = read_nnint(body)?;
    let mut cursor = &body[n..];
    let mut out = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let (raw, after_header) = read_raw_sfl(cursor)?;
        if after_header.len() < raw.length {
            return Err(BejError::LengthOverrun {
                declared: raw.length,
                available: after_header.len(),
            });
        }
        let payload = &after_header[..raw.length];
        cursor = &after_header[raw.length..];

        let value = decode_value(
            payload,
            &archetype,
            array_entry_dict,
            raw.format_nibble,
            schema_dict,
            annot_dict,
            depth + 1,
        )?;
        out.push(value.unwrap_or(serde_json::Value::Null));
    }

    if !cursor.is_empty() {
        return Err(BejError::TrailingData(cursor.len()));
    }

    Ok(serde_json::Value::Array(out))
}

/// `INTEGER` payload: NNINT width, `width` little-endian bytes, sign-extend
/// from bit `width*8 - 1` to 64 bits.
fn decode_integer_payload(body: &[u8]) -> Result<serde_json::Value, BejError> {
    let (width, n) = read_nnint(body)?;
    let width = width as usize;
    if width == 0 || width > 8 {
        return Err(BejError::InvalidNnint(width as u8));
    }
    if body.len() < n + width {
        return Err(BejError::UnexpectedEof);
    }
    let bytes = &body[n..n + width];
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(bytes);
    let sign_byte = bytes[width - 1];
    if sign_byte & 0x80 != 0 {
        for b in buf[width..].iter_mut() {
            *b = 0xFF;
        }
    }
    let value = i64::from_le_bytes(buf);
    Ok(serde_json::Value::Number(value.into()))
}

/// `STRING` payload: NNINT length (including NUL), bytes minus the
/// trailing NUL.
fn decode_string_payload(body: &[u8]) -> Result<serde_json::Value, BejError> {
    let (len, n) = read_nnint(body)?;
    let len = len as usize;
    if len == 0 {
        return Err(BejError::UnexpectedEof);
    }
    if body.len() < n + len {
        return Err(BejError::UnexpectedEof);
    }
    let raw = &body[n..n + len - 1];
    let s = String::from_utf8_lossy(raw).into_owned();
    Ok(serde_json::Value::String(s))
}

/// `BOOLEAN` payload: NNINT(1), one byte.
fn decode_boolean_payload(body: &[u8]) -> Result<serde_json::Value, BejError> {
    let (len, n) = read_nnint(body)?;
    if len != 1 {
        return Err(BejError::LengthOverrun {
            declared: len as usize,
            available: body.len(),
        });
    }
    if body.len() < n + 1 {
        return Err(BejError::UnexpectedEof);
    }
    Ok(serde_json::Value::Bool(body[n] != 0))
}

/// `ENUM` payload: NNINT width, then `width` raw little-endian bytes
/// holding the sequence number directly (mirroring `INTEGER`'s framing,
/// not a second length-prefixed NNINT) — looks up the matching child by
/// sequence, emits its name.
fn decode_enum_payload(
    body: &[u8],
    entry: &Entry,
    dict: &Dictionary,
) -> Result<serde_json::Value, BejError> {
    let (width, n) = read_nnint(body)?;
    let width = width as usize;
    if width == 0 || width > 2 {
        return Err(BejError::InvalidNnint(width as u8));
    }
    if body.len() < n + width {
        return Err(BejError::UnexpectedEof);
    }
    let mut buf = [0u8; 2];
    buf[..width].copy_from_slice(&body[n..n + width]);
    let seq = u16::from_le_bytes(buf);

    let child = dict
        .find_by_sequence(entry.child_pointer, entry.child_count, seq)?
        .ok_or(BejError::UnknownEnumValue(seq))?;
    let name = child.name(dict).ok_or(BejError::UnknownEnumName)?;
    Ok(serde_json::Value::String(String::from_utf8_lossy(name).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{ENTRY_SIZE, HEADER_SIZE};
    use crate::frame::write_frame;
    use alloc::vec;
    use byteorder::{ByteOrder, LittleEndian};

    fn push_entry(
        buf: &mut Vec<u8>,
        fmt: u8,
        seq: u16,
        child_ptr: u16,
        child_cnt: u16,
        name_len: u8,
        name_offset: u16,
    ) {
        let mut e = [0u8; ENTRY_SIZE];
        e[0] = fmt << 4;
        LittleEndian::write_u16(&mut e[1..3], seq);
        LittleEndian::write_u16(&mut e[3..5], child_ptr);
        LittleEndian::write_u16(&mut e[5..7], child_cnt);
        e[7] = name_len;
        LittleEndian::write_u16(&mut e[8..10], name_offset);
        buf.extend_from_slice(&e);
    }

    fn empty_schema() -> Dictionary {
        let mut buf = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut buf[2..4], 1);
        push_entry(&mut buf, 0, 0, 0, 0, 0, 0xFFFF);
        LittleEndian::write_u32(&mut buf[4..8], buf.len() as u32);
        Dictionary::from_bytes(buf).unwrap()
    }

    /// Builds `SFL(sequence=0, selector=0, format, bej_flags=0) || payload`.
    fn sfl(format_nibble: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        crate::byteio::write_nnint(&mut out, 0); // sequence 0, selector 0
        out.push(format_nibble << 4);
        crate::byteio::write_nnint(&mut out, payload.len() as u64);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn s1_empty_object_round_trips() {
        let dict = empty_schema();
        let mut wire = Vec::new();
        write_frame(&mut wire);
        let mut count_payload = Vec::new();
        crate::byteio::write_nnint(&mut count_payload, 0); // property count 0
        wire.extend_from_slice(&sfl(0, &count_payload));
        let out = decode(&wire, &dict, None).unwrap();
        assert_eq!(out, serde_json::json!({}));
    }

    #[test]
    fn rejects_non_set_outer_format() {
        let dict = empty_schema();
        let mut wire = Vec::new();
        write_frame(&mut wire);
        wire.extend_from_slice(&sfl(3, &[])); // claims INTEGER
        assert_eq!(decode(&wire, &dict, None), Err(BejError::RootNotSet));
    }

    #[test]
    fn unknown_format_code_is_skipped() {
        let mut schema_buf = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut schema_buf[2..4], 2);
        let child_offset = HEADER_SIZE + ENTRY_SIZE;
        push_entry(&mut schema_buf, 0, 0, child_offset as u16, 1, 0, 0xFFFF);
        let name_offset = child_offset + ENTRY_SIZE;
        push_entry(&mut schema_buf, 9, 0, 0, 0, 2, name_offset as u16); // nibble 9: unknown
        schema_buf.extend_from_slice(b"X\0");
        LittleEndian::write_u32(&mut schema_buf[4..8], schema_buf.len() as u32);
        let dict = Dictionary::from_bytes(schema_buf).unwrap();

        // inner property: SFL(seq 0, fmt nibble 9, len 2), 2 arbitrary bytes
        let inner_property = sfl(9, &[0xAA, 0xBB]);
        let mut inner_payload = Vec::new();
        crate::byteio::write_nnint(&mut inner_payload, 1); // property count 1
        inner_payload.extend_from_slice(&inner_property);

        let mut wire = Vec::new();
        write_frame(&mut wire);
        wire.extend_from_slice(&sfl(0, &inner_payload));
        let out = decode(&wire, &dict, None).unwrap();
        assert_eq!(out, serde_json::json!({}));
    }

    #[test]
    fn integer_sign_extends() {
        // width 1, byte 0xFF -> -1
        let mut body = Vec::new();
        crate::byteio::write_nnint(&mut body, 1);
        body.push(0xFF);
        let v = decode_integer_payload(&body).unwrap();
        assert_eq!(v, serde_json::json!(-1));

        let mut body_pos = Vec::new();
        crate::byteio::write_nnint(&mut body_pos, 1);
        body_pos.push(0x7F);
        let v2 = decode_integer_payload(&body_pos).unwrap();
        assert_eq!(v2, serde_json::json!(127));
    }

    #[test]
    fn string_strips_nul() {
        let mut body = Vec::new();
        crate::byteio::write_nnint(&mut body, 2); // strlen+1 = 2 ("a\0")
        body.extend_from_slice(b"a\0");
        let v = decode_string_payload(&body).unwrap();
        assert_eq!(v, serde_json::json!("a"));
    }
}
