//! The recursive, schema-driven JSON-to-BEJ encoder (spec §4.D).

use alloc::vec::Vec;

use crate::byteio::write_nnint;
use crate::dictionary::{Dictionary, Entry, FormatCode, MAX_NESTING_DEPTH};
use crate::error::BejError;
use crate::frame::write_frame;

/// Selector bit for a property key: 0 = schema dictionary, 1 = annotation
/// dictionary (spec §3, §4.D "Selector on the wire").
fn selector_for_key(key: &str) -> u8 {
    if key.starts_with('@') {
        1
    } else {
        0
    }
}

/// Encodes `root` against `schema_dict` (and, if any annotation properties
/// are present, `annot_dict`) into a fresh byte buffer: 7-byte file header,
/// then the outer SFL (sequence 0, SET) wrapping the root object.
pub fn encode(
    root: &serde_json::Value,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
) -> Result<Vec<u8>, BejError> {
    let mut out = Vec::new();
    write_frame(&mut out);

    let root_entry = schema_dict.root()?;
    let obj = root.as_object().ok_or_else(|| {
        log::error!("encode: root JSON value is not an object");
        BejError::RootNotObject
    })?;

    let mut payload = Vec::new();
    encode_set_payload(&mut payload, obj, &root_entry, schema_dict, annot_dict, 0)?;

    write_sfl(&mut out, 0, 0, FormatCode::Set, 0, &payload);
    Ok(out)
}

/// Writes `SFL(sequence, selector, format, bej_flags, payload)`.
fn write_sfl(
    out: &mut Vec<u8>,
    sequence: u16,
    selector: u8,
    format: FormatCode,
    bej_flags: u8,
    payload: &[u8],
) {
    let seq_with_selector = ((sequence as u64) << 1) | (selector as u64 & 1);
    write_nnint(out, seq_with_selector);
    out.push(((format as u8) << 4) | (bej_flags & 0x0F));
    write_nnint(out, payload.len() as u64);
    out.extend_from_slice(payload);
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

/// Encodes a JSON object's properties against parent entry `parent` (spec
/// §4.D "Property enumeration").
fn encode_set_payload(
    out: &mut Vec<u8>,
    obj: &serde_json::Map<alloc::string::String, serde_json::Value>,
    parent: &Entry,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<(), BejError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BejError::ExceededMaxDepth(depth));
    }

    let mut resolved: Vec<(u8, Entry, &serde_json::Value)> = Vec::new();
    for (key, value) in obj.iter() {
        let selector = selector_for_key(key);
        let found = if selector == 1 {
            let dict = dict_for(selector, schema_dict, annot_dict)?;
            dict.find_by_name(
                crate::dictionary::HEADER_SIZE as u16,
                crate::dictionary::UNBOUNDED_COUNT,
                key.as_bytes(),
            )?
        } else {
            schema_dict.find_by_name(parent.child_pointer, parent.child_count, key.as_bytes())?
        };
        match found {
            Some(entry) => resolved.push((selector, entry, value)),
            None => {
                log::debug!("encode: skipping unresolved property {:?}", key);
            }
        }
    }

    write_nnint(out, resolved.len() as u64);
    for (selector, entry, value) in resolved {
        encode_value(out, &entry, selector, value, schema_dict, annot_dict, depth + 1)?;
    }
    Ok(())
}

/// Encodes one value against `entry`, dispatching by the entry's format code.
fn encode_value(
    out: &mut Vec<u8>,
    entry: &Entry,
    selector: u8,
    value: &serde_json::Value,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<(), BejError> {
    let mut payload = Vec::new();
    match entry.format {
        FormatCode::Set => {
            let obj = value
                .as_object()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            encode_set_payload(&mut payload, obj, entry, schema_dict, annot_dict, depth)?;
        }
        FormatCode::Array => {
            let arr = value
                .as_array()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            encode_array_payload(&mut payload, arr, entry, selector, schema_dict, annot_dict, depth)?;
        }
        FormatCode::Integer => {
            let n = value
                .as_f64()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            encode_integer_payload(&mut payload, n as i64);
        }
        FormatCode::String => {
            let s = value
                .as_str()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            encode_string_payload(&mut payload, s);
        }
        FormatCode::Boolean => {
            let b = value
                .as_bool()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            encode_boolean_payload(&mut payload, b);
        }
        FormatCode::Enum => {
            let s = value
                .as_str()
                .ok_or(BejError::TypeMismatch(entry.format.as_err()))?;
            let dict = dict_for(selector, schema_dict, annot_dict)?;
            encode_enum_payload(&mut payload, s, entry, dict)?;
        }
        FormatCode::Null => {
            if !value.is_null() {
                return Err(BejError::TypeMismatch(entry.format.as_err()));
            }
        }
        FormatCode::Real | FormatCode::PropertyAnnotation | FormatCode::ResourceLink => {
            return Err(BejError::UnsupportedFormat(entry.format.as_err()));
        }
    }
    write_sfl(out, entry.sequence, selector, entry.format, entry.bej_flags, &payload);
    Ok(())
}

/// `ARRAY` payload: NNINT element count, then each element under a
/// synthesized entry whose `sequence` is the element's zero-based index
/// (spec §4.D).
fn encode_array_payload(
    out: &mut Vec<u8>,
    arr: &[serde_json::Value],
    array_entry: &Entry,
    selector: u8,
    schema_dict: &Dictionary,
    annot_dict: Option<&Dictionary>,
    depth: usize,
) -> Result<(), BejError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BejError::ExceededMaxDepth(depth));
    }

    let dict = dict_for(selector, schema_dict, annot_dict)?;
    let archetype = array_entry.array_archetype(dict)?;

    write_nnint(out, arr.len() as u64);
    for (i, element) in arr.iter().enumerate() {
        let element_entry = Entry {
            sequence: i as u16,
            ..archetype
        };
        encode_value(out, &element_entry, selector, element, schema_dict, annot_dict, depth + 1)?;
    }
    Ok(())
}

/// `INTEGER` payload: minimal-width two's-complement packing (spec §4.D,
/// §9 "Signed integer packing").
fn encode_integer_payload(out: &mut Vec<u8>, n: i64) {
    let bytes = n.to_le_bytes();
    let width = pack_signed_minimal(&bytes);
    write_nnint(out, width as u64);
    out.extend_from_slice(&bytes[..width]);
}

/// Drops leading (high-order) bytes from an 8-byte little-endian two's
/// complement representation while they are a pure sign extension of the
/// next byte down, returning the retained width.
fn pack_signed_minimal(bytes: &[u8; 8]) -> usize {
    let mut width = 8;
    while width > 1 {
        let top = bytes[width - 1];
        let next = bytes[width - 2];
        let is_extension = (top == 0x00 && next & 0x80 == 0) || (top == 0xFF && next & 0x80 != 0);
        if !is_extension {
            break;
        }
        width -= 1;
    }
    width
}

/// `STRING` payload: NNINT of `strlen+1`, bytes, NUL terminator.
fn encode_string_payload(out: &mut Vec<u8>, s: &str) {
    write_nnint(out, s.len() as u64 + 1);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// `BOOLEAN` payload: NNINT(1), then `0x00`/`0x01`.
fn encode_boolean_payload(out: &mut Vec<u8>, b: bool) {
    write_nnint(out, 1);
    out.push(if b { 1 } else { 0 });
}

/// `ENUM` payload: find the child whose name matches `s`, emit NNINT(width)
/// then the sequence's minimal little-endian bytes.
fn encode_enum_payload(
    out: &mut Vec<u8>,
    s: &str,
    entry: &Entry,
    dict: &Dictionary,
) -> Result<(), BejError> {
    let child = dict
        .find_by_name(entry.child_pointer, entry.child_count, s.as_bytes())?
        .ok_or(BejError::UnknownEnumName)?;
    let seq_bytes = child.sequence.to_le_bytes();
    let width = if seq_bytes[1] == 0 { 1 } else { 2 };
    write_nnint(out, width as u64);
    out.extend_from_slice(&seq_bytes[..width]);
    Ok(())
}
