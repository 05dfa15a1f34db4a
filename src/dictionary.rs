//! The packed binary dictionary: header, typed entries, and the entry cursor
//! used for both full walks and bounded child-subset walks (spec §3, §4.B).

use alloc::vec::Vec;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

use crate::byteio::{read_u16_le, read_u32_le};
use crate::error::{BejError, FormatCode as ErrFormatCode};

pub const HEADER_SIZE: usize = 12;
pub const ENTRY_SIZE: usize = 10;

/// Sentinel stored in an entry's `child_count` field meaning "this ARRAY
/// entry's single child (at `child_pointer`) is the element archetype" —
/// the count field is not a literal count in this case.
pub const ARRAY_ELEMENT_ARCHETYPE: u16 = 0xFFFF;

/// Sentinel passed to `EntryCursor` construction meaning "scan to the end
/// of the buffer" — used only for the annotation dictionary's global
/// sequence search (spec §4.B, §4.D, §4.E).
pub const UNBOUNDED_COUNT: u16 = 0xFFFF;

/// Recursion depth limit shared by the encoder and decoder (spec §9 Design
/// Notes; see DESIGN.md Open Question 2).
pub const MAX_NESTING_DEPTH: usize = 64;

/// BEJ format codes (spec §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum FormatCode {
    Set = 0,
    Array = 1,
    Null = 2,
    Integer = 3,
    Enum = 4,
    String = 5,
    Real = 6,
    Boolean = 7,
    PropertyAnnotation = 10,
    ResourceLink = 14,
}

impl FormatCode {
    pub fn as_err(self) -> ErrFormatCode {
        match self {
            Self::Set => ErrFormatCode::Set,
            Self::Array => ErrFormatCode::Array,
            Self::Null => ErrFormatCode::Null,
            Self::Integer => ErrFormatCode::Integer,
            Self::Enum => ErrFormatCode::Enum,
            Self::String => ErrFormatCode::String,
            Self::Real => ErrFormatCode::Real,
            Self::Boolean => ErrFormatCode::Boolean,
            Self::PropertyAnnotation => ErrFormatCode::PropertyAnnotation,
            Self::ResourceLink => ErrFormatCode::ResourceLink,
        }
    }
}

impl core::convert::TryFrom<u8> for FormatCode {
    type Error = ();
    fn try_from(nibble: u8) -> Result<Self, ()> {
        match nibble {
            0 => Ok(Self::Set),
            1 => Ok(Self::Array),
            2 => Ok(Self::Null),
            3 => Ok(Self::Integer),
            4 => Ok(Self::Enum),
            5 => Ok(Self::String),
            6 => Ok(Self::Real),
            7 => Ok(Self::Boolean),
            10 => Ok(Self::PropertyAnnotation),
            14 => Ok(Self::ResourceLink),
            _ => Err(()),
        }
    }
}

/// A single decoded dictionary entry. Owns no name bytes; `name_offset`
/// indexes into the owning `Dictionary`'s buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub format: FormatCode,
    /// Lower nibble of the entry's first byte (deferred-binding / nested
    /// top-level-annotation flags). Stored for fidelity; this codec does
    /// not interpret deferred bindings (spec §1 Non-goals).
    pub bej_flags: u8,
    pub sequence: u16,
    pub child_pointer: u16,
    /// Raw wire value: a literal count, 0 (no children), or the
    /// `ARRAY_ELEMENT_ARCHETYPE` sentinel.
    pub child_count: u16,
    pub name_len: u8,
    pub name_offset: u16,
}

impl Entry {
    /// Resolves this entry's name against `dict`'s name table, or `None`
    /// if the entry has no name (spec §4.B: "resolved lazily").
    pub fn name<'d>(&self, dict: &'d Dictionary) -> Option<&'d [u8]> {
        if self.name_len == 0 {
            return None;
        }
        let offset = self.name_offset as usize;
        if offset >= dict.buf.len() {
            return None;
        }
        // name_len counts the NUL terminator; the resolved name excludes it.
        let str_len = (self.name_len as usize).saturating_sub(1);
        let end = offset.checked_add(str_len)?;
        if end > dict.buf.len() {
            return None;
        }
        Some(&dict.buf[offset..end])
    }

    /// Fetches this ARRAY entry's sole element-archetype child.
    pub fn array_archetype(&self, dict: &Dictionary) -> Result<Entry, BejError> {
        if self.format != FormatCode::Array {
            return Err(BejError::MissingArchetype);
        }
        if self.child_count != ARRAY_ELEMENT_ARCHETYPE {
            return Err(BejError::MissingArchetype);
        }
        dict.entry_at(self.child_pointer as usize)
    }
}

/// An owned, loaded dictionary byte buffer. Immutable once built.
pub struct Dictionary {
    buf: Vec<u8>,
}

impl Dictionary {
    /// Validates and wraps a dictionary byte buffer (spec §4.B Loading).
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self, BejError> {
        if buf.len() < HEADER_SIZE {
            return Err(BejError::HeaderTooSmall);
        }
        let entry_count = read_u16_le(&buf[2..4])? as usize;
        if HEADER_SIZE + entry_count * ENTRY_SIZE > buf.len() {
            return Err(BejError::ChildRangeOutOfBounds);
        }
        Ok(Self { buf })
    }

    /// Loads a dictionary from a path. A `.map` extension is swapped for the
    /// sibling `.bin` file; any other extension is loaded verbatim (spec §4.B).
    #[cfg(feature = "std")]
    pub fn load_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, BejError> {
        let path = path.as_ref();
        let target = if path.extension().and_then(|e| e.to_str()) == Some("map") {
            path.with_extension("bin")
        } else {
            path.to_path_buf()
        };
        let bytes = std::fs::read(&target).map_err(|_| BejError::Io)?;
        Self::from_bytes(bytes)
    }

    pub fn version(&self) -> u8 {
        self.buf[0]
    }

    pub fn flags(&self) -> u8 {
        self.buf[1]
    }

    pub fn entry_count(&self) -> u16 {
        LittleEndian::read_u16(&self.buf[2..4])
    }

    pub fn total_size(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[4..8])
    }

    /// The root entry, at a fixed offset just past the header.
    pub fn root(&self) -> Result<Entry, BejError> {
        self.entry_at(HEADER_SIZE)
    }

    /// Decodes a single 10-byte entry at `offset`.
    pub fn entry_at(&self, offset: usize) -> Result<Entry, BejError> {
        if offset.checked_add(ENTRY_SIZE).ok_or(BejError::ChildRangeOutOfBounds)? > self.buf.len()
        {
            return Err(BejError::ChildRangeOutOfBounds);
        }
        let e = &self.buf[offset..offset + ENTRY_SIZE];
        let format_byte = e[0];
        let format = FormatCode::try_from(format_byte >> 4)
            .map_err(|_| BejError::InvalidFormatCode(format_byte >> 4))?;
        let bej_flags = format_byte & 0x0F;
        let sequence = read_u16_le(&e[1..3])?;
        let child_pointer = read_u16_le(&e[3..5])?;
        let child_count = read_u16_le(&e[5..7])?;
        let name_len = e[7];
        let name_offset = read_u16_le(&e[8..10])?;

        if child_count != 0 && child_count != ARRAY_ELEMENT_ARCHETYPE {
            let start = child_pointer as usize;
            let end = start
                .checked_add(child_count as usize * ENTRY_SIZE)
                .ok_or(BejError::ChildRangeOutOfBounds)?;
            // Entries must stay within the buffer and align to the entry
            // grid established at the root offset, matching how entries are
            // packed contiguously from offset 12.
            if end > self.buf.len() || start % ENTRY_SIZE != HEADER_SIZE % ENTRY_SIZE {
                return Err(BejError::ChildRangeOutOfBounds);
            }
        }

        Ok(Entry {
            format,
            bej_flags,
            sequence,
            child_pointer,
            child_count,
            name_len,
            name_offset,
        })
    }

    /// A cursor over the root only (the "full walk" start; callers follow
    /// child pointers themselves to see the rest of the table).
    pub fn cursor_root(&self) -> EntryCursor<'_> {
        EntryCursor {
            dict: self,
            byte_index: HEADER_SIZE,
            remaining: Some(1),
        }
    }

    /// A cursor over an explicit `(offset, count)` subset. `count ==
    /// UNBOUNDED_COUNT` scans until the end of the buffer.
    pub fn cursor_subset(&self, offset: u16, count: u16) -> EntryCursor<'_> {
        EntryCursor {
            dict: self,
            byte_index: offset as usize,
            remaining: if count == UNBOUNDED_COUNT {
                None
            } else {
                Some(count)
            },
        }
    }

    /// The cursor used to resolve annotation properties: starts at the
    /// first entry (offset 12) and scans unbounded, the way spec §4.D's
    /// encode rule ("annotation dictionary starting at offset 12 over its
    /// full entry range") and spec §4.E's decode rule ("search the
    /// annotation dictionary globally") both describe.
    pub fn annotation_scan_cursor(&self) -> EntryCursor<'_> {
        self.cursor_subset(HEADER_SIZE as u16, UNBOUNDED_COUNT)
    }

    /// Linear scan of `(offset, count)` for an entry with sequence `seq`.
    /// Linear is acceptable: child sets are small (spec §4.B).
    pub fn find_by_sequence(
        &self,
        offset: u16,
        count: u16,
        seq: u16,
    ) -> Result<Option<Entry>, BejError> {
        let mut cursor = self.cursor_subset(offset, count);
        while let Some(entry) = cursor.next()? {
            if entry.sequence == seq {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Linear scan of `(offset, count)` for an entry whose resolved name
    /// byte-equals `name`.
    pub fn find_by_name(
        &self,
        offset: u16,
        count: u16,
        name: &[u8],
    ) -> Result<Option<Entry>, BejError> {
        let mut cursor = self.cursor_subset(offset, count);
        while let Some(entry) = cursor.next()? {
            if entry.name(self) == Some(name) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

/// Carries `(buffer, byte_index, remaining_count)`; `remaining == None`
/// means unbounded (scan to end of buffer) (spec §4.B).
pub struct EntryCursor<'d> {
    dict: &'d Dictionary,
    byte_index: usize,
    remaining: Option<u16>,
}

impl<'d> EntryCursor<'d> {
    /// Returns the next entry, or `None` once the count is exhausted or the
    /// buffer runs out.
    pub fn next(&mut self) -> Result<Option<Entry>, BejError> {
        if let Some(0) = self.remaining {
            return Ok(None);
        }
        if self.byte_index + ENTRY_SIZE > self.dict.buf.len() {
            return Ok(None);
        }
        let entry = self.dict.entry_at(self.byte_index)?;
        self.byte_index += ENTRY_SIZE;
        if let Some(r) = self.remaining.as_mut() {
            *r -= 1;
        }
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    /// Builds a minimal dictionary: root SET entry with `children` as its
    /// direct (unnamed or named) children, laid out contiguously after the
    /// root. No name table (all entries nameless) unless `names` given.
    fn build_dict(children: &[(FormatCode, u16, u16, u16)], names: &[&str]) -> Vec<u8> {
        let entry_count = 1 + children.len();
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0] = 1; // version
        LittleEndian::write_u16(&mut buf[2..4], entry_count as u16);

        let children_offset = HEADER_SIZE + ENTRY_SIZE;
        // Root: SET, seq 0, child_pointer -> children_offset, child_count = children.len()
        push_entry(
            &mut buf,
            FormatCode::Set,
            0,
            children_offset as u16,
            children.len() as u16,
            0,
            0xFFFF,
        );

        let name_table_offset = children_offset + children.len() * ENTRY_SIZE;
        let mut name_table = Vec::new();
        for (i, (fmt, seq, child_ptr, child_cnt)) in children.iter().enumerate() {
            if let Some(name) = names.get(i) {
                let off = name_table_offset + name_table.len();
                name_table.extend_from_slice(name.as_bytes());
                name_table.push(0);
                push_entry(
                    &mut buf,
                    *fmt,
                    *seq,
                    *child_ptr,
                    *child_cnt,
                    (name.len() + 1) as u8,
                    off as u16,
                );
            } else {
                push_entry(&mut buf, *fmt, *seq, *child_ptr, *child_cnt, 0, 0xFFFF);
            }
        }
        buf.extend_from_slice(&name_table);
        let total_len = buf.len() as u32;
        LittleEndian::write_u32(&mut buf[4..8], total_len);
        buf
    }

    fn push_entry(
        buf: &mut Vec<u8>,
        fmt: FormatCode,
        seq: u16,
        child_ptr: u16,
        child_cnt: u16,
        name_len: u8,
        name_offset: u16,
    ) {
        let mut e = [0u8; ENTRY_SIZE];
        e[0] = (fmt as u8) << 4;
        LittleEndian::write_u16(&mut e[1..3], seq);
        LittleEndian::write_u16(&mut e[3..5], child_ptr);
        LittleEndian::write_u16(&mut e[5..7], child_cnt);
        e[7] = name_len;
        LittleEndian::write_u16(&mut e[8..10], name_offset);
        buf.extend_from_slice(&e);
    }

    #[test]
    fn root_entry_parses() {
        let bytes = build_dict(&[(FormatCode::Integer, 0, 0, 0)], &["X"]);
        let dict = Dictionary::from_bytes(bytes).unwrap();
        let root = dict.root().unwrap();
        assert_eq!(root.format, FormatCode::Set);
        assert_eq!(root.child_count, 1);
    }

    #[test]
    fn find_by_name_and_sequence() {
        let bytes = build_dict(&[(FormatCode::Integer, 5, 0, 0)], &["X"]);
        let dict = Dictionary::from_bytes(bytes).unwrap();
        let root = dict.root().unwrap();
        let found = dict
            .find_by_name(root.child_pointer, root.child_count, b"X")
            .unwrap()
            .unwrap();
        assert_eq!(found.sequence, 5);
        let found2 = dict
            .find_by_sequence(root.child_pointer, root.child_count, 5)
            .unwrap()
            .unwrap();
        assert_eq!(found2.name(&dict), Some(&b"X"[..]));
    }

    #[test]
    fn missing_name_returns_none() {
        let bytes = build_dict(&[(FormatCode::Integer, 5, 0, 0)], &["X"]);
        let dict = Dictionary::from_bytes(bytes).unwrap();
        let root = dict.root().unwrap();
        let found = dict
            .find_by_name(root.child_pointer, root.child_count, b"Y")
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn rejects_buffer_smaller_than_header() {
        let buf = vec![0u8; 4];
        assert_eq!(Dictionary::from_bytes(buf), Err(BejError::HeaderTooSmall));
    }

    #[test]
    fn rejects_entry_count_out_of_bounds() {
        let mut buf = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut buf[2..4], 5); // claims 5 entries but buffer is header-only
        assert_eq!(
            Dictionary::from_bytes(buf),
            Err(BejError::ChildRangeOutOfBounds)
        );
    }

    #[test]
    fn array_archetype_sentinel_resolves() {
        // Root's one child is an ARRAY whose own child (at a further offset)
        // is the STRING element archetype with the sentinel child_count.
        let entry_count = 3u16;
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0] = 1;
        LittleEndian::write_u16(&mut buf[2..4], entry_count);
        let array_offset = HEADER_SIZE + ENTRY_SIZE;
        let archetype_offset = array_offset + ENTRY_SIZE;
        push_entry(&mut buf, FormatCode::Set, 0, array_offset as u16, 1, 0, 0xFFFF);
        push_entry(
            &mut buf,
            FormatCode::Array,
            0,
            archetype_offset as u16,
            ARRAY_ELEMENT_ARCHETYPE,
            0,
            0xFFFF,
        );
        push_entry(&mut buf, FormatCode::String, 0, 0, 0, 0, 0xFFFF);
        LittleEndian::write_u32(&mut buf[4..8], buf.len() as u32);

        let dict = Dictionary::from_bytes(buf).unwrap();
        let root = dict.root().unwrap();
        let array_entry = dict.entry_at(root.child_pointer as usize).unwrap();
        let archetype = array_entry.array_archetype(&dict).unwrap();
        assert_eq!(archetype.format, FormatCode::String);
    }
}
