//! Self-describing primitive value codec.
//!
//! Used for message properties and stream-message bodies. A byte prefix
//! selects the type; maps and lists nest recursively. This module also
//! implements the JMS property conversion matrix referenced by testable
//! property 10, ported from `PrimitiveValueConverter` in the original C++
//! client.

use std::collections::HashMap;

use crate::codec::errors::CodecError;

/// Type tags for the primitive wire format (§4.C).
mod tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const BYTE: u8 = 2;
    pub const CHAR: u8 = 3;
    pub const SHORT: u8 = 4;
    pub const INT: u8 = 5;
    pub const LONG: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const FLOAT: u8 = 8;
    pub const SHORT_STRING: u8 = 9;
    pub const BIG_STRING: u8 = 10;
    pub const BYTE_ARRAY: u8 = 11;
    pub const MAP: u8 = 12;
    pub const LIST: u8 = 13;
    pub const BIG_STRING_ALIAS: u8 = 14;
}

/// A self-describing primitive value, as carried in a [`PrimitiveMap`] or
/// [`PrimitiveList`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Double(f64),
    Float(f32),
    String(String),
    ByteArray(Vec<u8>),
    Map(PrimitiveMap),
    List(PrimitiveList),
}

pub type PrimitiveMap = HashMap<String, PrimitiveValue>;
pub type PrimitiveList = Vec<PrimitiveValue>;

/// Write one tagged value to `out`.
pub fn write_value(out: &mut Vec<u8>, value: &PrimitiveValue) -> Result<(), CodecError> {
    match value {
        PrimitiveValue::Null => out.push(tag::NULL),
        PrimitiveValue::Boolean(b) => {
            out.push(tag::BOOLEAN);
            out.push(u8::from(*b));
        }
        PrimitiveValue::Byte(v) => {
            out.push(tag::BYTE);
            out.push(v.to_be_bytes()[0]);
        }
        PrimitiveValue::Char(v) => {
            out.push(tag::CHAR);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::Short(v) => {
            out.push(tag::SHORT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::Int(v) => {
            out.push(tag::INT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::Long(v) => {
            out.push(tag::LONG);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::Double(v) => {
            out.push(tag::DOUBLE);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::Float(v) => {
            out.push(tag::FLOAT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        PrimitiveValue::String(s) => write_string(out, s)?,
        PrimitiveValue::ByteArray(bytes) => {
            out.push(tag::BYTE_ARRAY);
            let len = u32::try_from(bytes.len()).map_err(|_| CodecError::OversizedFrame)?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(bytes);
        }
        PrimitiveValue::Map(map) => {
            out.push(tag::MAP);
            write_map(out, map)?;
        }
        PrimitiveValue::List(list) => {
            out.push(tag::LIST);
            write_list(out, list)?;
        }
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() <= u16::MAX as usize {
        out.push(tag::SHORT_STRING);
        #[allow(clippy::cast_possible_truncation, reason = "length checked above")]
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    } else {
        out.push(tag::BIG_STRING);
        let len = u32::try_from(bytes.len()).map_err(|_| CodecError::OversizedFrame)?;
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend_from_slice(bytes);
    Ok(())
}

/// Encode a map as `u32 entry_count` followed by (short-string key, tagged
/// value)* pairs.
pub fn write_map(out: &mut Vec<u8>, map: &PrimitiveMap) -> Result<(), CodecError> {
    let count = u32::try_from(map.len()).map_err(|_| CodecError::OversizedFrame)?;
    out.extend_from_slice(&count.to_be_bytes());
    for (key, value) in map {
        write_string(out, key)?;
        write_value(out, value)?;
    }
    Ok(())
}

/// Encode a list as `u32 item_count` followed by tagged values.
pub fn write_list(out: &mut Vec<u8>, list: &PrimitiveList) -> Result<(), CodecError> {
    let count = u32::try_from(list.len()).map_err(|_| CodecError::OversizedFrame)?;
    out.extend_from_slice(&count.to_be_bytes());
    for value in list {
        write_value(out, value)?;
    }
    Ok(())
}

/// A byte cursor used when reading the primitive codec. Kept private to this
/// module; the wire-format codec drives reads through [`read_value`] only.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> { Ok(self.take(1)?[0]) }

    fn take_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Read one tagged value, returning the value and the number of bytes
/// consumed from `buf`.
pub fn read_value(buf: &[u8]) -> Result<(PrimitiveValue, usize), CodecError> {
    let mut cur = Cursor::new(buf);
    let value = read_value_cursor(&mut cur)?;
    Ok((value, cur.pos))
}

fn read_value_cursor(cur: &mut Cursor<'_>) -> Result<PrimitiveValue, CodecError> {
    let tag = cur.take_u8()?;
    Ok(match tag {
        tag::NULL => PrimitiveValue::Null,
        tag::BOOLEAN => PrimitiveValue::Boolean(cur.take_u8()? != 0),
        tag::BYTE => PrimitiveValue::Byte(cur.take_u8()? as i8),
        tag::CHAR => PrimitiveValue::Char(cur.take_u16()?),
        tag::SHORT => PrimitiveValue::Short(cur.take_u16()? as i16),
        tag::INT => PrimitiveValue::Int(cur.take_u32()? as i32),
        tag::LONG => {
            let hi = cur.take_u32()?;
            let lo = cur.take_u32()?;
            PrimitiveValue::Long((i64::from(hi) << 32) | i64::from(lo))
        }
        tag::DOUBLE => {
            let hi = cur.take_u32()?;
            let lo = cur.take_u32()?;
            let bits = (u64::from(hi) << 32) | u64::from(lo);
            PrimitiveValue::Double(f64::from_bits(bits))
        }
        tag::FLOAT => PrimitiveValue::Float(f32::from_bits(cur.take_u32()?)),
        tag::SHORT_STRING => {
            let len = cur.take_u16()? as usize;
            let bytes = cur.take(len)?;
            PrimitiveValue::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_owned(),
            )
        }
        tag::BIG_STRING | tag::BIG_STRING_ALIAS => {
            let len = cur.take_u32()? as usize;
            let bytes = cur.take(len)?;
            PrimitiveValue::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_owned(),
            )
        }
        tag::BYTE_ARRAY => {
            let len = cur.take_u32()? as usize;
            PrimitiveValue::ByteArray(cur.take(len)?.to_vec())
        }
        tag::MAP => PrimitiveValue::Map(read_map_cursor(cur)?),
        tag::LIST => PrimitiveValue::List(read_list_cursor(cur)?),
        other => return Err(CodecError::UnknownTypeTag(other)),
    })
}

fn read_short_string_cursor(cur: &mut Cursor<'_>) -> Result<String, CodecError> {
    let tag = cur.take_u8()?;
    if tag != tag::SHORT_STRING {
        return Err(CodecError::UnknownTypeTag(tag));
    }
    let len = cur.take_u16()? as usize;
    let bytes = cur.take(len)?;
    Ok(std::str::from_utf8(bytes)
        .map_err(|_| CodecError::InvalidUtf8)?
        .to_owned())
}

fn read_map_cursor(cur: &mut Cursor<'_>) -> Result<PrimitiveMap, CodecError> {
    let count = cur.take_u32()? as usize;
    let mut map = PrimitiveMap::with_capacity(count.min(4096));
    for _ in 0..count {
        let key = read_short_string_cursor(cur)?;
        let value = read_value_cursor(cur)?;
        map.insert(key, value);
    }
    Ok(map)
}

fn read_list_cursor(cur: &mut Cursor<'_>) -> Result<PrimitiveList, CodecError> {
    let count = cur.take_u32()? as usize;
    let mut list = PrimitiveList::with_capacity(count.min(4096));
    for _ in 0..count {
        list.push(read_value_cursor(cur)?);
    }
    Ok(list)
}

/// Decode a full map from a byte slice (used for marshalled message
/// properties).
pub fn decode_map(buf: &[u8]) -> Result<PrimitiveMap, CodecError> {
    let mut cur = Cursor::new(buf);
    read_map_cursor(&mut cur)
}

/// Decode a map from the start of `buf`, returning the map and the number of
/// bytes consumed. Lets callers that hold their own cursor over a larger
/// buffer (e.g. the wire-format codec reading a message's property map
/// inline) know where the map ends without double-parsing.
pub fn read_map(buf: &[u8]) -> Result<(PrimitiveMap, usize), CodecError> {
    let mut cur = Cursor::new(buf);
    let map = read_map_cursor(&mut cur)?;
    Ok((map, cur.pos))
}

/// Encode a full map to bytes.
#[must_use]
pub fn encode_map(map: &PrimitiveMap) -> Vec<u8> {
    let mut out = Vec::new();
    write_map(&mut out, map).expect("map sizes are bounded by u32 in practice");
    out
}

/// JMS property conversion matrix: widen numerics upward, allow bool<->string
/// and numeric<->string, keep byte arrays isolated, reject everything else.
pub fn convert_to_string(value: &PrimitiveValue) -> Result<String, CodecError> {
    Ok(match value {
        PrimitiveValue::Null => return Err(CodecError::UnsupportedConversion),
        PrimitiveValue::Boolean(b) => b.to_string(),
        PrimitiveValue::Byte(v) => v.to_string(),
        PrimitiveValue::Short(v) => v.to_string(),
        PrimitiveValue::Int(v) => v.to_string(),
        PrimitiveValue::Long(v) => v.to_string(),
        PrimitiveValue::Float(v) => v.to_string(),
        PrimitiveValue::Double(v) => v.to_string(),
        PrimitiveValue::Char(v) => char::from_u32(u32::from(*v)).unwrap_or('\u{FFFD}').to_string(),
        PrimitiveValue::String(s) => s.clone(),
        PrimitiveValue::ByteArray(_) | PrimitiveValue::Map(_) | PrimitiveValue::List(_) => {
            return Err(CodecError::UnsupportedConversion);
        }
    })
}

pub fn convert_to_bool(value: &PrimitiveValue) -> Result<bool, CodecError> {
    match value {
        PrimitiveValue::Boolean(b) => Ok(*b),
        PrimitiveValue::String(s) => Ok(s.eq_ignore_ascii_case("true")),
        _ => Err(CodecError::UnsupportedConversion),
    }
}

pub fn convert_to_long(value: &PrimitiveValue) -> Result<i64, CodecError> {
    match value {
        PrimitiveValue::Byte(v) => Ok(i64::from(*v)),
        PrimitiveValue::Short(v) => Ok(i64::from(*v)),
        PrimitiveValue::Int(v) => Ok(i64::from(*v)),
        PrimitiveValue::Long(v) => Ok(*v),
        PrimitiveValue::String(s) => s.parse().map_err(|_| CodecError::UnsupportedConversion),
        _ => Err(CodecError::UnsupportedConversion),
    }
}

pub fn convert_to_double(value: &PrimitiveValue) -> Result<f64, CodecError> {
    match value {
        PrimitiveValue::Float(v) => Ok(f64::from(*v)),
        PrimitiveValue::Double(v) => Ok(*v),
        PrimitiveValue::String(s) => s.parse().map_err(|_| CodecError::UnsupportedConversion),
        _ => Err(CodecError::UnsupportedConversion),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn roundtrip(value: PrimitiveValue) -> PrimitiveValue {
        let mut out = Vec::new();
        write_value(&mut out, &value).expect("encode");
        let (decoded, consumed) = read_value(&out).expect("decode");
        assert_eq!(consumed, out.len());
        decoded
    }

    #[rstest]
    #[case(PrimitiveValue::Null)]
    #[case(PrimitiveValue::Boolean(true))]
    #[case(PrimitiveValue::Byte(-5))]
    #[case(PrimitiveValue::Short(-1234))]
    #[case(PrimitiveValue::Int(123_456))]
    #[case(PrimitiveValue::Long(-9_000_000_000))]
    #[case(PrimitiveValue::Float(1.5))]
    #[case(PrimitiveValue::Double(-2.25))]
    #[case(PrimitiveValue::String("hello".into()))]
    #[case(PrimitiveValue::ByteArray(vec![1, 2, 3]))]
    fn primitive_round_trips(#[case] value: PrimitiveValue) {
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn map_round_trips_with_nesting() {
        let mut inner = PrimitiveMap::new();
        inner.insert("a".into(), PrimitiveValue::Int(1));
        let mut outer = PrimitiveMap::new();
        outer.insert("nested".into(), PrimitiveValue::Map(inner));
        outer.insert("list".into(), PrimitiveValue::List(vec![PrimitiveValue::Boolean(true)]));

        let bytes = encode_map(&outer);
        let decoded = decode_map(&bytes).expect("decode");
        assert_eq!(decoded, outer);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = read_value(&[250]).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTypeTag(250)));
    }

    #[test]
    fn truncated_value_is_rejected() {
        let err = read_value(&[tag::INT, 0, 0]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }

    #[rstest]
    #[case(PrimitiveValue::Boolean(true), "true")]
    #[case(PrimitiveValue::Int(42), "42")]
    fn string_conversion_matrix(#[case] value: PrimitiveValue, #[case] expected: &str) {
        assert_eq!(convert_to_string(&value).unwrap(), expected);
    }

    #[test]
    fn byte_array_conversion_is_rejected() {
        let err = convert_to_string(&PrimitiveValue::ByteArray(vec![1])).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedConversion));
    }

    #[test]
    fn numeric_widening_is_allowed() {
        assert_eq!(convert_to_long(&PrimitiveValue::Byte(5)).unwrap(), 5);
        assert_eq!(convert_to_double(&PrimitiveValue::Float(1.5)).unwrap(), 1.5);
    }
}
