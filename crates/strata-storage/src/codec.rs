use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Streaming serializer for a single value type.
///
/// Index extensions supply externalizers for their key and value types; the
/// storage layer composes them into record and collection encodings without
/// knowing anything about the types themselves.
pub trait DataExternalizer<T>: Send + Sync {
    fn save(&self, out: &mut dyn Write, value: &T) -> io::Result<()>;
    fn read(&self, input: &mut dyn Read) -> io::Result<T>;
}

/// Writes `value` as a LEB128 varint.
pub fn write_varint(out: &mut dyn Write, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return out.write_all(&[byte]);
        }
        out.write_all(&[byte | 0x80])?;
    }
}

/// Reads a LEB128 varint written by [`write_varint`].
pub fn read_varint(input: &mut dyn Read) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        input.read_exact(&mut byte)?;
        if shift >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint exceeds 64 bits",
            ));
        }
        value |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct U32Externalizer;

impl DataExternalizer<u32> for U32Externalizer {
    fn save(&self, out: &mut dyn Write, value: &u32) -> io::Result<()> {
        out.write_u32::<LittleEndian>(*value)
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<u32> {
        input.read_u32::<LittleEndian>()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct I64Externalizer;

impl DataExternalizer<i64> for I64Externalizer {
    fn save(&self, out: &mut dyn Write, value: &i64) -> io::Result<()> {
        out.write_i64::<LittleEndian>(*value)
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<i64> {
        input.read_i64::<LittleEndian>()
    }
}

/// Varint length-prefixed UTF-8 string.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringExternalizer;

impl DataExternalizer<String> for StringExternalizer {
    fn save(&self, out: &mut dyn Write, value: &String) -> io::Result<()> {
        write_varint(out, value.len() as u64)?;
        out.write_all(value.as_bytes())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<String> {
        let len = read_varint(input)? as usize;
        let mut bytes = vec![0u8; len];
        input.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// Zero-byte externalizer for indices that carry no per-key payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitExternalizer;

impl DataExternalizer<()> for UnitExternalizer {
    fn save(&self, _out: &mut dyn Write, _value: &()) -> io::Result<()> {
        Ok(())
    }

    fn read(&self, _input: &mut dyn Read) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            let decoded = read_varint(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn varint_is_compact_for_small_values() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 5).unwrap();
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn string_round_trip() {
        let ext = StringExternalizer;
        let mut buf = Vec::new();
        ext.save(&mut buf, &"héllo".to_string()).unwrap();
        assert_eq!(ext.read(&mut buf.as_slice()).unwrap(), "héllo");
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 2).unwrap();
        buf.extend_from_slice(&[0xff, 0xfe]);
        assert!(StringExternalizer.read(&mut buf.as_slice()).is_err());
    }
}
