//! Signed LEB128 tensors.
//!
//! A tensor is the ASCII magic `COMPRESSED_LEB128`, a little-endian `u32`
//! byte count, then that many bytes holding one signed LEB128 value per
//! element.

use std::io::{self, Read, Write};

use super::{read_u32, write_u32};
use crate::error::FormatError;

/// Header preceding every compressed tensor.
pub const LEB128_MAGIC: &[u8; 17] = b"COMPRESSED_LEB128";

/// Integer element types that can live in a LEB128 tensor.
pub trait LebInteger: Copy {
    fn to_i64(self) -> i64;
    fn from_i64(value: i64) -> Option<Self>;
}

macro_rules! leb_integer {
    ($($t:ty),*) => {$(
        impl LebInteger for $t {
            #[inline]
            fn to_i64(self) -> i64 {
                i64::from(self)
            }

            #[inline]
            fn from_i64(value: i64) -> Option<Self> {
                <$t>::try_from(value).ok()
            }
        }
    )*};
}

leb_integer!(i8, i16, i32);

fn encode(mut value: i64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let last = if byte & 0x40 == 0 { value == 0 } else { value == -1 };
        if last {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn decode(bytes: &[u8], pos: &mut usize) -> Result<i64, FormatError> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or(FormatError::Leb128("stream ends inside a value"))?;
        *pos += 1;
        result |= i64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
        if shift >= 63 {
            return Err(FormatError::Leb128("value longer than 64 bits"));
        }
    }
}

/// Decode one tensor into `out`, which must have exactly as many elements
/// as the tensor holds.
pub fn read_leb128<R: Read, T: LebInteger>(reader: &mut R, out: &mut [T]) -> Result<(), FormatError> {
    let mut magic = [0u8; LEB128_MAGIC.len()];
    reader.read_exact(&mut magic)?;
    if &magic != LEB128_MAGIC {
        return Err(FormatError::Leb128Magic);
    }

    let byte_count = read_u32(reader)? as usize;
    let mut bytes = Vec::new();
    reader.take(byte_count as u64).read_to_end(&mut bytes)?;
    if bytes.len() != byte_count {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let mut pos = 0;
    for slot in out.iter_mut() {
        let value = decode(&bytes, &mut pos)?;
        *slot = T::from_i64(value).ok_or(FormatError::Leb128("value out of range for element type"))?;
    }
    if pos != bytes.len() {
        return Err(FormatError::Leb128("byte count disagrees with element count"));
    }
    Ok(())
}

/// Encode `values` as one tensor.
pub fn write_leb128<W: Write, T: LebInteger>(writer: &mut W, values: &[T]) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(values.len() * 2);
    for &v in values {
        encode(v.to_i64(), &mut bytes);
    }
    let byte_count = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "tensor exceeds 4 GiB"))?;
    writer.write_all(LEB128_MAGIC)?;
    write_u32(writer, byte_count)?;
    writer.write_all(&bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    fn encoded(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        encode(value, &mut out);
        out
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(63), [0x3F]);
        assert_eq!(encoded(64), [0xC0, 0x00]);
        assert_eq!(encoded(128), [0x80, 0x01]);
        assert_eq!(encoded(-1), [0x7F]);
        assert_eq!(encoded(-64), [0x40]);
        assert_eq!(encoded(-65), [0xBF, 0x7F]);
        assert_eq!(encoded(-128), [0x80, 0x7F]);
    }

    #[test]
    fn decode_sign_extends() {
        for (bytes, value) in [(vec![0x7F], -1), (vec![0xBF, 0x7F], -65), (vec![0xFF, 0x00], 127)] {
            let mut pos = 0;
            assert_eq!(decode(&bytes, &mut pos).unwrap(), value);
            assert_eq!(pos, bytes.len());
        }
    }

    #[test]
    fn tensor_layout() {
        let mut out = Vec::new();
        write_leb128(&mut out, &[1i16, -1, 300]).unwrap();
        assert_eq!(&out[..17], LEB128_MAGIC);
        assert_eq!(&out[17..21], &4u32.to_le_bytes());
        assert_eq!(&out[21..], &[0x01, 0x7F, 0xAC, 0x02]);
    }

    #[test]
    fn missing_magic_is_rejected() {
        let mut cursor = Cursor::new(b"COMPRESSED_LEB129\x00\x00\x00\x00".to_vec());
        let mut out: [i16; 0] = [];
        assert!(matches!(read_leb128(&mut cursor, &mut out), Err(FormatError::Leb128Magic)));
    }

    #[test]
    fn byte_count_mismatch_is_rejected() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[5i32, 6, 7]).unwrap();
        let mut two = [0i32; 2];
        assert!(matches!(
            read_leb128(&mut Cursor::new(buf.clone()), &mut two),
            Err(FormatError::Leb128(_))
        ));
        let mut four = [0i32; 4];
        assert!(matches!(
            read_leb128(&mut Cursor::new(buf), &mut four),
            Err(FormatError::Leb128(_))
        ));
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[1000i16; 8]).unwrap();
        buf.truncate(buf.len() - 3);
        let mut out = [0i16; 8];
        let err = read_leb128(&mut Cursor::new(buf), &mut out).unwrap_err();
        assert!(err.is_truncation(), "unexpected error: {err}");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[40_000i32]).unwrap();
        let mut out = [0i16; 1];
        assert!(matches!(read_leb128(&mut Cursor::new(buf), &mut out), Err(FormatError::Leb128(_))));
    }

    proptest! {
        #[test]
        fn i16_tensors_survive_encoding(values in proptest::collection::vec(any::<i16>(), 0..256)) {
            let mut buf = Vec::new();
            write_leb128(&mut buf, &values).unwrap();
            let mut back = vec![0i16; values.len()];
            read_leb128(&mut Cursor::new(buf), &mut back).unwrap();
            prop_assert_eq!(back, values);
        }

        #[test]
        fn i32_tensors_survive_encoding(values in proptest::collection::vec(any::<i32>(), 0..256)) {
            let mut buf = Vec::new();
            write_leb128(&mut buf, &values).unwrap();
            let mut back = vec![0i32; values.len()];
            read_leb128(&mut Cursor::new(buf), &mut back).unwrap();
            prop_assert_eq!(back, values);
        }
    }
}
