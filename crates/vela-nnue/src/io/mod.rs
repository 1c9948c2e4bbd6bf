//! Binary primitives shared by every parameter block: little-endian
//! scalars and plain arrays, plus the LEB128 tensor codec.

mod leb128;

use std::io::{self, Read, Write};

pub use leb128::{LEB128_MAGIC, LebInteger, read_leb128, write_leb128};

/// Read a little-endian `u32`.
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a little-endian `u32`.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Fill `out` with little-endian `i32` values.
pub fn read_i32s<R: Read>(reader: &mut R, out: &mut [i32]) -> io::Result<()> {
    let mut buf = vec![0u8; out.len() * 4];
    reader.read_exact(&mut buf)?;
    for (dst, chunk) in out.iter_mut().zip(buf.chunks_exact(4)) {
        *dst = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(())
}

pub fn write_i32s<W: Write>(writer: &mut W, values: &[i32]) -> io::Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    writer.write_all(&bytes)
}

/// Fill `out` with raw `i8` values.
pub fn read_i8s<R: Read>(reader: &mut R, out: &mut [i8]) -> io::Result<()> {
    let mut buf = vec![0u8; out.len()];
    reader.read_exact(&mut buf)?;
    for (dst, &b) in out.iter_mut().zip(&buf) {
        *dst = b as i8;
    }
    Ok(())
}

pub fn write_i8s<W: Write>(writer: &mut W, values: &[i8]) -> io::Result<()> {
    let bytes: Vec<u8> = values.iter().map(|&v| v as u8).collect();
    writer.write_all(&bytes)
}
