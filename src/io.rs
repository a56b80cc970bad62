//! Little-endian stream primitives for the at-rest index format.
//!
//! The on-disk layout is a plain byte stream with a fixed field order, so
//! serialization is hand-rolled over `std::io` instead of going through a
//! serde format. Every multi-byte value is little-endian.

use std::io::{Read, Write};

pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> std::io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u32<W: Write + ?Sized>(w: &mut W, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64<W: Write + ?Sized>(w: &mut W, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_i64<W: Write + ?Sized>(w: &mut W, v: i64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32<W: Write + ?Sized>(w: &mut W, v: f32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64<W: Write + ?Sized>(w: &mut W, v: f64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u32<R: Read + ?Sized>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64<R: Read + ?Sized>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_i64<R: Read + ?Sized>(r: &mut R) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub fn read_f32<R: Read + ?Sized>(r: &mut R) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

pub fn read_f64<R: Read + ?Sized>(r: &mut R) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a length prefix that will be used to reserve memory.
///
/// Fails with `InvalidData` when the declared length is absurd relative to the
/// remaining payload, so a corrupted prefix surfaces as a read error instead
/// of an OOM abort.
pub fn read_len<R: Read + ?Sized>(r: &mut R, element_size: usize) -> std::io::Result<usize> {
    let len = read_u64(r)? as usize;
    // 1 TiB of declared payload is far beyond anything this format produces.
    const SANITY_LIMIT: usize = 1 << 40;
    if element_size != 0 && len.saturating_mul(element_size) > SANITY_LIMIT {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("implausible length prefix: {len}"),
        ));
    }
    Ok(len)
}

pub fn write_bytes<W: Write + ?Sized>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    write_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

pub fn read_bytes<R: Read + ?Sized>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let len = read_len(r, 1)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_f32_slice<W: Write + ?Sized>(w: &mut W, values: &[f32]) -> std::io::Result<()> {
    write_u64(w, values.len() as u64)?;
    for &v in values {
        write_f32(w, v)?;
    }
    Ok(())
}

pub fn read_f32_vec<R: Read + ?Sized>(r: &mut R) -> std::io::Result<Vec<f32>> {
    let len = read_len(r, 4)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_f32(r)?);
    }
    Ok(out)
}

pub fn write_u32_slice<W: Write + ?Sized>(w: &mut W, values: &[u32]) -> std::io::Result<()> {
    write_u64(w, values.len() as u64)?;
    for &v in values {
        write_u32(w, v)?;
    }
    Ok(())
}

pub fn read_u32_vec<R: Read + ?Sized>(r: &mut R) -> std::io::Result<Vec<u32>> {
    let len = read_len(r, 4)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_u32(r)?);
    }
    Ok(out)
}

pub fn write_i64_slice<W: Write + ?Sized>(w: &mut W, values: &[i64]) -> std::io::Result<()> {
    write_u64(w, values.len() as u64)?;
    for &v in values {
        write_i64(w, v)?;
    }
    Ok(())
}

pub fn read_i64_vec<R: Read + ?Sized>(r: &mut R) -> std::io::Result<Vec<i64>> {
    let len = read_len(r, 8)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_i64(r)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 7).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_u64(&mut buf, u64::MAX - 1).unwrap();
        write_i64(&mut buf, -42).unwrap();
        write_f32(&mut buf, 1.5).unwrap();
        write_f64(&mut buf, -0.25).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(read_u8(&mut r).unwrap(), 7);
        assert_eq!(read_u32(&mut r).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u64(&mut r).unwrap(), u64::MAX - 1);
        assert_eq!(read_i64(&mut r).unwrap(), -42);
        assert_eq!(read_f32(&mut r).unwrap(), 1.5);
        assert_eq!(read_f64(&mut r).unwrap(), -0.25);
    }

    #[test]
    fn test_slice_roundtrip() {
        let mut buf = Vec::new();
        write_i64_slice(&mut buf, &[1, -2, 3]).unwrap();
        write_f32_slice(&mut buf, &[0.5, -0.5]).unwrap();
        write_u32_slice(&mut buf, &[9, 8, 7, 6]).unwrap();
        write_bytes(&mut buf, b"abc").unwrap();

        let mut r = buf.as_slice();
        assert_eq!(read_i64_vec(&mut r).unwrap(), vec![1, -2, 3]);
        assert_eq!(read_f32_vec(&mut r).unwrap(), vec![0.5, -0.5]);
        assert_eq!(read_u32_vec(&mut r).unwrap(), vec![9, 8, 7, 6]);
        assert_eq!(read_bytes(&mut r).unwrap(), b"abc");
    }

    #[test]
    fn test_truncated_read_fails() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 100).unwrap(); // declares 100 i64s, provides none
        let mut r = buf.as_slice();
        assert!(read_i64_vec(&mut r).is_err());
    }

    #[test]
    fn test_implausible_length_rejected() {
        let mut buf = Vec::new();
        write_u64(&mut buf, u64::MAX / 2).unwrap();
        let mut r = buf.as_slice();
        let err = read_i64_vec(&mut r).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
