//! Fixed-size per-point payload store.
//!
//! Each point may carry an opaque blob of `info_size` bytes (an application
//! id, a compact attribute record, ...) that is returned alongside search
//! results. Blobs live in one contiguous arena indexed by inner id.

use std::io::{Read, Write};

use crate::idmap::InnerIdType;
use crate::io;

#[derive(Debug)]
pub struct ExtraInfoCell {
    info_size: usize,
    data: Vec<u8>,
}

impl ExtraInfoCell {
    pub fn new(info_size: usize) -> Self {
        Self {
            info_size,
            data: Vec::new(),
        }
    }

    pub fn info_size(&self) -> usize {
        self.info_size
    }

    pub fn total_count(&self) -> usize {
        self.data.len() / self.info_size
    }

    pub fn in_memory(&self) -> bool {
        true
    }

    /// Append blobs for `count` points; `buf` holds `count * info_size` bytes
    /// in insertion order.
    pub fn batch_insert(&mut self, buf: &[u8], count: usize) {
        debug_assert_eq!(buf.len(), count * self.info_size);
        self.data.extend_from_slice(&buf[..count * self.info_size]);
    }

    /// Copy the blob of `id` into `dst`.
    pub fn get(&self, id: InnerIdType, dst: &mut [u8]) {
        let start = id as usize * self.info_size;
        dst[..self.info_size].copy_from_slice(&self.data[start..start + self.info_size]);
    }

    pub fn serialize(&self, w: &mut dyn Write) -> std::io::Result<()> {
        io::write_u64(w, self.info_size as u64)?;
        io::write_bytes(w, &self.data)
    }

    pub fn deserialize(&mut self, r: &mut dyn Read) -> std::io::Result<()> {
        let info_size = io::read_u64(r)? as usize;
        if info_size != self.info_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "extra info size mismatch: stored {info_size}, expected {}",
                    self.info_size
                ),
            ));
        }
        let data = io::read_bytes(r)?;
        if data.len() % self.info_size != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "extra info arena not a multiple of info size",
            ));
        }
        self.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cell = ExtraInfoCell::new(4);
        cell.batch_insert(b"aaaabbbbcccc", 3);
        assert_eq!(cell.total_count(), 3);

        let mut dst = [0u8; 4];
        cell.get(1, &mut dst);
        assert_eq!(&dst, b"bbbb");
        cell.get(2, &mut dst);
        assert_eq!(&dst, b"cccc");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut cell = ExtraInfoCell::new(2);
        cell.batch_insert(b"xxyyzz", 3);
        let mut bytes = Vec::new();
        cell.serialize(&mut bytes).unwrap();

        let mut restored = ExtraInfoCell::new(2);
        restored.deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(restored.total_count(), 3);
        let mut dst = [0u8; 2];
        restored.get(2, &mut dst);
        assert_eq!(&dst, b"zz");
    }

    #[test]
    fn test_deserialize_size_mismatch_fails() {
        let mut cell = ExtraInfoCell::new(2);
        cell.batch_insert(b"xxyy", 2);
        let mut bytes = Vec::new();
        cell.serialize(&mut bytes).unwrap();

        let mut restored = ExtraInfoCell::new(3);
        assert!(restored.deserialize(&mut bytes.as_slice()).is_err());
    }
}
