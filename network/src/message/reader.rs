//! Sequential byte reader for wire payloads.
//!
//! [`ByteReader`] walks a borrowed byte slice front to back. Every read is
//! checked: running off the end, oversized collection counts, and invalid
//! UTF-8 all surface as [`NetworkError::BadStream`] — never a panic. The
//! hub forwards these errors verbatim to subscribers.

use crate::error::NetworkError;

/// A checked cursor over a borrowed byte slice.
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// True when every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], NetworkError> {
        if self.remaining() < count {
            return Err(NetworkError::BadStream(format!(
                "unexpected end of stream: wanted {} bytes, {} remain",
                count,
                self.remaining()
            )));
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, NetworkError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16_le(&mut self) -> Result<u16, NetworkError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian `u16`. Wire addresses carry their port this way.
    pub fn read_u16_be(&mut self) -> Result<u16, NetworkError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32, NetworkError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("length checked")))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64, NetworkError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("length checked")))
    }

    /// Reads `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, NetworkError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Reads a 32-byte hash.
    pub fn read_hash(&mut self) -> Result<[u8; 32], NetworkError> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().expect("length checked"))
    }

    /// Reads a 16-byte address field.
    pub fn read_ip(&mut self) -> Result<[u8; 16], NetworkError> {
        let bytes = self.take(16)?;
        Ok(bytes.try_into().expect("length checked"))
    }

    /// Reads a variable-length integer: one byte below `0xfd`, otherwise a
    /// marker byte followed by a 2-, 4-, or 8-byte little-endian value.
    pub fn read_var_int(&mut self) -> Result<u64, NetworkError> {
        match self.read_u8()? {
            value @ 0..=0xfc => Ok(u64::from(value)),
            0xfd => self.read_u16_le().map(u64::from),
            0xfe => self.read_u32_le().map(u64::from),
            0xff => self.read_u64_le(),
        }
    }

    /// Reads a collection count and validates it against the bytes that are
    /// actually present, given a minimum encoded size per element. A count
    /// that could not possibly fit is a malformed stream, not an allocation
    /// request.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize, NetworkError> {
        let count = self.read_var_int()?;
        let bytes_needed = (count as u128) * (min_element_size.max(1) as u128);
        if bytes_needed > self.remaining() as u128 {
            return Err(NetworkError::BadStream(format!(
                "count {} exceeds stream capacity ({} bytes remain)",
                count,
                self.remaining()
            )));
        }
        Ok(count as usize)
    }

    /// Reads a var-int length followed by that many raw bytes.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, NetworkError> {
        let length = self.read_count(1)?;
        self.read_bytes(length)
    }

    /// Reads a var-int length followed by that many UTF-8 bytes.
    pub fn read_var_string(&mut self) -> Result<String, NetworkError> {
        let bytes = self.read_var_bytes()?;
        String::from_utf8(bytes)
            .map_err(|_| NetworkError::BadStream("string is not valid utf-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_integers() {
        let mut reader = ByteReader::new(&[0x2a, 0x01, 0x00, 0xff, 0xff, 0x00, 0x00]);
        assert_eq!(reader.read_u8().unwrap(), 0x2a);
        assert_eq!(reader.read_u16_le().unwrap(), 1);
        assert_eq!(reader.read_u32_le().unwrap(), 0x0000_ffff);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn truncated_read_is_an_error_not_a_panic() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        let err = reader.read_u32_le().unwrap_err();
        assert!(matches!(err, NetworkError::BadStream(_)));
        // Position is unchanged after a failed read.
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn var_int_all_widths() {
        let mut reader = ByteReader::new(&[0x07]);
        assert_eq!(reader.read_var_int().unwrap(), 7);

        let mut reader = ByteReader::new(&[0xfd, 0x00, 0x01]);
        assert_eq!(reader.read_var_int().unwrap(), 256);

        let mut reader = ByteReader::new(&[0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(reader.read_var_int().unwrap(), 65_536);

        let mut reader = ByteReader::new(&[0xff, 0, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(reader.read_var_int().unwrap(), 1 << 32);
    }

    #[test]
    fn absurd_count_rejected_before_allocation() {
        // Claims 2^32 elements with two bytes of stream behind it.
        let mut reader = ByteReader::new(&[0xff, 0, 0, 0, 0, 1, 0, 0, 0, 0xaa, 0xbb]);
        assert!(matches!(
            reader.read_count(32),
            Err(NetworkError::BadStream(_))
        ));
    }

    #[test]
    fn var_string_utf8_validation() {
        let mut reader = ByteReader::new(&[0x02, b'o', b'k']);
        assert_eq!(reader.read_var_string().unwrap(), "ok");

        let mut reader = ByteReader::new(&[0x02, 0xff, 0xfe]);
        assert!(matches!(
            reader.read_var_string(),
            Err(NetworkError::BadStream(_))
        ));
    }
}
