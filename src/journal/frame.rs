// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record framing for journal segments.
//!
//! Each record is framed as `len (4B BE) | crc (4B BE) | payload`, where the
//! checksum is CRC32 (IEEE) over the payload bytes as written - that is,
//! after optional encryption. The plaintext payload layout is:
//!
//! ```text
//! seq (8B BE) | key_len (4B BE) | key | val_len (4B BE) | value
//! ```
//!
//! A short read anywhere inside a record marks the end of the segment:
//! trailing partial records are tolerated, a checksum mismatch is not.

use std::io::{self, Read};

use crc32fast::Hasher;

use super::crypto::RecordCipher;
use super::JournalError;

/// Framing header size: 4-byte length plus 4-byte checksum.
pub const HEADER_LEN: usize = 8;

/// Fixed plaintext overhead: sequence plus the two length prefixes.
const BODY_OVERHEAD: usize = 8 + 4 + 4;

/// A record as it exists in the journal: opaque key/value plus the sequence
/// number the journal assigned at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub seq: u64,
}

/// A record to be written. The journal assigns the sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Encode one record into its on-disk framed form.
pub(super) fn encode_record(
    seq: u64,
    key: &[u8],
    value: &[u8],
    cipher: Option<&RecordCipher>,
) -> Result<Vec<u8>, JournalError> {
    let mut body = Vec::with_capacity(BODY_OVERHEAD + key.len() + value.len());
    body.extend_from_slice(&seq.to_be_bytes());
    body.extend_from_slice(&(key.len() as u32).to_be_bytes());
    body.extend_from_slice(key);
    body.extend_from_slice(&(value.len() as u32).to_be_bytes());
    body.extend_from_slice(value);

    let payload = match cipher {
        Some(cipher) => cipher.seal(&body)?,
        None => body,
    };

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut record = Vec::with_capacity(HEADER_LEN + payload.len());
    record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    record.extend_from_slice(&crc.to_be_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Read the next record from a segment stream.
///
/// Returns `Ok(None)` at a clean end of segment, which includes a short read
/// inside a trailing partial record. A checksum mismatch returns
/// [`JournalError::BadChecksum`].
pub(super) fn read_record<R: Read>(
    reader: &mut R,
    cipher: Option<&RecordCipher>,
) -> Result<Option<Entry>, JournalError> {
    let mut header = [0u8; HEADER_LEN];
    if read_exact_or_eof(reader, &mut header)?.is_none() {
        return Ok(None);
    }
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let expected_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    let mut payload = vec![0u8; len];
    if read_exact_or_eof(reader, &mut payload)?.is_none() {
        return Ok(None);
    }

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != expected_crc {
        return Err(JournalError::BadChecksum);
    }

    let body = match cipher {
        Some(cipher) => cipher.open(&payload)?,
        None => payload,
    };
    decode_body(&body).map(Some)
}

fn decode_body(body: &[u8]) -> Result<Entry, JournalError> {
    let seq = u64::from_be_bytes(
        body.get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or(JournalError::TruncatedRecord)?,
    );
    let key_len = u32::from_be_bytes(
        body.get(8..12)
            .and_then(|b| b.try_into().ok())
            .ok_or(JournalError::TruncatedRecord)?,
    ) as usize;
    let key = body
        .get(12..12 + key_len)
        .ok_or(JournalError::TruncatedRecord)?
        .to_vec();
    let val_start = 12 + key_len;
    let val_len = u32::from_be_bytes(
        body.get(val_start..val_start + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or(JournalError::TruncatedRecord)?,
    ) as usize;
    let value = body
        .get(val_start + 4..val_start + 4 + val_len)
        .ok_or(JournalError::TruncatedRecord)?
        .to_vec();
    Ok(Entry { key, value, seq })
}

/// Fill `buf` completely, or report `None` if the stream ended first.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(seq: u64, key: &[u8], value: &[u8]) -> Entry {
        let record = encode_record(seq, key, value, None).unwrap();
        read_record(&mut Cursor::new(record), None)
            .unwrap()
            .expect("one full record")
    }

    #[test]
    fn test_roundtrip_basic() {
        let entry = roundtrip(7, b"sensor_a{ts=1}", b"payload");
        assert_eq!(entry.seq, 7);
        assert_eq!(entry.key, b"sensor_a{ts=1}");
        assert_eq!(entry.value, b"payload");
    }

    #[test]
    fn test_roundtrip_empty_key_and_value() {
        let entry = roundtrip(1, b"", b"");
        assert_eq!(entry.seq, 1);
        assert!(entry.key.is_empty());
        assert!(entry.value.is_empty());
    }

    #[test]
    fn test_roundtrip_large_value() {
        let value = vec![0xabu8; 64 * 1024];
        let entry = roundtrip(9, b"k", &value);
        assert_eq!(entry.value, value);
    }

    #[test]
    fn test_empty_stream_is_end_of_segment() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_record(&mut cursor, None).unwrap().is_none());
    }

    #[test]
    fn test_partial_header_is_end_of_segment() {
        let mut cursor = Cursor::new(vec![0u8; 5]);
        assert!(read_record(&mut cursor, None).unwrap().is_none());
    }

    #[test]
    fn test_partial_payload_is_end_of_segment() {
        let mut record = encode_record(3, b"key", b"value", None).unwrap();
        record.truncate(record.len() - 2);
        let mut cursor = Cursor::new(record);
        assert!(read_record(&mut cursor, None).unwrap().is_none());
    }

    #[test]
    fn test_flipped_payload_byte_fails_checksum() {
        let mut record = encode_record(3, b"key", b"value", None).unwrap();
        let last = record.len() - 1;
        record[last] ^= 0x01;
        let err = read_record(&mut Cursor::new(record), None).unwrap_err();
        assert!(matches!(err, JournalError::BadChecksum));
    }

    #[test]
    fn test_flipped_crc_byte_fails_checksum() {
        let mut record = encode_record(3, b"key", b"value", None).unwrap();
        record[4] ^= 0x01;
        let err = read_record(&mut Cursor::new(record), None).unwrap_err();
        assert!(matches!(err, JournalError::BadChecksum));
    }

    #[test]
    fn test_encrypted_roundtrip_and_crc_over_ciphertext() {
        let cipher = RecordCipher::new(&[7u8; 32]).unwrap();
        let record = encode_record(4, b"k", b"secret", Some(&cipher)).unwrap();

        // The plaintext must not appear in the framed record.
        assert!(!record
            .windows(b"secret".len())
            .any(|w| w == b"secret"));

        let entry = read_record(&mut Cursor::new(record), Some(&cipher))
            .unwrap()
            .unwrap();
        assert_eq!(entry.seq, 4);
        assert_eq!(entry.value, b"secret");
    }

    #[test]
    fn test_encrypted_record_tamper_fails_before_decrypt() {
        let cipher = RecordCipher::new(&[7u8; 32]).unwrap();
        let mut record = encode_record(4, b"k", b"secret", Some(&cipher)).unwrap();
        let last = record.len() - 1;
        record[last] ^= 0xff;
        // The CRC covers the ciphertext, so corruption surfaces as a
        // checksum failure rather than an auth failure.
        let err = read_record(&mut Cursor::new(record), Some(&cipher)).unwrap_err();
        assert!(matches!(err, JournalError::BadChecksum));
    }

    #[test]
    fn test_consecutive_records_decode_in_order() {
        let mut stream = Vec::new();
        for seq in 1..=3u64 {
            stream.extend(encode_record(seq, b"k", &seq.to_be_bytes(), None).unwrap());
        }
        let mut cursor = Cursor::new(stream);
        for expected in 1..=3u64 {
            let entry = read_record(&mut cursor, None).unwrap().unwrap();
            assert_eq!(entry.seq, expected);
        }
        assert!(read_record(&mut cursor, None).unwrap().is_none());
    }
}
