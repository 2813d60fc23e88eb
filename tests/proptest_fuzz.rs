//! Property-based tests (fuzzing) for the journal and staging buffer.
//!
//! Uses proptest to generate random inputs and verify that persistence
//! round-trips exactly and that malformed input produces clean errors,
//! never panics.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::sync::Arc;

use proptest::prelude::*;

use telemetry_sink::{
    Entry, Event, Journal, JournalError, JournalOptions, MemoryStorage, RecordCipher, RingBuffer,
};

fn open_mem(max_segment_bytes: u64, cipher: Option<RecordCipher>) -> Journal {
    Journal::open(
        Arc::new(MemoryStorage::new()),
        max_segment_bytes,
        JournalOptions::default().with_optional_cipher(cipher),
    )
    .unwrap()
}

fn collect(journal: &Journal) -> Vec<Entry> {
    let mut entries = Vec::new();
    journal
        .replay(|entry| {
            entries.push(entry);
            Ok::<_, JournalError>(())
        })
        .unwrap();
    entries
}

/// Key/value pairs across the interesting size spectrum, empty included.
fn kv_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    (
        prop::collection::vec(any::<u8>(), 0..64),
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..256),
            Just(Vec::new()),
            Just(vec![0xaau8; 50 * 1024]), // well past one buffered write
        ],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever goes in comes back out: same bytes, same order, sequences
    /// contiguous from 1 - across arbitrary segment rotation thresholds.
    #[test]
    fn journal_replay_roundtrip(
        pairs in prop::collection::vec(kv_strategy(), 1..20),
        max_segment in prop_oneof![Just(0u64), 64..4096u64],
    ) {
        let journal = open_mem(max_segment, None);
        for (key, value) in &pairs {
            journal.write(key, value).unwrap();
        }
        journal.sync().unwrap();

        let entries = collect(&journal);
        prop_assert_eq!(entries.len(), pairs.len());
        for (i, (entry, (key, value))) in entries.iter().zip(&pairs).enumerate() {
            prop_assert_eq!(entry.seq, i as u64 + 1);
            prop_assert_eq!(&entry.key, key);
            prop_assert_eq!(&entry.value, value);
        }
    }

    /// Encryption must not change what replay observes.
    #[test]
    fn encrypted_journal_roundtrip(
        pairs in prop::collection::vec(kv_strategy(), 1..10),
        key_byte in any::<u8>(),
    ) {
        let cipher = RecordCipher::new(&[key_byte; 32]).unwrap();
        let journal = open_mem(0, Some(cipher));
        for (key, value) in &pairs {
            journal.write(key, value).unwrap();
        }
        journal.sync().unwrap();

        let entries = collect(&journal);
        prop_assert_eq!(entries.len(), pairs.len());
        for (entry, (key, value)) in entries.iter().zip(&pairs) {
            prop_assert_eq!(&entry.key, key);
            prop_assert_eq!(&entry.value, value);
        }
    }

    /// The ring buffer behaves exactly like "keep the last C items".
    #[test]
    fn ring_matches_keep_last_model(
        values in prop::collection::vec(any::<i64>(), 0..64),
        capacity in 1usize..8,
    ) {
        let ring = RingBuffer::new(capacity);
        let mut evicted_count = 0;
        for v in &values {
            if ring.add(*v).is_some() {
                evicted_count += 1;
            }
        }

        let mut expected: Vec<i64> = values.clone();
        expected.reverse();
        expected.truncate(capacity);
        prop_assert_eq!(ring.snapshot(), expected);
        prop_assert_eq!(evicted_count, values.len().saturating_sub(capacity));
    }

    /// Event deserialization never panics on arbitrary bytes.
    #[test]
    fn event_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = Event::decode(&bytes);
    }

    /// Opening arbitrary bytes as ciphertext fails cleanly, never panics.
    #[test]
    fn cipher_open_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let cipher = RecordCipher::new(&[7u8; 32]).unwrap();
        prop_assert!(cipher.open(&bytes).is_err());
    }
}

#[test]
fn nonces_do_not_repeat_under_identical_plaintext() {
    let cipher = RecordCipher::new(&[1u8; 32]).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..100 {
        let sealed = cipher.seal(b"identical plaintext").unwrap();
        assert!(seen.insert(sealed[..12].to_vec()), "nonce repeated");
    }
}
