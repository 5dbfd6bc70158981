//! Record identifiers.
//!
//! Ids are 24 lowercase hex characters: a 4-byte big-endian seconds timestamp,
//! 5 random bytes fixed per process, and a 3-byte wrapping counter.

use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

static ID_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("static regex"));

static PROCESS_BYTES: LazyLock<[u8; 5]> = LazyLock::new(|| rand::thread_rng().gen());

static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::thread_rng().gen_range(0..0x00FF_FFFF)));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a new id for a record created at `now_secs`.
    pub fn generate(now_secs: i64) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&(now_secs as u32).to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_BYTES);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);

        RecordId(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Parse a caller-supplied id. Returns `None` when it is not 24 hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        if ID_FORMAT.is_match(raw) {
            Some(RecordId(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
