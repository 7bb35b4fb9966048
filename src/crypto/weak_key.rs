//! This module flags key properties that make an offline PIN search cheap: short keys,
//! low entropy, well-known test keys and DES weak/semi-weak components.

use std::collections::HashMap;
use std::fmt;

use crate::crypto::{decode_hex, PinError};

/// Minimum acceptable key strength for 3DES, in bits
pub const MIN_TDES_KEY_BITS: usize = 168;

/// Entropy below this fraction of the maximum achievable for the key's size is flagged
pub const MIN_ENTROPY_RATIO: f64 = 0.9;

/// Test keys that show up in every lab, HSM manual and PCI audit finding
const KNOWN_WEAK_KEYS: [&str; 6] = [
    "0000000000000000",
    "FFFFFFFFFFFFFFFF",
    "0123456789ABCDEF",
    "FEDCBA9876543210",
    "1111111111111111",
    "AAAAAAAAAAAAAAAA",
];

const SEQUENCE_CHUNKS: [&str; 2] = ["01234567", "89ABCDEF"];

/// DES weak and semi-weak keys, compared with the parity bits masked off
const WEAK_DES_KEYS: [[u8; 8]; 16] = [
    // weak
    [0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01],
    [0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE],
    [0xE0, 0xE0, 0xE0, 0xE0, 0xF1, 0xF1, 0xF1, 0xF1],
    [0x1F, 0x1F, 0x1F, 0x1F, 0x0E, 0x0E, 0x0E, 0x0E],
    // semi-weak
    [0x01, 0xFE, 0x01, 0xFE, 0x01, 0xFE, 0x01, 0xFE],
    [0xFE, 0x01, 0xFE, 0x01, 0xFE, 0x01, 0xFE, 0x01],
    [0x1F, 0xE0, 0x1F, 0xE0, 0x0E, 0xF1, 0x0E, 0xF1],
    [0xE0, 0x1F, 0xE0, 0x1F, 0xF1, 0x0E, 0xF1, 0x0E],
    [0x01, 0xE0, 0x01, 0xE0, 0x01, 0xF1, 0x01, 0xF1],
    [0xE0, 0x01, 0xE0, 0x01, 0xF1, 0x01, 0xF1, 0x01],
    [0x1F, 0xFE, 0x1F, 0xFE, 0x0E, 0xFE, 0x0E, 0xFE],
    [0xFE, 0x1F, 0xFE, 0x1F, 0xFE, 0x0E, 0xFE, 0x0E],
    [0x01, 0x1F, 0x01, 0x1F, 0x01, 0x0E, 0x01, 0x0E],
    [0x1F, 0x01, 0x1F, 0x01, 0x0E, 0x01, 0x0E, 0x01],
    [0xE0, 0xFE, 0xE0, 0xFE, 0xF1, 0xFE, 0xF1, 0xFE],
    [0xFE, 0xE0, 0xFE, 0xE0, 0xFE, 0xF1, 0xFE, 0xF1],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    KeyTooShort,
    LowEntropy,
    BannedPattern,
    KnownWeakKey,
    WeakDesComponent,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub msg: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {:?}: {}", self.severity, self.kind, self.msg)
    }
}

/// Outcome of [`analyze_key`]
#[derive(Debug, Clone)]
pub struct KeyReport {
    pub key_bits: usize,
    /// Shannon entropy in bits per byte
    pub entropy: f64,
    pub issues: Vec<Issue>,
}

impl KeyReport {
    pub fn is_vulnerable(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

pub fn analyze_key(key_hex: &str) -> Result<KeyReport, PinError> {
    let key = decode_hex("key", key_hex)?;
    let normalized = key_hex.trim().to_uppercase();
    let mut issues = Vec::new();

    let key_bits = key.len() * 8;
    if key_bits < MIN_TDES_KEY_BITS {
        issues.push(Issue {
            severity: Severity::Critical,
            kind: IssueKind::KeyTooShort,
            msg: format!("3DES key of {} bits (min: {} bits)", key_bits, MIN_TDES_KEY_BITS),
        });
    }

    let entropy = shannon_entropy(&key);
    let max_entropy = (key.len().min(256) as f64).log2();
    if !key.is_empty() && entropy < max_entropy * MIN_ENTROPY_RATIO {
        issues.push(Issue {
            severity: Severity::High,
            kind: IssueKind::LowEntropy,
            msg: format!("entropy {:.2} bits/byte, {:.2} achievable for a key of this size", entropy, max_entropy),
        });
    }

    if has_banned_pattern(&normalized) {
        issues.push(Issue {
            severity: Severity::Critical,
            kind: IssueKind::BannedPattern,
            msg: "key is a repetition or a counting sequence".to_string(),
        });
    }

    if let Some(weak) = KNOWN_WEAK_KEYS.iter().find(|weak| normalized.contains(*weak)) {
        issues.push(Issue {
            severity: Severity::Critical,
            kind: IssueKind::KnownWeakKey,
            msg: format!("key contains the well-known test key {}", weak),
        });
    }

    for (i, component) in key.chunks_exact(8).enumerate() {
        let mut part = [0u8; 8];
        part.copy_from_slice(component);
        if WEAK_DES_KEYS.iter().any(|weak| strip_parity(weak) == strip_parity(&part)) {
            issues.push(Issue {
                severity: Severity::High,
                kind: IssueKind::WeakDesComponent,
                msg: format!("DES component K{} is a weak or semi-weak key", i + 1),
            });
        }
    }

    debug!("key analysis: {} bits, entropy {:.2}, {} issue(s)", key_bits, entropy, issues.len());
    Ok(KeyReport { key_bits, entropy, issues })
}

fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq: HashMap<u8, usize> = HashMap::new();
    data.iter().for_each(|b| *freq.entry(*b).or_insert(0) += 1);

    let len = data.len() as f64;
    freq.values().map(|c| {
        let p = *c as f64 / len;
        -p * p.log2()
    }).sum()
}

fn has_banned_pattern(key_hex: &str) -> bool {
    let repeated = key_hex.len() >= 16 && key_hex.bytes().all(|b| Some(b) == key_hex.bytes().next());

    let sequence = !key_hex.is_empty() && key_hex.len() % 8 == 0 &&
        key_hex.as_bytes().chunks(8).all(|c| SEQUENCE_CHUNKS.iter().any(|s| s.as_bytes() == c));

    repeated || sequence
}

fn strip_parity(key: &[u8; 8]) -> [u8; 8] {
    let mut res = *key;
    res.iter_mut().for_each(|b| *b &= 0xFE);
    res
}
