//! Simplified DUKPT (Derived Unique Key Per Transaction), the fix for the static key attack.
//!
//! Every transaction gets its own key derived from a base derivation key (BDK) and a key
//! serial number (KSN) carrying the terminal id and a transaction counter. The derivation
//! uses HMAC-SHA256 in place of the ANSI X9.24 DES tree, which is enough to show the effect:
//! the same PIN block never encrypts to the same value twice.

use std::collections::HashMap;
use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::crypto::{ErrorKind, PinError, TdesKey, BLOCK_SIZE};

type HmacSha256 = Hmac<Sha256>;

pub const KSN_LEN: usize = 10;
pub const SESSION_KEY_LEN: usize = 16;

/// The transaction counter lives in the low 21 bits of the KSN
pub const MAX_COUNTER: u32 = 0x1F_FFFF;

/// Key serial number: 7 bytes of terminal id followed by a 3 byte counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ksn([u8; KSN_LEN]);

impl Ksn {
    pub fn new(terminal_id: &str, counter: u32) -> Result<Ksn, PinError> {
        if counter > MAX_COUNTER {
            return Err(PinError::new(ErrorKind::KeyDerivation,
                                     format!("transaction counter {} exceeds {}", counter, MAX_COUNTER)));
        }

        let mut ksn = [0u8; KSN_LEN];
        ksn[..7].copy_from_slice(&Sha256::digest(terminal_id.as_bytes())[..7]);
        ksn[7..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Ok(Ksn(ksn))
    }

    pub fn from_hex(ksn_hex: &str) -> Result<Ksn, PinError> {
        let mut ksn = [0u8; KSN_LEN];
        hex::decode_to_slice(ksn_hex.trim(), &mut ksn)
            .map_err(|e| PinError::new(ErrorKind::Decode, format!("ksn is not {} bytes of hex: {}", KSN_LEN, e)))?;
        Ok(Ksn(ksn))
    }

    pub fn counter(&self) -> u32 {
        ((self.0[7] as u32 & 0x1F) << 16) | ((self.0[8] as u32) << 8) | self.0[9] as u32
    }

    /// The KSN with its counter bits cleared, i.e. the one the IPEK is derived from
    fn base(&self) -> [u8; KSN_LEN] {
        let mut base = self.0;
        base[7] &= 0xE0;
        base[8] = 0;
        base[9] = 0;
        base
    }
}

impl fmt::Display for Ksn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; SESSION_KEY_LEN], PinError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| PinError::new(ErrorKind::KeyDerivation, format!("hmac key error: {}", e)))?;
    mac.update(data);

    let mut out = [0u8; SESSION_KEY_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes()[..SESSION_KEY_LEN]);
    Ok(out)
}

/// Initial PIN encryption key of the terminal named in `ksn`
pub fn derive_ipek(bdk: &[u8], ksn: &Ksn) -> Result<[u8; SESSION_KEY_LEN], PinError> {
    hmac_sha256(bdk, &ksn.base())
}

/// The key for the single transaction identified by `ksn`
pub fn derive_session_key(bdk: &[u8], ksn: &Ksn) -> Result<[u8; SESSION_KEY_LEN], PinError> {
    let counter = ksn.counter();
    let mut key = derive_ipek(bdk, ksn)?;

    for bit in 0..21u8 {
        if counter & (1 << bit) != 0 {
            key = hmac_sha256(&key, &[bit])?;
        }
    }
    Ok(key)
}

/// A PIN block as sent by a DUKPT terminal: the ciphertext travels with its KSN
#[derive(Debug, Clone)]
pub struct DukptPinBlock {
    pub ksn: Ksn,
    pub pin_block: [u8; BLOCK_SIZE],
}

/// Terminal side key management: one counter per terminal, bumped on every transaction
pub struct DukptKeyManager {
    bdk: Vec<u8>,
    counters: HashMap<String, u32>,
}

impl DukptKeyManager {
    pub fn new(bdk: &[u8]) -> DukptKeyManager {
        DukptKeyManager { bdk: bdk.to_vec(), counters: HashMap::new() }
    }

    /// Advances the terminal's counter and returns the KSN and key of the new transaction
    pub fn next_key(&mut self, terminal_id: &str) -> Result<(Ksn, [u8; SESSION_KEY_LEN]), PinError> {
        let counter = self.counters.entry(terminal_id.to_string()).or_insert(0);
        *counter += 1;

        let ksn = Ksn::new(terminal_id, *counter)?;
        let key = derive_session_key(&self.bdk, &ksn)?;
        debug!("terminal {} transaction {} ksn {}", terminal_id, counter, ksn);
        Ok((ksn, key))
    }

    /// Encrypts a clear PIN block under a fresh transaction key
    pub fn encrypt_pin_block(&mut self, clear_block: &[u8; BLOCK_SIZE], terminal_id: &str) -> Result<DukptPinBlock, PinError> {
        let (ksn, key) = self.next_key(terminal_id)?;
        let pin_block = TdesKey::new(&key)?.encrypt(clear_block);
        Ok(DukptPinBlock { ksn, pin_block })
    }
}

/// Host (HSM) side: rebuilds the transaction key from the BDK and the received KSN
pub fn decrypt_pin_block(bdk: &[u8], block: &DukptPinBlock) -> Result<[u8; BLOCK_SIZE], PinError> {
    let key = derive_session_key(bdk, &block.ksn)?;
    Ok(TdesKey::new(&key)?.decrypt(&block.pin_block))
}
