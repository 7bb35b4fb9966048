//! Triple-DES primitives used to protect PIN blocks, plus the error type shared by the crate

pub mod dukpt;
pub mod pin;
pub mod weak_key;

use std::fmt;

use cbc::{Decryptor as CbcDec, Encryptor as CbcEnc};
use des::cipher::{Block, BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use des::TdesEde3;
use generic_array::GenericArray;

/// DES block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// The initialization vector used for every PIN block encryption.
///
/// All zeros and fixed for the lifetime of the program. Together with a static key this makes
/// the encryption of a given PIN/PAN pair fully deterministic, which is exactly what lets an
/// attacker replay candidates offline. Lab use only.
pub const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// hex input could not be parsed
    Decode,
    InvalidKeyLength,
    InvalidPan,
    InvalidPin,
    InvalidPinBlock,
    InvalidDataLength,
    UnsupportedFormat,
    /// scenario file could not be read or parsed
    Config,
    /// a search worker thread died
    Worker,
    /// per-transaction key derivation failed
    KeyDerivation,
}

#[derive(Debug)]
pub struct PinError {
    pub kind: ErrorKind,
    pub msg: String,
}

impl PinError {
    pub fn new<S: Into<String>>(kind: ErrorKind, msg: S) -> PinError {
        PinError { kind, msg: msg.into() }
    }
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pin:: {:?}: {})", self.kind, self.msg)
    }
}

impl std::error::Error for PinError {}

/// Decodes a hex string, naming the offending input on failure
pub fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>, PinError> {
    hex::decode(value.trim()).map_err(|e| PinError::new(ErrorKind::Decode, format!("{} is not valid hex: {}", what, e)))
}

/// Expands a double length key (K1 K2) to K1 K2 K1. Triple length keys are returned as is.
pub fn expand_key(key: &[u8]) -> Result<[u8; 24], PinError> {
    let mut expanded = [0u8; 24];
    match key.len() {
        16 => {
            expanded[..16].copy_from_slice(key);
            expanded[16..].copy_from_slice(&key[..8]);
        }
        24 => expanded.copy_from_slice(key),
        n => {
            return Err(PinError::new(ErrorKind::InvalidKeyLength, format!("key must be 16 or 24 bytes, got {}", n)));
        }
    }
    Ok(expanded)
}

/// A Triple-DES key ready for use. Building the key schedule once lets the search
/// reuse it for every candidate.
pub struct TdesKey {
    cipher: TdesEde3,
}

impl TdesKey {
    pub fn new(key: &[u8]) -> Result<TdesKey, PinError> {
        let expanded = expand_key(key)?;
        let cipher = TdesEde3::new_from_slice(&expanded)
            .map_err(|_| PinError::new(ErrorKind::InvalidKeyLength, "triple-des rejected the expanded key"))?;
        Ok(TdesKey { cipher })
    }

    fn cbc_encryptor(&self, iv: &[u8; BLOCK_SIZE]) -> CbcEnc<TdesEde3> {
        CbcEnc::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(&iv[..]))
    }

    fn cbc_decryptor(&self, iv: &[u8; BLOCK_SIZE]) -> CbcDec<TdesEde3> {
        CbcDec::inner_iv_init(self.cipher.clone(), GenericArray::from_slice(&iv[..]))
    }

    /// CBC encryption of a single block under the zero IV
    pub fn encrypt(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut buf: Block<TdesEde3> = GenericArray::clone_from_slice(&block[..]);
        self.cbc_encryptor(&ZERO_IV).encrypt_block_mut(&mut buf);

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Inverse of [`TdesKey::encrypt`]
    pub fn decrypt(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut buf: Block<TdesEde3> = GenericArray::clone_from_slice(&block[..]);
        self.cbc_decryptor(&ZERO_IV).decrypt_block_mut(&mut buf);

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    pub fn encrypt_cbc(&self, data: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>, PinError> {
        check_block_aligned(data)?;

        let mut blocks: Vec<Block<TdesEde3>> = data.chunks_exact(BLOCK_SIZE).map(GenericArray::clone_from_slice).collect();
        self.cbc_encryptor(iv).encrypt_blocks_mut(&mut blocks);
        Ok(blocks.iter().flat_map(|b| b.iter().copied()).collect())
    }

    pub fn decrypt_cbc(&self, data: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>, PinError> {
        check_block_aligned(data)?;

        let mut blocks: Vec<Block<TdesEde3>> = data.chunks_exact(BLOCK_SIZE).map(GenericArray::clone_from_slice).collect();
        self.cbc_decryptor(iv).decrypt_blocks_mut(&mut blocks);
        Ok(blocks.iter().flat_map(|b| b.iter().copied()).collect())
    }
}

fn check_block_aligned(data: &[u8]) -> Result<(), PinError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PinError::new(ErrorKind::InvalidDataLength,
                                 format!("data length {} is not a multiple of {}", data.len(), BLOCK_SIZE)));
    }
    Ok(())
}

pub(crate) fn xor_blocks(b1: &[u8; BLOCK_SIZE], b2: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut res = [0u8; BLOCK_SIZE];
    for (i, r) in res.iter_mut().enumerate() {
        *r = b1[i] ^ b2[i];
    }
    res
}

pub fn tdes_encrypt_cbc(data: &[u8], key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>, PinError> {
    TdesKey::new(key)?.encrypt_cbc(data, iv)
}

pub fn tdes_decrypt_cbc(data: &[u8], key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Vec<u8>, PinError> {
    TdesKey::new(key)?.decrypt_cbc(data, iv)
}

/// Encrypts one 8 byte block with Triple-DES CBC under [`ZERO_IV`].
/// `key` is 16 bytes (expanded to K1 K2 K1) or 24 bytes.
pub fn encrypt_block(plaintext: &[u8; BLOCK_SIZE], key: &[u8]) -> Result<[u8; BLOCK_SIZE], PinError> {
    Ok(TdesKey::new(key)?.encrypt(plaintext))
}

pub fn decrypt_block(ciphertext: &[u8; BLOCK_SIZE], key: &[u8]) -> Result<[u8; BLOCK_SIZE], PinError> {
    Ok(TdesKey::new(key)?.decrypt(ciphertext))
}


#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use crate::crypto::{decrypt_block, encrypt_block, expand_key, tdes_decrypt_cbc, tdes_encrypt_cbc, ErrorKind, ZERO_IV};

    const KEY: [u8; 16] = hex!("0123456789ABCDEFFEDCBA9876543210");

    #[test]
    fn test_expand_double_length_key() {
        let expanded = expand_key(&KEY).unwrap();
        assert_eq!(hex::encode_upper(expanded), "0123456789ABCDEFFEDCBA98765432100123456789ABCDEF");
    }

    #[test]
    fn test_invalid_key_length() {
        for len in [0usize, 8, 15, 17, 32].iter() {
            match encrypt_block(&[0u8; 8], &vec![0x11; *len]) {
                Ok(_) => assert!(false, "key of {} bytes was accepted", len),
                Err(e) => assert_eq!(e.kind, ErrorKind::InvalidKeyLength),
            }
        }
    }

    #[test]
    fn test_encrypt_block() {
        let res = encrypt_block(&hex!("0102030405060708"), &KEY).unwrap();
        assert_eq!(hex::encode(res), "a85ceb8cdadff808");
    }

    #[test]
    fn test_triple_length_key() {
        let key = hex!("0123456789ABCDEFFEDCBA987654321089ABCDEF01234567");
        let res = encrypt_block(&hex!("041225EEEEEEEEEE"), &key).unwrap();
        assert_eq!(hex::encode(res), "6a953d63752e5e1b");
    }

    #[test]
    fn test_explicit_k1k2k1_matches_double_length() {
        let expanded = expand_key(&KEY).unwrap();
        let block = hex!("041225EEEEEEEEEE");
        assert_eq!(encrypt_block(&block, &KEY).unwrap(), encrypt_block(&block, &expanded).unwrap());
    }

    #[test]
    fn test_block_roundtrip() {
        for block in [hex!("0000000000000000"), hex!("FFFFFFFFFFFFFFFF"), hex!("041225EEEEEEEEEE")].iter() {
            let enc = encrypt_block(block, &KEY).unwrap();
            assert_eq!(&decrypt_block(&enc, &KEY).unwrap(), block);
        }
    }

    #[test]
    fn test_cbc_chains_blocks() {
        let data = hex!("041225EEEEEEEEEE041225EEEEEEEEEE");
        let enc = tdes_encrypt_cbc(&data, &KEY, &ZERO_IV).unwrap();

        assert_eq!(enc.len(), 16);
        assert_eq!(hex::encode(&enc[..8]), "2a3d408a1977dde9");
        // identical plaintext blocks must not leak through the chaining
        assert_ne!(enc[..8], enc[8..]);
        assert_eq!(tdes_decrypt_cbc(&enc, &KEY, &ZERO_IV).unwrap(), data.to_vec());
    }

    #[test]
    fn test_cbc_rejects_partial_block() {
        match tdes_encrypt_cbc(&hex!("01020304050607080910"), &KEY, &ZERO_IV) {
            Ok(_) => assert!(false, "partial block accepted"),
            Err(e) => assert_eq!(e.kind, ErrorKind::InvalidDataLength),
        }
    }
}
