//https://www.eftlab.com/knowledge-base/261-complete-list-of-pin-blocks-in-payments/

use crate::crypto::{decode_hex, xor_blocks, ErrorKind, PinError, TdesKey, BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFormat {
    ISO0,
    //ANSI X9.8, ECI-4
    ISO1,
    ISO2,
    ISO3,
    ISO4,
}

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 12;
pub const MIN_PAN_LEN: usize = 13;
pub const MAX_PAN_LEN: usize = 19;

/// Builds and encrypts a PIN block. `key` is a 16 or 24 byte Triple-DES key.
pub fn generate_pin_block(fmt: &PinFormat, c_pin: &str, pan: &str, key: &[u8]) -> Result<[u8; BLOCK_SIZE], PinError> {
    match fmt {
        PinFormat::ISO0 => {
            let clear = build_pin_block(c_pin, pan)?;
            Ok(TdesKey::new(key)?.encrypt(&clear))
        }
        _ => {
            Err(PinError::new(ErrorKind::UnsupportedFormat, format!("{:?} is not supported yet.", fmt)))
        }
    }
}

/// Decrypts a PIN block and returns the clear PIN it carries
pub fn decode_pin_block(fmt: &PinFormat, pin_block: &[u8; BLOCK_SIZE], pan: &str, key: &[u8]) -> Result<String, PinError> {
    match fmt {
        PinFormat::ISO0 => {
            let clear = TdesKey::new(key)?.decrypt(pin_block);
            extract_pin(&clear, pan)
        }
        _ => {
            Err(PinError::new(ErrorKind::UnsupportedFormat, format!("{:?} is not supported yet.", fmt)))
        }
    }
}

/// Builds the clear ISO-0 PIN block: PIN field XOR PAN field.
pub fn build_pin_block(c_pin: &str, pan: &str) -> Result<[u8; BLOCK_SIZE], PinError> {
    let b1 = pin_field(c_pin)?;
    let b2 = pan_field(pan)?;
    Ok(xor_blocks(&b1, &b2))
}

/// Control nibble 0, length nibble, PIN digits, F filler
pub fn pin_field(c_pin: &str) -> Result<[u8; BLOCK_SIZE], PinError> {
    validate_pin(c_pin)?;

    let mut b1 = format!("0{:X}{}", c_pin.len(), c_pin);
    pad_8(&mut b1);
    hex_block(&b1)
}

/// 0000 followed by the rightmost 12 PAN digits excluding the check digit
pub fn pan_field(pan: &str) -> Result<[u8; BLOCK_SIZE], PinError> {
    validate_pan(pan)?;

    //rightmost 12 not including check digit
    let mut b2 = String::from("0000");
    b2.push_str(&pan[pan.len() - 13..pan.len() - 1]);
    hex_block(&b2)
}

/// Recovers the PIN from a clear ISO-0 PIN block
pub fn extract_pin(clear_block: &[u8; BLOCK_SIZE], pan: &str) -> Result<String, PinError> {
    let b1 = hex::encode_upper(xor_blocks(clear_block, &pan_field(pan)?));

    if !b1.starts_with('0') {
        return Err(PinError::new(ErrorKind::InvalidPinBlock, format!("control field is {}, expected 0", &b1[..1])));
    }

    let pin_len = usize::from_str_radix(&b1[1..2], 16).unwrap_or(0);
    if pin_len < MIN_PIN_LEN || pin_len > MAX_PIN_LEN {
        return Err(PinError::new(ErrorKind::InvalidPinBlock, format!("pin length {} out of range", pin_len)));
    }

    let pin = &b1[2..2 + pin_len];
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::new(ErrorKind::InvalidPinBlock, "pin field holds non decimal digits"));
    }
    if !b1[2 + pin_len..].bytes().all(|b| b == b'F') {
        return Err(PinError::new(ErrorKind::InvalidPinBlock, "bad filler after pin digits"));
    }

    Ok(pin.to_string())
}

fn validate_pin(c_pin: &str) -> Result<(), PinError> {
    if c_pin.len() < MIN_PIN_LEN || c_pin.len() > MAX_PIN_LEN || !c_pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::new(ErrorKind::InvalidPin,
                                 format!("pin must be {} to {} decimal digits", MIN_PIN_LEN, MAX_PIN_LEN)));
    }
    Ok(())
}

fn validate_pan(pan: &str) -> Result<(), PinError> {
    if pan.len() < MIN_PAN_LEN || pan.len() > MAX_PAN_LEN || !pan.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::new(ErrorKind::InvalidPan,
                                 format!("pan must be {} to {} decimal digits, got {} chars", MIN_PAN_LEN, MAX_PAN_LEN, pan.len())));
    }
    Ok(())
}

fn hex_block(data: &str) -> Result<[u8; BLOCK_SIZE], PinError> {
    let raw = decode_hex("pin block field", data)?;
    let mut block = [0u8; BLOCK_SIZE];
    if raw.len() != BLOCK_SIZE {
        return Err(PinError::new(ErrorKind::InvalidPinBlock, format!("field {} is not {} bytes", data, BLOCK_SIZE)));
    }
    block.copy_from_slice(&raw);
    Ok(block)
}

//pad with 'F' filler to make it 8 bytes
fn pad_8(data: &mut String) {
    data.push_str("FFFFFFFFFFFFFFFF");
    data.truncate(16);
}
