//! Console rendering of an attack run

use crate::attack::AttackResult;
use crate::crypto::dukpt::DukptPinBlock;
use crate::crypto::weak_key::KeyReport;

const WIDTH: usize = 60;

pub fn mask_pan(pan: &str) -> String {
    match pan.len().checked_sub(4).and_then(|i| pan.get(i..)) {
        Some(last4) => format!("****{}", last4),
        None => "****".to_string(),
    }
}

/// Shows at most the first 16 hex chars of a key, never more than half of it
pub fn redact_key(key_hex: &str) -> String {
    let shown = (key_hex.len() / 2).min(16);
    format!("{}...", key_hex.get(..shown).unwrap_or(""))
}

fn rule(c: char) -> String {
    c.to_string().repeat(WIDTH)
}

pub fn print_banner() {
    println!("{}", rule('='));
    println!("  PIN CRACKER - static key PIN block brute force");
    println!("  for training use only");
    println!("{}", rule('='));
}

pub fn print_capture(captured_hex: &str, pan: &str, key_hex: &str) {
    println!();
    println!("  captured data:");
    println!("   encrypted PIN block: {}", captured_hex.to_uppercase());
    println!("   PAN (known):         {}", mask_pan(pan));
    println!("   key (static):        {}", redact_key(key_hex));
}

pub fn print_search_start(max_pin: u32) {
    println!();
    println!("  starting brute force...");
    println!("   trying {} candidates (0000-{:04})...", max_pin + 1, max_pin);
}

pub fn print_result(result: &AttackResult) {
    println!();
    match result.pin() {
        Some(pin) if result.found() => {
            println!("{}", rule('='));
            println!("  PIN FOUND!");
            println!("{}", rule('='));
            println!("   PIN:      {}", pin);
            println!("   attempts: {}", result.attempts());
            println!("   duration: {:?}", result.duration());
        }
        _ => {
            println!("  PIN not found (search range exhausted after {} attempts)", result.attempts());
        }
    }
}

pub fn print_key_report(report: &KeyReport) {
    println!();
    println!("  key analysis: {} bits, entropy {:.2} bits/byte", report.key_bits, report.entropy);
    if !report.is_vulnerable() {
        println!("   no weakness found");
    }
    for issue in &report.issues {
        println!("   {}", issue);
    }
}

pub fn print_lesson() {
    println!();
    println!("{}", rule('-'));
    println!("  WHY THIS ATTACK WORKS:");
    println!("{}", rule('-'));
    println!();
    println!("  1. the encryption key is STATIC (never changes)");
    println!("  2. the PIN space is SMALL (only 10000 combinations)");
    println!("  3. the attacker can test OFFLINE (no lockout, no retry counter)");
    println!();
    println!("  FIX: use DUKPT (Derived Unique Key Per Transaction) so every");
    println!("  PIN block is encrypted under a fresh session key");
}

pub fn print_fix_header(terminal_id: &str) {
    println!();
    println!("{}", rule('-'));
    println!("  SAME PIN, SAME CARD, TERMINAL {} NOW ON DUKPT:", terminal_id);
    println!("{}", rule('-'));
}

pub fn transaction_line(block: &DukptPinBlock) -> String {
    format!("   #{:<3} KSN {}  PIN block {}", block.ksn.counter(), block.ksn, hex::encode_upper(block.pin_block))
}

pub fn print_dukpt_transaction(block: &DukptPinBlock) {
    println!("{}", transaction_line(block));
}

pub fn print_fix_result(result: &AttackResult) {
    println!();
    if result.found() {
        println!("  static key replay matched PIN {} after {} attempts", result.pin().unwrap_or(""), result.attempts());
    } else {
        println!("  static key replay: no match in {} attempts, the captured block is useless", result.attempts());
    }
    println!();
    println!("{}", rule('='));
}


#[cfg(test)]
mod tests {
    use crate::crypto::dukpt::{DukptPinBlock, Ksn};
    use crate::report::{mask_pan, redact_key, transaction_line};

    #[test]
    fn test_mask_pan() {
        assert_eq!(mask_pan("4111111111111111"), "****1111");
        assert_eq!(mask_pan("6011000990139424123"), "****4123");
        assert_eq!(mask_pan("123"), "****");
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key("0123456789ABCDEFFEDCBA9876543210"), "0123456789ABCDEF...");
        assert_eq!(redact_key("0123456789ABCDEFFEDCBA987654321089ABCDEF01234567"), "0123456789ABCDEF...");
        assert_eq!(redact_key("01234567"), "0123...");
    }

    #[test]
    fn test_transaction_line() {
        let block = DukptPinBlock {
            ksn: Ksn::new("TERM-001", 1).unwrap(),
            pin_block: [0xF9, 0xA9, 0x31, 0xE6, 0x1E, 0xBC, 0x99, 0xA3],
        };
        assert_eq!(transaction_line(&block), "   #1   KSN 9E6F208FAFF50B000001  PIN block F9A931E61EBC99A3");
    }
}
