//! Attack scenarios: built-in lab setups and their YAML representation

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::attack::{AttackConfig, MAX_PIN};
use crate::crypto::dukpt::{DukptKeyManager, DukptPinBlock};
use crate::crypto::pin::{build_pin_block, generate_pin_block, PinFormat};
use crate::crypto::{decode_hex, ErrorKind, PinError, BLOCK_SIZE};

pub const DEFAULT_SCENARIO: &str = "static_key";

lazy_static! {
static ref ALL_SCENARIOS: HashMap<String, Scenario> = {

    let mut scenarios = HashMap::new();

    scenarios.insert("static_key".to_string(), Scenario {
        name: "static_key".to_string(),
        pan: "4111111111111111".to_string(),
        pin: "1234".to_string(),
        key: "0123456789ABCDEFFEDCBA9876543210".to_string(),
        max_pin: MAX_PIN,
    });

    scenarios.insert("static_key_triple_length".to_string(), Scenario {
        name: "static_key_triple_length".to_string(),
        pan: "5500000000000004".to_string(),
        pin: "8077".to_string(),
        key: "8A3B5C7D9E1F2A4B6C8D0E1F2A3B4C5D7E9F1A2B3C4D5E6F".to_string(),
        max_pin: MAX_PIN,
    });

    scenarios.insert("long_pan".to_string(), Scenario {
        name: "long_pan".to_string(),
        pan: "6011000990139424123".to_string(),
        pin: "0420".to_string(),
        key: "0123456789ABCDEFFEDCBA9876543210".to_string(),
        max_pin: MAX_PIN,
    });

    scenarios
};
}

/// A simulated capture: the victim's PAN and PIN, and the terminal's static key
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub pan: String,
    pub pin: String,
    pub key: String,
    pub max_pin: u32,
}

impl Scenario {
    /// Encrypts the scenario's PIN block the way the terminal would, i.e. what an attacker sniffs
    /// on the wire (uppercase hex)
    pub fn simulate_capture(&self) -> Result<String, PinError> {
        let key = decode_hex("key", &self.key)?;
        let pin_block = generate_pin_block(&PinFormat::ISO0, &self.pin, &self.pan, &key)?;
        Ok(hex::encode_upper(pin_block))
    }

    /// The attacker's view of this scenario: everything but the PIN
    pub fn attack_config(&self) -> Result<AttackConfig, PinError> {
        Ok(AttackConfig {
            pin_block_hex: self.simulate_capture()?,
            key_hex: self.key.clone(),
            pan: self.pan.clone(),
            max_pin: self.max_pin,
        })
    }

    /// The same PIN entered `count` times on a terminal that has moved to DUKPT
    pub fn simulate_dukpt_captures(&self, bdk: &[u8], terminal_id: &str, count: usize) -> Result<Vec<DukptPinBlock>, PinError> {
        let clear = build_pin_block(&self.pin, &self.pan)?;
        let mut terminal = DukptKeyManager::new(bdk);
        (0..count).map(|_| terminal.encrypt_pin_block(&clear, terminal_id)).collect()
    }

    /// An attack on `pin_block` that still assumes the scenario's static key
    pub fn replay_config(&self, pin_block: &[u8; BLOCK_SIZE]) -> AttackConfig {
        AttackConfig {
            pin_block_hex: hex::encode_upper(pin_block),
            key_hex: self.key.clone(),
            pan: self.pan.clone(),
            max_pin: self.max_pin,
        }
    }
}

/// Returns a built-in scenario by name
pub fn scenario(name: &str) -> Result<&'static Scenario, PinError> {
    ALL_SCENARIOS.get(name)
        .ok_or_else(|| PinError::new(ErrorKind::Config, format!("no such scenario: {}", name)))
}

pub fn scenario_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ALL_SCENARIOS.keys().map(|k| k.as_str()).collect();
    names.sort();
    names
}

/// The YAML layout of a scenario. A missing `pin` means "pick one at random".
#[derive(Serialize, Deserialize)]
pub struct YScenario {
    pub name: String,
    pub pan: String,
    pub pin: Option<String>,
    pub key: String,
    pub max_pin: Option<u32>,
}

impl From<YScenario> for Scenario {
    fn from(y: YScenario) -> Scenario {
        let pin = match y.pin {
            Some(pin) => pin,
            None => {
                debug!("scenario {} has no pin, drawing a random one", y.name);
                random_pin()
            }
        };

        Scenario {
            name: y.name,
            pan: y.pan,
            pin,
            key: y.key,
            max_pin: y.max_pin.unwrap_or(MAX_PIN),
        }
    }
}

/// A uniformly drawn 4-digit PIN
pub fn random_pin() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..=MAX_PIN))
}

pub fn parse_scenario(yaml_str: &str) -> Result<Scenario, PinError> {
    match serde_yaml::from_str::<YScenario>(yaml_str) {
        Ok(y_scenario) => Ok(y_scenario.into()),
        Err(e) => Err(PinError::new(ErrorKind::Config, e.to_string())),
    }
}

pub fn read_scenario(scenario_file: &str) -> Result<Scenario, PinError> {
    match std::fs::read_to_string(scenario_file) {
        Ok(yaml_str) => parse_scenario(&yaml_str),
        Err(e) => Err(PinError::new(ErrorKind::Config, format!("{}: {}", scenario_file, e))),
    }
}
