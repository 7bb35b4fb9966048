#[macro_use]
extern crate lazy_static;
extern crate hex;

#[macro_use]
extern crate log;
extern crate serde_yaml;

pub mod attack;
pub mod crypto;
pub mod report;
