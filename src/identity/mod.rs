use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FALLBACK_MAC: &str = "00:00:00:00:00:00";

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn first_interface_mac() -> Option<[u8; 6]> {
    let networks = sysinfo::Networks::new_with_refreshed_list();
    let mut macs: Vec<[u8; 6]> = networks
        .iter()
        .map(|(_, data)| data.mac_address().0)
        .filter(|mac| mac.iter().any(|b| *b != 0))
        .collect();
    macs.sort();
    macs.into_iter().next()
}

pub fn mac_address() -> String {
    match first_interface_mac() {
        Some(mac) => mac
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
        None => FALLBACK_MAC.to_string(),
    }
}

pub fn machine_code() -> String {
    match first_interface_mac() {
        Some(mac) => {
            let node = mac.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
            sha256_hex(&node.to_string())
        }
        // non-deterministic fallback, allowed to differ between calls
        None => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            sha256_hex(&now.to_string())
        }
    }
}

pub fn device_id(mac: &str, machine_code: &str) -> String {
    let clean_mac = mac.replace(':', "");
    sha256_hex(&format!("{clean_mac}_{machine_code}0"))
}

/// Host identity captured once at startup and reused for every payload.
#[derive(Clone, Debug)]
pub struct Identity {
    pub mac_address: String,
    pub machine_code: String,
    pub device_id: String,
    pub platform: String,
    pub arch: String,
}

impl Identity {
    pub fn detect() -> Self {
        let mac = mac_address();
        let code = machine_code();
        let device = device_id(&mac, &code);
        Self {
            mac_address: mac,
            machine_code: code,
            device_id: device,
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}
