//! Device fingerprinting for license binding.
//!
//! Generates a stable hardware id that identifies this machine. The authority
//! stores it alongside the subscription; a different id on a later check
//! means the license is being used somewhere else.

use crate::error::{ActivationError, ActivationResult};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use licensor_types::HardwareId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Source of the current machine's hardware id.
pub trait HardwareIdSource: Send + Sync {
    /// Computes the id fresh; implementations must not cache across calls
    /// in a way that hides a hardware change.
    fn hardware_id(&self) -> ActivationResult<HardwareId>;
}

/// Information about the current device, sent nowhere but useful in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub os_name: String,
    pub hostname: String,
    pub arch: String,
}

impl DeviceInfo {
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            hostname: get_hostname(),
            arch: env::consts::ARCH.to_string(),
        }
    }
}

/// A stable fingerprint of this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    id: String,
}

impl DeviceFingerprint {
    /// Hashes the machine's identifying components.
    ///
    /// The result survives reboots but changes when the machine id or
    /// hostname changes.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_components(&collect_hardware_ids())
    }

    /// Hashes an explicit component list.
    #[must_use]
    pub fn from_components(components: &[String]) -> Self {
        let combined = components.join("|");
        let hash = Sha256::digest(combined.as_bytes());
        Self {
            id: BASE64.encode(&hash[..16]),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Converts into the wire identifier.
    pub fn to_hardware_id(&self) -> ActivationResult<HardwareId> {
        HardwareId::new(&self.id).map_err(|e| ActivationError::HardwareId(e.to_string()))
    }
}

/// Fingerprint of the machine this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDevice;

impl HardwareIdSource for LocalDevice {
    fn hardware_id(&self) -> ActivationResult<HardwareId> {
        DeviceFingerprint::generate().to_hardware_id()
    }
}

/// Always reports the same id.
#[derive(Debug, Clone)]
pub struct FixedHardwareId(HardwareId);

impl FixedHardwareId {
    #[must_use]
    pub fn new(id: HardwareId) -> Self {
        Self(id)
    }
}

impl HardwareIdSource for FixedHardwareId {
    fn hardware_id(&self) -> ActivationResult<HardwareId> {
        Ok(self.0.clone())
    }
}

fn collect_hardware_ids() -> Vec<String> {
    let mut ids = vec![
        env::consts::OS.to_string(),
        env::consts::ARCH.to_string(),
        get_hostname(),
    ];

    if let Some(machine_id) = get_machine_id() {
        ids.push(machine_id);
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    ids
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("MachineGuid"))
                    .and_then(|l| l.split_whitespace().last())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
