//! Router connection options and SSH algorithm lists.
//!
//! [`RouterConfig`] carries everything a [`DdWrtClient`](crate::DdWrtClient)
//! needs at construction time. It deserializes with defaults, so a host name
//! alone is a valid configuration.
//!
//! The algorithm lists at the bottom feed the SSH transport's security
//! profiles. DD-WRT ships dropbear, which on older builds only speaks the
//! legacy Diffie-Hellman groups and CBC ciphers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::transport::SecurityLevel;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Upper bound for every shell command round trip, in seconds.
pub const COMMAND_TIMEOUT_SECS: u64 = 9;

/// Lifetime of a cached byte-total reading, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5;

/// Minimum spacing between two transfer-rate computations, in seconds.
pub const RATE_FLOOR_SECS: u64 = 30;

/// Transport used to reach the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ssh,
    Telnet,
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::Telnet => "telnet",
            Protocol::Http => "http",
        }
    }

    /// Port used when none is configured. HTTP always targets the host as given.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Protocol::Ssh => Some(DEFAULT_SSH_PORT),
            Protocol::Telnet => Some(DEFAULT_TELNET_PORT),
            Protocol::Http => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" => Ok(Protocol::Ssh),
            "telnet" => Ok(Protocol::Telnet),
            "http" => Ok(Protocol::Http),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Role of the DD-WRT box on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Runs the DHCP server, so leases are merged into the directory.
    #[default]
    Router,
    /// Plain access point without a DHCP server; leases are skipped.
    #[serde(alias = "ap")]
    AccessPoint,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "router" => Ok(Mode::Router),
            "ap" | "access_point" | "access-point" => Ok(Mode::AccessPoint),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// How DHCP leases are folded into the device directory in router mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaseMergePolicy {
    /// Leases only add IP and name to MACs already seen on wireless or ARP.
    #[default]
    EnrichKnown,
    /// Every lease is added, including MACs no other source reported.
    AddAll,
}

/// Construction-time options for a router client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RouterConfig {
    /// Host name or address. For HTTP it may include `:port`.
    pub host: String,
    /// SSH/Telnet port. Falls back to the protocol default.
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Private key for SSH. Takes precedence over the password when set.
    pub key_file: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub mode: Mode,
    /// Drop directory entries that have no IP address.
    pub require_ip: bool,
    pub lease_policy: LeaseMergePolicy,
    /// Byte-total cache lifetime in milliseconds. Zero disables the cache.
    pub cache_ttl_ms: u64,
    /// Shell command timeout in milliseconds.
    pub command_timeout_ms: u64,
    /// Transfer-rate sampling floor in milliseconds.
    pub rate_floor_ms: u64,
    /// SSH algorithm policy.
    pub security: SecurityLevel,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            protocol: Protocol::Ssh,
            username: None,
            password: None,
            key_file: None,
            key_passphrase: None,
            mode: Mode::Router,
            require_ip: true,
            lease_policy: LeaseMergePolicy::EnrichKnown,
            cache_ttl_ms: DEFAULT_CACHE_TTL_SECS * 1000,
            command_timeout_ms: COMMAND_TIMEOUT_SECS * 1000,
            rate_floor_ms: RATE_FLOOR_SECS * 1000,
            security: SecurityLevel::LegacyCompatible,
        }
    }
}

impl RouterConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn require_ip(mut self, require_ip: bool) -> Self {
        self.require_ip = require_ip;
        self
    }

    pub fn lease_policy(mut self, policy: LeaseMergePolicy) -> Self {
        self.lease_policy = policy;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = millis(ttl);
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = millis(timeout);
        self
    }

    pub fn rate_floor(mut self, floor: Duration) -> Self {
        self.rate_floor_ms = millis(floor);
        self
    }

    pub fn security(mut self, level: SecurityLevel) -> Self {
        self.security = level;
        self
    }

    /// Port actually dialed, if the protocol uses one.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or(self.protocol.default_port())
    }

    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Zero is clamped to one second so a misconfiguration cannot disable the bound.
    pub fn command_timeout_duration(&self) -> Duration {
        match self.command_timeout_ms {
            0 => Duration::from_secs(1),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn rate_floor_duration(&self) -> Duration {
        Duration::from_millis(self.rate_floor_ms)
    }
}

/// Whole milliseconds of `duration`, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Modern key exchange algorithms.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Modern key exchange plus the 2048-bit SHA-1 group.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Modern key exchange plus the SHA-1 groups older dropbear builds offer.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_GEX_SHA1,
    kex::DH_G1_SHA1,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] =
    &[compression::NONE, compression::ZLIB, compression::ZLIB_LEGACY];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

/// Adds plain `ssh-rsa` (SHA-1) host keys.
pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

/// Adds plain `ssh-rsa` (SHA-1) and DSA host keys.
pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_follow_protocol() {
        assert_eq!(RouterConfig::new("r").effective_port(), Some(22));
        assert_eq!(
            RouterConfig::new("r").protocol(Protocol::Telnet).effective_port(),
            Some(23)
        );
        assert_eq!(
            RouterConfig::new("r").protocol(Protocol::Http).effective_port(),
            None
        );
        assert_eq!(
            RouterConfig::new("r").port(2222).effective_port(),
            Some(2222)
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: RouterConfig =
            serde_json::from_str(r#"{"host":"192.168.1.1","protocol":"telnet","mode":"ap"}"#)
                .expect("parse config");
        assert_eq!(config.host, "192.168.1.1");
        assert_eq!(config.protocol, Protocol::Telnet);
        assert_eq!(config.mode, Mode::AccessPoint);
        assert_eq!(config.cache_ttl_duration(), Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        assert_eq!(
            config.command_timeout_duration(),
            Duration::from_secs(COMMAND_TIMEOUT_SECS)
        );
        assert_eq!(config.rate_floor_duration(), Duration::from_secs(RATE_FLOOR_SECS));
        assert_eq!(config.lease_policy, LeaseMergePolicy::EnrichKnown);
        assert!(config.require_ip);
    }

    #[test]
    fn parses_protocol_and_mode_names() {
        assert_eq!("HTTP".parse::<Protocol>(), Ok(Protocol::Http));
        assert_eq!("access-point".parse::<Mode>(), Ok(Mode::AccessPoint));
        assert!("ftp".parse::<Protocol>().is_err());
    }

    #[test]
    fn zero_command_timeout_is_clamped() {
        let config = RouterConfig::new("r").command_timeout(Duration::ZERO);
        assert_eq!(config.command_timeout_duration(), Duration::from_secs(1));
    }

    #[test]
    fn sub_second_durations_are_kept() {
        let config = RouterConfig::new("r")
            .cache_ttl(Duration::from_millis(500))
            .command_timeout(Duration::from_millis(1500))
            .rate_floor(Duration::from_millis(250));
        assert_eq!(config.cache_ttl_duration(), Duration::from_millis(500));
        assert_eq!(config.command_timeout_duration(), Duration::from_millis(1500));
        assert_eq!(config.rate_floor_duration(), Duration::from_millis(250));
    }
}
