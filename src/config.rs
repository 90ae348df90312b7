use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::index::Blacklist;

/// Ordering applied to each published photo-index snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhotoOrdering {
    /// Stable lexicographic path order; rotation is reproducible across rescans.
    Lexicographic,
    /// Fresh shuffle on every rescan.
    Shuffled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Root directory to scan recursively for castable photos.
    pub photo_library_path: PathBuf,
    /// Friendly name of the cast device to drive.
    pub device_name: String,
    /// Address the cast device can reach this host on; used for photo URLs.
    pub local_ip: IpAddr,
    /// Port the photo server listens on.
    pub listening_port: u16,
    /// Directory-name substrings excluded from indexing, `;`-separated.
    pub blacklist: Blacklist,
    /// How often the photo library is rescanned.
    #[serde(with = "humantime_serde")]
    pub photo_index_interval: Duration,
    /// How often device reachability is probed.
    #[serde(with = "humantime_serde")]
    pub cast_check_interval: Duration,
    /// How long each photo stays on screen.
    #[serde(with = "humantime_serde")]
    pub next_photo_interval: Duration,
    /// Photo ordering within each snapshot.
    pub ordering: PhotoOrdering,
    /// Optional deterministic seed for shuffled ordering.
    pub shuffle_seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading configuration from {}", path.as_ref().display()))?;
        serde_yaml::from_str(&raw).context("parsing configuration YAML")
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.photo_library_path.as_os_str().is_empty(),
            "photo-library-path must be set"
        );
        ensure!(!self.device_name.trim().is_empty(), "device-name must be set");
        ensure!(self.listening_port > 0, "listening-port must be non-zero");
        ensure!(
            self.photo_index_interval > Duration::ZERO,
            "photo-index-interval must be positive"
        );
        ensure!(
            self.cast_check_interval > Duration::ZERO,
            "cast-check-interval must be positive"
        );
        ensure!(
            self.next_photo_interval > Duration::ZERO,
            "next-photo-interval must be positive"
        );
        Ok(self)
    }

    /// Address the photo server binds; photos must be fetchable from the device.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listening_port))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            photo_library_path: PathBuf::new(),
            device_name: String::new(),
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listening_port: 8080,
            blacklist: Blacklist::default(),
            photo_index_interval: Duration::from_secs(15 * 60),
            cast_check_interval: Duration::from_secs(30),
            next_photo_interval: Duration::from_secs(30),
            ordering: PhotoOrdering::Lexicographic,
            shuffle_seed: None,
        }
    }
}
