//! Configuration for the H5 link.
//!
//! All handshake and retransmission timing is configurable rather than
//! baked in; the vendor references disagree on these values, so boards
//! are expected to tune them. Defaults follow the common 250 ms choice.

use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{H5Error, Result};

/// Main configuration structure for an H5 link.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct H5Config {
   /// Sliding window advertised in our CONFIG_REQ (1..=7).
   #[serde(default = "default_tx_window")]
   pub tx_window: u8,

   /// Delay before the unacked queue is retransmitted, in milliseconds.
   #[serde(default = "default_retransmit_timeout")]
   pub retransmit_timeout_ms: u64,

   /// Delay before a pure ACK frame is sent for received reliable
   /// traffic, in milliseconds. An outgoing data frame within this
   /// window piggy-backs the ack instead.
   #[serde(default = "default_ack_delay")]
   pub ack_delay_ms: u64,

   /// Interval between SYNC/CONFIG handshake re-attempts, in
   /// milliseconds.
   #[serde(default = "default_sync_retry")]
   pub sync_retry_ms: u64,

   /// Discard frames whose header checksum does not match. Lenient mode
   /// logs the mismatch and processes the frame anyway.
   #[serde(default = "default_strict_checksum")]
   pub strict_checksum: bool,

   /// Depth of the outbound HCI packet queue.
   #[serde(default = "default_tx_queue_depth")]
   pub tx_queue_depth: usize,
}

const fn default_tx_window() -> u8 {
   4
}

const fn default_retransmit_timeout() -> u64 {
   250
}

const fn default_ack_delay() -> u64 {
   50
}

const fn default_sync_retry() -> u64 {
   250
}

const fn default_strict_checksum() -> bool {
   true
}

const fn default_tx_queue_depth() -> usize {
   64
}

impl Default for H5Config {
   fn default() -> Self {
      Self {
         tx_window: default_tx_window(),
         retransmit_timeout_ms: default_retransmit_timeout(),
         ack_delay_ms: default_ack_delay(),
         sync_retry_ms: default_sync_retry(),
         strict_checksum: default_strict_checksum(),
         tx_queue_depth: default_tx_queue_depth(),
      }
   }
}

impl H5Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         Self::load_from(&config_path)
      } else {
         // Create default config
         let config = Self::default();
         config.save_to(&config_path)?;
         Ok(config)
      }
   }

   /// Loads configuration from the given path.
   pub fn load_from(path: &Path) -> Result<Self> {
      let contents = fs::read_to_string(path)?;
      Ok(toml::from_str(&contents)?)
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   /// Saves the current configuration to the given path.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      // Ensure directory exists
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(h5_home) = env::var("H5_HOME") {
         PathBuf::from(h5_home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(H5Error::ConfigDirNotFound);
      };

      Ok(config_dir.join("hci-h5").join("config.toml"))
   }

   /// Advertised window clamped to the 3-bit field, never zero.
   pub fn window(&self) -> u8 {
      self.tx_window.clamp(1, 7)
   }

   pub fn retransmit_timeout(&self) -> Duration {
      Duration::from_millis(self.retransmit_timeout_ms)
   }

   pub fn ack_delay(&self) -> Duration {
      Duration::from_millis(self.ack_delay_ms)
   }

   pub fn sync_retry(&self) -> Duration {
      Duration::from_millis(self.sync_retry_ms)
   }
}
