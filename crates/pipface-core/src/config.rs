//! Configuration: YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILENAME: &str = "pipface.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Loopback address both sockets use
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// Inbound command datagrams
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Outbound acknowledgement datagrams
    #[serde(default = "default_ack_port")]
    pub ack_port: u16,

    /// Tick rate for active expressions
    #[serde(default = "default_fps_active")]
    pub fps_active: u32,

    /// Tick rate for idle/sleeping
    #[serde(default = "default_fps_idle")]
    pub fps_idle: u32,

    /// Inactivity before falling asleep
    #[serde(default = "default_sleep_timeout")]
    pub sleep_timeout_seconds: u64,

    /// Exponential approach rate (per second)
    #[serde(default = "default_blend_rate")]
    pub blend_rate: f32,

    /// Live particle cap, oldest evicted first
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,

    #[serde(default = "default_canvas_width")]
    pub canvas_width: f32,

    #[serde(default = "default_canvas_height")]
    pub canvas_height: f32,

    /// Pointer distance (px) that deflects pupils fully
    #[serde(default = "default_pointer_range")]
    pub pointer_range: f32,

    /// Pointer distance (px) beyond which pupils micro-saccade
    #[serde(default = "default_saccade_distance")]
    pub saccade_distance: f32,

    /// Fixed RNG seed for reproducible animation
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_bind_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_command_port() -> u16 {
    5555
}
fn default_ack_port() -> u16 {
    5556
}
fn default_fps_active() -> u32 {
    30
}
fn default_fps_idle() -> u32 {
    20
}
fn default_sleep_timeout() -> u64 {
    300
}
fn default_blend_rate() -> f32 {
    8.0
}
fn default_max_particles() -> usize {
    256
}
fn default_canvas_width() -> f32 {
    400.0
}
fn default_canvas_height() -> f32 {
    300.0
}
fn default_pointer_range() -> f32 {
    200.0
}
fn default_saccade_distance() -> f32 {
    400.0
}

fn env_override<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => warn!("Ignoring unparseable {}={}", var, raw),
        }
    }
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load config from the default location (dir/pipface.yaml)
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load(&dir.join(CONFIG_FILENAME))
    }

    pub fn apply_env(&mut self) {
        env_override("PIPFACE_HOST", &mut self.bind_host);
        env_override("PIPFACE_COMMAND_PORT", &mut self.command_port);
        env_override("PIPFACE_ACK_PORT", &mut self.ack_port);
        env_override("PIPFACE_SLEEP_TIMEOUT", &mut self.sleep_timeout_seconds);
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps_active == 0 || self.fps_idle == 0 {
            anyhow::bail!("fps_active and fps_idle must be positive");
        }
        if self.command_port == self.ack_port {
            anyhow::bail!(
                "command_port and ack_port must differ (both {})",
                self.command_port
            );
        }
        if self.blend_rate.is_nan() || self.blend_rate <= 0.0 {
            anyhow::bail!("blend_rate must be positive, got {}", self.blend_rate);
        }
        Ok(())
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.command_port)
    }

    pub fn ack_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.ack_port)
    }

    pub fn sleep_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_timeout_seconds)
    }

    pub fn fps_for(&self, low_activity: bool) -> u32 {
        if low_activity {
            self.fps_idle
        } else {
            self.fps_active
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            command_port: default_command_port(),
            ack_port: default_ack_port(),
            fps_active: default_fps_active(),
            fps_idle: default_fps_idle(),
            sleep_timeout_seconds: default_sleep_timeout(),
            blend_rate: default_blend_rate(),
            max_particles: default_max_particles(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            pointer_range: default_pointer_range(),
            saccade_distance: default_saccade_distance(),
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_defaults() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "max_particles: 128").unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.max_particles, 128);
        assert_eq!(config.fps_active, 30);
        assert_eq!(config.fps_idle, 20);
        assert_eq!(config.blend_rate, 8.0);
        assert_eq!(config.command_addr().to_string(), "127.0.0.1:5555");
    }

    #[test]
    fn test_load_config_custom_values() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "fps_active: 60\nfps_idle: 10\nblend_rate: 4.5\nrng_seed: 42\ncanvas_width: 640"
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.fps_active, 60);
        assert_eq!(config.fps_idle, 10);
        assert_eq!(config.blend_rate, 4.5);
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(config.canvas_width, 640.0);
        assert_eq!(config.fps_for(true), 10);
    }

    #[test]
    fn test_same_ports_fail() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "command_port: 6000\nack_port: 6000").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn test_zero_fps_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "fps_idle: 0").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }
}
