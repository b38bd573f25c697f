//! Configuration: file loading and the live store.
//!
//! `Config::load` merges an embedded default file with an optional user file;
//! `ConfigStore` holds the live `DiscConfig` behind a version counter so the
//! geometry cache knows when to recompute.

use std::path::PathBuf;

use serde::Deserialize;

use whorl_types::DiscConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    disc: DiscDefaults,
    #[serde(default)]
    runtime: RuntimeConfig,
}

#[derive(Deserialize, Default)]
struct DiscDefaults {
    slice_count: Option<usize>,
    rotation_deg: Option<f32>,
    drone_lock_ms: Option<u64>,
    ring_ratio: Option<f32>,
    ring_pct: Option<f32>,
    pinch_step_px: Option<f32>,
    radius_pct: Option<f32>,
    center_dx: Option<f32>,
    center_dy: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    key_release_ms: Option<u64>,
    osc_addr: Option<String>,
}

pub struct Config {
    disc: DiscDefaults,
    runtime: RuntimeConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            merge_disc(&mut base.disc, user.disc);
                            merge_runtime(&mut base.runtime, user.runtime);
                        }
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            disc: base.disc,
            runtime: base.runtime,
        }
    }

    /// Disc parameters with file values over built-in defaults, clamped and
    /// normalized.
    pub fn disc(&self) -> DiscConfig {
        let fallback = DiscConfig::default();
        DiscConfig {
            slice_count: DiscConfig::clamp_slice_count(
                self.disc.slice_count.unwrap_or(fallback.slice_count) as i64,
            ),
            rotation_deg: DiscConfig::normalize_rotation(
                self.disc.rotation_deg.unwrap_or(fallback.rotation_deg),
            ),
            drone_lock_ms: self.disc.drone_lock_ms.unwrap_or(fallback.drone_lock_ms),
            ring_ratio: self.disc.ring_ratio.unwrap_or(fallback.ring_ratio),
            ring_pct: self.disc.ring_pct.unwrap_or(fallback.ring_pct),
            pinch_step_px: self.disc.pinch_step_px.unwrap_or(fallback.pinch_step_px),
            radius_pct: self.disc.radius_pct.unwrap_or(fallback.radius_pct),
            center_dx: self.disc.center_dx.unwrap_or(fallback.center_dx),
            center_dy: self.disc.center_dy.unwrap_or(fallback.center_dy),
        }
    }

    pub fn key_release_ms(&self) -> u64 {
        self.runtime.key_release_ms.unwrap_or(250)
    }

    pub fn osc_addr(&self) -> String {
        self.runtime
            .osc_addr
            .clone()
            .unwrap_or_else(|| "127.0.0.1:57120".to_string())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("whorl").join("config.toml"))
}

fn merge_disc(base: &mut DiscDefaults, user: DiscDefaults) {
    if user.slice_count.is_some() {
        base.slice_count = user.slice_count;
    }
    if user.rotation_deg.is_some() {
        base.rotation_deg = user.rotation_deg;
    }
    if user.drone_lock_ms.is_some() {
        base.drone_lock_ms = user.drone_lock_ms;
    }
    if user.ring_ratio.is_some() {
        base.ring_ratio = user.ring_ratio;
    }
    if user.ring_pct.is_some() {
        base.ring_pct = user.ring_pct;
    }
    if user.pinch_step_px.is_some() {
        base.pinch_step_px = user.pinch_step_px;
    }
    if user.radius_pct.is_some() {
        base.radius_pct = user.radius_pct;
    }
    if user.center_dx.is_some() {
        base.center_dx = user.center_dx;
    }
    if user.center_dy.is_some() {
        base.center_dy = user.center_dy;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.key_release_ms.is_some() {
        base.key_release_ms = user.key_release_ms;
    }
    if user.osc_addr.is_some() {
        base.osc_addr = user.osc_addr;
    }
}

/// Live configuration behind a version counter.
///
/// Every mutation bumps the version; the geometry provider keys its memoized
/// derived state on it. Readers that skip the store never see a bump, which
/// is the point: all mutation goes through here.
#[derive(Debug)]
pub struct ConfigStore {
    config: DiscConfig,
    version: u64,
}

impl ConfigStore {
    pub fn new(config: DiscConfig) -> Self {
        Self { config, version: 0 }
    }

    pub fn get(&self) -> &DiscConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set the slice count, clamped to bounds. Returns the applied value.
    pub fn set_slice_count(&mut self, count: i64) -> usize {
        let clamped = DiscConfig::clamp_slice_count(count);
        if clamped != self.config.slice_count {
            self.config.slice_count = clamped;
            self.version += 1;
        }
        clamped
    }

    /// Rotate by a delta in degrees, wrapping to `[0, 360)`.
    pub fn rotate_by(&mut self, delta_deg: f32) {
        if delta_deg != 0.0 {
            self.config.rotation_deg =
                DiscConfig::normalize_rotation(self.config.rotation_deg + delta_deg);
            self.version += 1;
        }
    }

    pub fn set_drone_lock_ms(&mut self, ms: u64) {
        if ms != self.config.drone_lock_ms {
            self.config.drone_lock_ms = ms;
            self.version += 1;
        }
    }
}
