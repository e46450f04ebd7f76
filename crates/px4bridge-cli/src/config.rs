//! Bridge configuration – reads/writes `~/.px4bridge/config.toml`.
//!
//! ```toml
//! [imu]
//! frame_id = "x500_depth_0/camera_link/StereoOV7251"
//! input_qos = { reliability = "best_effort", durability = "transient_local", depth = 10 }
//!
//! [odometry]
//! input_topic = "/px4_1/fmu/out/vehicle_odometry"
//! quaternion_layout = "xyzw"
//!
//! [gateway]
//! addr = "127.0.0.1:9090"
//! ```
//!
//! Every key is optional; missing keys take the defaults of the bridges.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use px4bridge_middleware::QosProfile;
use px4bridge_runtime::{ImuBridgeSettings, OdometryBridgeSettings};
use px4bridge_transform::TimestampPolicy;
use px4bridge_types::BridgeError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub imu: ImuBridgeSettings,
    pub odometry: OdometryBridgeSettings,
    pub gateway: GatewayConfig,
}

/// The rosbridge WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub addr: SocketAddr,
    /// Offered by samples that clients publish into the bus.
    pub ingest_qos: QosProfile,
    /// Requested by client subscriptions.
    pub egress_qos: QosProfile,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            ingest_qos: QosProfile::px4_sensor_data(),
            egress_qos: QosProfile::best_effort_with_depth(10),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────────────────────────

/// `$PX4BRIDGE_CONFIG` if set, otherwise `~/.px4bridge/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PX4BRIDGE_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".px4bridge").join("config.toml")
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

/// Effective configuration: the file at [`config_path`] (or defaults when it
/// is absent) with `PX4BRIDGE_*` overrides applied.
pub fn load() -> Result<Config, BridgeError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

pub fn save(cfg: &Config) -> Result<PathBuf, BridgeError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| BridgeError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| BridgeError::Config(format!("failed to write {}: {e}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Apply `PX4BRIDGE_*` environment variables to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PX4BRIDGE_GATEWAY_ADDR` | `gateway.addr` |
/// | `PX4BRIDGE_IMU_FRAME_ID` | `imu.frame_id` |
/// | `PX4BRIDGE_ODOM_FRAME_ID` | `odometry.frame_id` |
/// | `PX4BRIDGE_ODOM_CHILD_FRAME_ID` | `odometry.child_frame_id` |
/// | `PX4BRIDGE_TIMESTAMP_POLICY` | `timestamp_policy` of both bridges |
///
/// Unparsable values are logged and ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PX4BRIDGE_GATEWAY_ADDR") {
        match v.trim().parse::<SocketAddr>() {
            Ok(addr) => cfg.gateway.addr = addr,
            Err(e) => warn!(value = %v, error = %e, "ignoring PX4BRIDGE_GATEWAY_ADDR"),
        }
    }
    if let Some(v) = lookup("PX4BRIDGE_IMU_FRAME_ID") {
        cfg.imu.transform.frame_id = v;
    }
    if let Some(v) = lookup("PX4BRIDGE_ODOM_FRAME_ID") {
        cfg.odometry.transform.frame_id = v;
    }
    if let Some(v) = lookup("PX4BRIDGE_ODOM_CHILD_FRAME_ID") {
        cfg.odometry.transform.child_frame_id = v;
    }
    if let Some(v) = lookup("PX4BRIDGE_TIMESTAMP_POLICY") {
        match v.parse::<TimestampPolicy>() {
            Ok(policy) => {
                cfg.imu.transform.timestamp_policy = policy;
                cfg.odometry.transform.timestamp_policy = policy;
            }
            Err(e) => warn!(value = %v, error = %e, "ignoring PX4BRIDGE_TIMESTAMP_POLICY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px4bridge_middleware::{Durability, Reliability};
    use px4bridge_transform::QuaternionLayout;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_path_points_to_px4bridge_dir() {
        let p = config_path_for_home("/home/pilot");
        assert_eq!(p, PathBuf::from("/home/pilot/.px4bridge/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.gateway.addr.port(), 9090);
        assert_eq!(loaded.imu.input_topic, "/fmu/out/sensor_combined");
        assert_eq!(loaded.odometry.output_topic, "/odom");
        assert_eq!(loaded.gateway.egress_qos.reliability, Reliability::BestEffort);
        assert_eq!(loaded.gateway.egress_qos.durability, Durability::Volatile);
    }

    #[test]
    fn roundtrip_keeps_offset_policy() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bridge.toml");
        let mut cfg = Config::default();
        cfg.odometry.transform.timestamp_policy = TimestampPolicy::SourceWithOffset { offset_ns: -250 };
        cfg.odometry.transform.quaternion_layout = QuaternionLayout::Wxyz;

        save_to(&cfg, &path).expect("save");
        assert_eq!(load_from(&path).expect("load").expect("some"), cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [odometry]
            input_topic = "/px4_2/fmu/out/vehicle_odometry"
            output_qos = { reliability = "best_effort", depth = 5 }

            [gateway]
            enabled = false
            "#,
        )
        .expect("write");

        let cfg = load_from(&path).expect("load").expect("some");
        assert_eq!(cfg.imu, ImuBridgeSettings::default());
        assert_eq!(cfg.odometry.input_topic, "/px4_2/fmu/out/vehicle_odometry");
        assert_eq!(cfg.odometry.output_qos.reliability, Reliability::BestEffort);
        assert_eq!(cfg.odometry.output_qos.durability, Durability::Volatile);
        assert_eq!(cfg.odometry.output_qos.depth(), 5);
        assert!(!cfg.gateway.enabled);
        assert_eq!(cfg.gateway.ingest_qos, QosProfile::px4_sensor_data());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[imu\nframe_id = ").expect("write");
        assert!(matches!(load_from(&path), Err(BridgeError::Config(_))));
    }

    #[test]
    fn env_overrides_replace_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("PX4BRIDGE_GATEWAY_ADDR", "0.0.0.0:9191"),
                ("PX4BRIDGE_IMU_FRAME_ID", "imu_link"),
                ("PX4BRIDGE_ODOM_FRAME_ID", "map"),
                ("PX4BRIDGE_ODOM_CHILD_FRAME_ID", "base_footprint"),
                ("PX4BRIDGE_TIMESTAMP_POLICY", "local_clock"),
            ]),
        );
        assert_eq!(cfg.gateway.addr, "0.0.0.0:9191".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.imu.transform.frame_id, "imu_link");
        assert_eq!(cfg.odometry.transform.frame_id, "map");
        assert_eq!(cfg.odometry.transform.child_frame_id, "base_footprint");
        assert_eq!(cfg.imu.transform.timestamp_policy, TimestampPolicy::LocalClock);
        assert_eq!(cfg.odometry.transform.timestamp_policy, TimestampPolicy::LocalClock);
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("PX4BRIDGE_GATEWAY_ADDR", "not-an-addr"),
                ("PX4BRIDGE_TIMESTAMP_POLICY", "gps"),
            ]),
        );
        assert_eq!(cfg, Config::default());
    }
}
