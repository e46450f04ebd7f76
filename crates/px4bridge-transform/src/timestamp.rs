//! Header stamping policy.
//!
//! PX4 stamps every sample with microseconds since FMU boot.  A bridge can
//! either keep that stamp (no added latency or jitter, but boot-relative
//! unless an offset to the host epoch is supplied) or replace it with the
//! host's clock reading at callback time (epoch-based, but late by the
//! transport delay).

use std::fmt;
use std::str::FromStr;

use px4bridge_types::Time;
use serde::{Deserialize, Serialize};

/// Which clock stamps the outgoing header.
///
/// In TOML: `timestamp_policy = "local_clock"`, `"source_clock"`, or
/// `{ source_with_offset = { offset_ns = 1700000000000000000 } }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// The host clock read when the sample was delivered.
    LocalClock,
    /// The sample's own PX4 timestamp.
    #[default]
    SourceClock,
    /// The sample's PX4 timestamp shifted by `offset_ns` (e.g. a timesync
    /// estimate of boot time on the host's epoch).
    SourceWithOffset { offset_ns: i64 },
}

impl TimestampPolicy {
    /// Resolve the header stamp for a sample taken at `source_us` (PX4
    /// microseconds) and delivered at `received_at` (host clock).
    pub fn stamp(&self, source_us: u64, received_at: Time) -> Time {
        match self {
            TimestampPolicy::LocalClock => received_at,
            TimestampPolicy::SourceClock => Time::from_micros(source_us),
            TimestampPolicy::SourceWithOffset { offset_ns } => {
                let source_ns = i64::try_from(source_us.saturating_mul(1_000)).unwrap_or(i64::MAX);
                Time::from_nanos(source_ns.saturating_add(*offset_ns))
            }
        }
    }
}

impl fmt::Display for TimestampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampPolicy::LocalClock => write!(f, "local_clock"),
            TimestampPolicy::SourceClock => write!(f, "source_clock"),
            TimestampPolicy::SourceWithOffset { offset_ns } => write!(f, "source_with_offset:{offset_ns}"),
        }
    }
}

/// Parses the [`Display`](fmt::Display) form, for environment overrides.
impl FromStr for TimestampPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local_clock" => Ok(TimestampPolicy::LocalClock),
            "source_clock" => Ok(TimestampPolicy::SourceClock),
            other => match other.strip_prefix("source_with_offset:") {
                Some(offset) => offset
                    .trim()
                    .parse::<i64>()
                    .map(|offset_ns| TimestampPolicy::SourceWithOffset { offset_ns })
                    .map_err(|e| format!("invalid offset in '{other}': {e}")),
                None => Err(format!("unknown timestamp policy '{other}'")),
            },
        }
    }
}
