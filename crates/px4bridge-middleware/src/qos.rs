//! Delivery-QoS policies and the request/offered compatibility rules.
//!
//! A writer *offers* a [`QosProfile`] and a reader *requests* one.  The pair
//! only matches when the offer is at least as strong as the request on every
//! policy:
//!
//! | Policy | Offered | Requested | Match |
//! |---|---|---|---|
//! | Reliability | `Reliable` | `Reliable` / `BestEffort` | yes |
//! | Reliability | `BestEffort` | `BestEffort` | yes |
//! | Reliability | `BestEffort` | `Reliable` | **no** |
//! | Durability | `TransientLocal` | `TransientLocal` / `Volatile` | yes |
//! | Durability | `Volatile` | `Volatile` | yes |
//! | Durability | `Volatile` | `TransientLocal` | **no** |
//!
//! History depth never affects matching; it only sizes the queues.
//!
//! A mismatch is **silent** on the wire: the reader is created, nothing is
//! ever delivered to it.  PX4's uXRCE-DDS agent publishes with
//! [`QosProfile::px4_sensor_data`], so a subscription left at the host
//! default (reliable) receives nothing.

use std::fmt;

use px4bridge_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Reliability policy.
///
/// Ordered from weakest to strongest so that `offered >= requested` is the
/// compatibility test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    /// Fire-and-forget; samples may be dropped.
    BestEffort,
    /// Every sample is delivered to matched readers.
    #[default]
    Reliable,
}

/// Durability policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Late-joining readers see only samples published after they join.
    #[default]
    Volatile,
    /// The writer keeps its last `depth` samples and replays them to
    /// late-joining transient-local readers.
    TransientLocal,
}

/// History policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum History {
    /// Keep the last N samples; older ones are overwritten.
    KeepLast(u32),
}

impl History {
    pub fn depth(&self) -> u32 {
        match self {
            History::KeepLast(n) => *n,
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(10)
    }
}

/// A complete delivery contract for one reader or writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "QosProfileRepr", into = "QosProfileRepr")]
pub struct QosProfile {
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self::default_with_depth(10)
    }
}

impl QosProfile {
    /// The host middleware's default profile: reliable, volatile, keep-last
    /// `depth`.
    #[must_use]
    pub fn default_with_depth(depth: u32) -> Self {
        Self {
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            history: History::KeepLast(depth),
        }
    }

    /// Best-effort, volatile, keep-last `depth`: the weakest request, matched
    /// by every writer.
    #[must_use]
    pub fn best_effort_with_depth(depth: u32) -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            history: History::KeepLast(depth),
        }
    }

    /// Best-effort, transient-local, keep-last(10): what PX4's uXRCE-DDS
    /// client offers on its `/fmu/out/*` topics.
    #[must_use]
    pub fn px4_sensor_data() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::TransientLocal,
            history: History::KeepLast(10),
        }
    }

    pub fn depth(&self) -> usize {
        self.history.depth() as usize
    }

    /// Reject profiles the bus cannot honour.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.history.depth() == 0 {
            return Err(BridgeError::InvalidQos(
                "History::KeepLast(n) requires n > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// List every policy on which `offered` (writer) fails to satisfy
    /// `requested` (reader).  An empty list means the pair matches.
    pub fn check_compatible(offered: &QosProfile, requested: &QosProfile) -> Vec<QosMismatch> {
        let mut mismatches = Vec::new();
        if offered.reliability < requested.reliability {
            mismatches.push(QosMismatch::Reliability {
                offered: offered.reliability,
                requested: requested.reliability,
            });
        }
        if offered.durability < requested.durability {
            mismatches.push(QosMismatch::Durability {
                offered: offered.durability,
                requested: requested.durability,
            });
        }
        mismatches
    }

    /// `true` when a writer offering `self` can serve a reader requesting
    /// `requested`.
    pub fn is_compatible_with(&self, requested: &QosProfile) -> bool {
        Self::check_compatible(self, requested).is_empty()
    }
}

impl fmt::Display for QosProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reliability = match self.reliability {
            Reliability::BestEffort => "best_effort",
            Reliability::Reliable => "reliable",
        };
        let durability = match self.durability {
            Durability::Volatile => "volatile",
            Durability::TransientLocal => "transient_local",
        };
        write!(f, "{reliability}/{durability}/keep_last({})", self.history.depth())
    }
}

/// One violated policy in a writer/reader pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosMismatch {
    Reliability {
        offered: Reliability,
        requested: Reliability,
    },
    Durability {
        offered: Durability,
        requested: Durability,
    },
}

impl fmt::Display for QosMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QosMismatch::Reliability { offered, requested } => {
                write!(f, "reliability offered {offered:?} < requested {requested:?}")
            }
            QosMismatch::Durability { offered, requested } => {
                write!(f, "durability offered {offered:?} < requested {requested:?}")
            }
        }
    }
}

// Flat config form: `{ reliability = "best_effort", durability = "volatile", depth = 10 }`.
#[derive(Serialize, Deserialize)]
struct QosProfileRepr {
    #[serde(default)]
    reliability: Reliability,
    #[serde(default)]
    durability: Durability,
    #[serde(default = "default_depth")]
    depth: u32,
}

fn default_depth() -> u32 {
    10
}

impl From<QosProfileRepr> for QosProfile {
    fn from(repr: QosProfileRepr) -> Self {
        Self {
            reliability: repr.reliability,
            durability: repr.durability,
            history: History::KeepLast(repr.depth),
        }
    }
}

impl From<QosProfile> for QosProfileRepr {
    fn from(qos: QosProfile) -> Self {
        Self {
            reliability: qos.reliability,
            durability: qos.durability,
            depth: qos.history.depth(),
        }
    }
}
