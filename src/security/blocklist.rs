use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use super::netmask::NetMask;

/// The transport connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub peer: SocketAddr,
    pub secure: bool,
}

pub trait BlockList: Send + Sync {
    /// Whether the request must be refused.
    fn apply_block(&self, connection: &Connection, ip: IpAddr) -> bool;
}

/// Masks fixed at startup.
#[derive(Debug, Default)]
pub struct StaticBlockList {
    masks: Vec<NetMask>,
}

impl StaticBlockList {
    /// Invalid masks are skipped with a warning.
    pub fn from_masks<'a>(masks: impl IntoIterator<Item = &'a str>) -> Self {
        let masks = masks
            .into_iter()
            .filter(|mask| !mask.trim().is_empty())
            .filter_map(|mask| match mask.parse::<NetMask>() {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warn!("ignoring block rule: {err}");
                    None
                }
            })
            .collect();
        Self { masks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl BlockList for StaticBlockList {
    fn apply_block(&self, connection: &Connection, ip: IpAddr) -> bool {
        let blocked = self.masks.iter().any(|mask| mask.matches(ip));
        if blocked {
            debug!(peer = %connection.peer, %ip, "blocked");
        }
        blocked
    }
}
