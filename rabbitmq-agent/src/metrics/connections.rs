//! Per-vhost connection state histogram
//!
//! Rebuilt from scratch every cycle out of `/api/connections`.

use std::collections::BTreeMap;

use crate::model::{ConnectionRecord, ConnectionState, STATE_COUNT};

/// One count per connection state, all present and zero until seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts([u64; STATE_COUNT]);

impl StateCounts {
    pub fn get(&self, state: ConnectionState) -> u64 {
        self.0[state.index()]
    }

    fn increment(&mut self, state: ConnectionState) {
        self.0[state.index()] += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHistogram {
    vhosts: BTreeMap<String, StateCounts>,
}

impl ConnectionHistogram {
    /// Count connections per (vhost, state). Order of the input does not matter.
    pub fn aggregate<'a, I>(connections: I) -> Self
    where
        I: IntoIterator<Item = &'a ConnectionRecord>,
    {
        let mut histogram = Self::default();
        for connection in connections {
            histogram
                .vhosts
                .entry(connection.vhost.clone())
                .or_default()
                .increment(connection.state);
        }
        histogram
    }

    /// Count for (vhost, state), 0 when either was never seen
    pub fn count(&self, vhost: &str, state: ConnectionState) -> u64 {
        self.vhosts.get(vhost).map_or(0, |counts| counts.get(state))
    }

}
