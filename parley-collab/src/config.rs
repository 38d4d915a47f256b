//! Session configuration.

use std::time::Duration;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between opening the sequence and announcing the join
    pub join_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_delay: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    pub fn with_join_delay(mut self, join_delay: Duration) -> Self {
        self.join_delay = join_delay;
        self
    }
}
