//! Per-call retry budget

use xr_core::config::RetryConfig;
use xr_core::RetryClass;

/// Counters bounding how often one call may recover before failing
///
/// A fresh budget is created for every call; nothing carries over between
/// calls.
#[derive(Debug, Clone)]
pub(crate) struct RetryBudget {
    relogins_left: u32,
    transient_limit: u32,
    timeouts: u32,
    end_of_streams: u32,
    broken_pipes: u32,
    reconnected: bool,
}

impl RetryBudget {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            relogins_left: config.relogin_attempts,
            transient_limit: config.transient_retries,
            timeouts: 0,
            end_of_streams: 0,
            broken_pipes: 0,
            reconnected: false,
        }
    }

    /// Consume one re-login after `SESSION_INVALID`
    pub fn try_relogin(&mut self) -> bool {
        if self.relogins_left == 0 {
            return false;
        }
        self.relogins_left -= 1;
        true
    }

    /// Consume one same-endpoint retry for a transient failure kind
    pub fn try_transient(&mut self, class: RetryClass) -> bool {
        let counter = match class {
            RetryClass::Timeout => &mut self.timeouts,
            RetryClass::EndOfStream => &mut self.end_of_streams,
            RetryClass::BrokenPipe => &mut self.broken_pipes,
        };
        *counter += 1;
        *counter <= self.transient_limit
    }

    /// Consume the single reconnection episode a call is allowed
    pub fn try_reconnect(&mut self) -> bool {
        !std::mem::replace(&mut self.reconnected, true)
    }
}
