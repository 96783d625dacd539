//! Observable configuration (spec §6.3).

use std::time::Duration;

/// Selects how `RegExp` operations (`split`, `match`, `search`, `replace`,
/// `exec`) are carried out. The executor itself lives outside the core
/// (spec §1, §4.5); this only selects which contract the engine honors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegexpMode {
    /// Reject every regex operation with a guest TypeError.
    Reject = 0,
    /// Run the host's native regex engine in-process, no timeout.
    Native = 1,
    /// Delegate to an interruptible sandbox with a hard timeout (default).
    Sandboxed = 2,
}

impl RegexpMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RegexpMode::Reject),
            1 => Some(RegexpMode::Native),
            2 => Some(RegexpMode::Sandboxed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub regexp_mode: RegexpMode,
    pub regexp_thread_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            regexp_mode: RegexpMode::Sandboxed,
            regexp_thread_timeout: Duration::from_millis(1000),
        }
    }
}
