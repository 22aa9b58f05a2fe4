use std::{sync::Arc, thread, time::Duration};

use log::{info, warn};

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};

use crate::{
    handlers::RequestHandler,
    router::{
        pattern::UriPattern,
        record::{HandlerRecord, HandlerStatus, LiveCall, Mutability},
        Method, RouteError,
    },
};

fn default_drain_attempts() -> u32 {
    10
}

fn default_drain_interval() -> Duration {
    Duration::from_millis(1)
}

/// How long `replace` waits for in-flight calls to leave a handler.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DrainPolicy {
    #[serde(default = "default_drain_attempts")]
    pub attempts: u32,
    #[serde(default = "default_drain_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            attempts: default_drain_attempts(),
            interval: default_drain_interval(),
        }
    }
}

impl DrainPolicy {
    /// Returns true once no call is executing inside `record`.
    fn wait_for_drain(&self, record: &HandlerRecord) -> bool {
        if record.live_calls() == 0 {
            return true;
        }

        for _ in 0..self.attempts {
            thread::sleep(self.interval);

            if record.live_calls() == 0 {
                return true;
            }
        }

        false
    }
}

struct TableEntry {
    pattern: UriPattern,
    record: Arc<HandlerRecord>,
}

/// Ordered handlers for one method. Registration order is match priority.
pub struct HandlerTable {
    method: Method,
    drain_policy: DrainPolicy,
    entries: RwLock<Vec<TableEntry>>,
}

impl HandlerTable {
    pub fn new(method: Method, drain_policy: DrainPolicy) -> Self {
        Self {
            method,
            drain_policy,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn exists(&self, pattern: &str) -> bool {
        self.entries
            .read()
            .iter()
            .any(|entry| entry.pattern.text() == pattern)
    }

    pub fn description(&self, pattern: &str) -> Option<String> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.pattern.text() == pattern)
            .map(|entry| entry.record.handler().describe())
    }

    pub fn set_enabled(&self, pattern: &str, on: bool) -> Result<(), RouteError> {
        let entries = self.entries.write();

        let entry = match entries.iter().find(|entry| entry.pattern.text() == pattern) {
            Some(entry) => entry,
            None => {
                warn!(
                    "{} handler for '{}' not found, cannot switch status",
                    self.method, pattern
                );
                return Err(RouteError::NotFound);
            }
        };

        if entry.record.is_enabled() == on {
            warn!(
                "{} handler for '{}' already {}",
                self.method,
                pattern,
                on_off(on)
            );
            return Err(RouteError::AlreadyInState);
        }

        entry.record.set_enabled(on);

        info!(
            "{} handler for '{}' switched from {} to {}",
            self.method,
            pattern,
            on_off(!on),
            on_off(on)
        );

        Ok(())
    }

    /// First enabled entry matching `uri`, with a live call already entered.
    pub fn find(&self, uri: &str) -> Result<LiveCall, RouteError> {
        let entries = self.entries.read();

        entries
            .iter()
            .find(|entry| entry.record.is_enabled() && entry.pattern.is_match(uri))
            .map(|entry| LiveCall::enter(Arc::clone(&entry.record)))
            .ok_or(RouteError::NotFound)
    }

    pub fn register(
        &self,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
        mutability: Mutability,
    ) -> Result<(), RouteError> {
        let pattern = UriPattern::new(pattern)?;

        let mut entries = self.entries.write();

        if entries.iter().any(|entry| entry.pattern == pattern) {
            warn!(
                "{} handler for '{}' already registered",
                self.method, pattern
            );
            return Err(RouteError::DuplicatePattern(pattern.text().to_string()));
        }

        info!(
            "registered {} handler '{}' -> {} ({:?})",
            self.method,
            pattern,
            handler.describe(),
            mutability
        );

        entries.push(TableEntry {
            pattern,
            record: Arc::new(HandlerRecord::new(handler, mutability)),
        });

        Ok(())
    }

    /// Swap the handler at `pattern` once its in-flight calls have drained.
    ///
    /// The write lock is held for the whole drain, so no new call can enter
    /// the old handler. On `Ok` the old handler's code is no longer
    /// reachable from this table.
    pub fn replace(
        &self,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RouteError> {
        let mut entries = self.entries.write();

        let index = match entries
            .iter()
            .position(|entry| entry.pattern.text() == pattern)
        {
            Some(index) => index,
            None => {
                warn!(
                    "{} handler for '{}' not found, cannot replace",
                    self.method, pattern
                );
                return Err(RouteError::NotFound);
            }
        };

        let old_record = Arc::clone(&entries[index].record);

        match old_record.mutability() {
            Mutability::Immutable => {
                warn!(
                    "{} handler for '{}' is immutable, refusing replacement",
                    self.method, pattern
                );
                return Err(RouteError::Immutable);
            }
            Mutability::Replaceable => {}
        }

        if !self.drain_policy.wait_for_drain(&old_record) {
            let live_calls = old_record.live_calls();
            warn!(
                "{} handler for '{}' still has {} live calls, disable it first and retry",
                self.method, pattern, live_calls
            );
            return Err(RouteError::Busy { live_calls });
        }

        info!(
            "replaced {} handler '{}': {} -> {}",
            self.method,
            pattern,
            old_record.handler().describe(),
            handler.describe()
        );

        let new_record = HandlerRecord::new(handler, Mutability::Replaceable);
        new_record.set_enabled(old_record.is_enabled());

        entries[index].record = Arc::new(new_record);

        Ok(())
    }

    pub fn snapshot(&self) -> Vec<HandlerStatus> {
        self.entries
            .read()
            .iter()
            .map(|entry| HandlerStatus {
                method: self.method.as_str(),
                pattern: entry.pattern.text().to_string(),
                description: entry.record.handler().describe(),
                mutability: entry.record.mutability(),
                enabled: entry.record.is_enabled(),
                success_count: entry.record.success_count(),
                fail_count: entry.record.fail_count(),
                live_calls: entry.record.live_calls(),
            })
            .collect()
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
