//! Serial port watcher.
//!
//! Resetting a native-USB board often makes the operating system drop its
//! serial device and enumerate a new one, sometimes under a different name.
//! The watcher takes a snapshot before the reset and then polls until a name
//! that was not in the snapshot shows up.
//!
//! ```text
//! snapshot() ──▶ (caller resets the board) ──▶ wait_for_new_port(&before)
//!                                                   │
//!                          one new name ◀───────────┤
//!                                                   └──▶ none / several: Unchanged
//! ```

use {
    crate::{
        error::{Error, Result},
        is_interrupted_requested,
    },
    log::{debug, info},
    std::{
        collections::BTreeSet,
        thread,
        time::{Duration, Instant},
    },
};

/// Watcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// How long to wait for a new port before giving up.
    pub timeout: Duration,
    /// Pause between two enumerations.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl WatchConfig {
    /// Set the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Set of port names seen at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortSnapshot {
    names: BTreeSet<String>,
}

impl PortSnapshot {
    /// Names present in `after` but not in `self`, in sorted order.
    #[must_use]
    pub fn new_ports(&self, after: &PortSnapshot) -> Vec<String> {
        after.names.difference(&self.names).cloned().collect()
    }

    /// Whether `name` was present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no port was present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Port names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PortSnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outcome of waiting for a port to reappear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortChange {
    /// Exactly one new port appeared.
    Replaced(String),
    /// No new port appeared, or the change was ambiguous.
    Unchanged,
}

impl PortChange {
    /// The port to use from now on.
    #[must_use]
    pub fn resolve(self, original: &str) -> String {
        match self {
            Self::Replaced(name) => name,
            Self::Unchanged => original.to_string(),
        }
    }
}

/// Something that can list serial port names.
pub trait PortSource {
    /// Names of all ports currently present.
    fn port_names(&mut self) -> Result<Vec<String>>;
}

impl<F> PortSource for F
where
    F: FnMut() -> Result<Vec<String>>,
{
    fn port_names(&mut self) -> Result<Vec<String>> {
        self()
    }
}

#[cfg(feature = "native")]
impl PortSource for crate::port::NativePortEnumerator {
    fn port_names(&mut self) -> Result<Vec<String>> {
        use crate::port::PortEnumerator;

        Ok(self
            .list_ports()?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }
}

/// Detects the port a board moves to after a reset.
pub struct PortWatcher<S: PortSource> {
    source: S,
    config: WatchConfig,
}

impl<S: PortSource> PortWatcher<S> {
    /// Create a watcher with default timing.
    pub fn new(source: S) -> Self {
        Self::with_config(source, WatchConfig::default())
    }

    /// Create a watcher with custom timing.
    pub fn with_config(source: S, config: WatchConfig) -> Self {
        Self { source, config }
    }

    /// Timing in use.
    pub fn config(&self) -> WatchConfig {
        self.config
    }

    /// Capture the ports present right now.
    pub fn snapshot(&mut self) -> Result<PortSnapshot> {
        let snapshot: PortSnapshot = self.source.port_names()?.into_iter().collect();
        debug!("Port snapshot: {} port(s)", snapshot.len());
        Ok(snapshot)
    }

    /// Poll until a port missing from `before` appears.
    ///
    /// Returns [`PortChange::Replaced`] when exactly one new name is seen.
    /// Reaching the timeout, or seeing several new names at once, yields
    /// [`PortChange::Unchanged`]. Enumeration failures while polling are not
    /// fatal.
    pub fn wait_for_new_port(&mut self, before: &PortSnapshot) -> Result<PortChange> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            if is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match self.source.port_names() {
                Ok(names) => {
                    let after: PortSnapshot = names.into_iter().collect();
                    let mut new = before.new_ports(&after);
                    match new.len() {
                        0 => {},
                        1 => {
                            let name = new.remove(0);
                            info!("Port changed to {name}");
                            return Ok(PortChange::Replaced(name));
                        },
                        _ => {
                            info!(
                                "Several new ports appeared ({}), keeping the original",
                                new.join(", ")
                            );
                            return Ok(PortChange::Unchanged);
                        },
                    }
                },
                Err(e) => debug!("Port enumeration failed, retrying: {e}"),
            }

            let now = Instant::now();
            if now >= deadline {
                info!(
                    "No new port after {:?}, keeping the original",
                    self.config.timeout
                );
                return Ok(PortChange::Unchanged);
            }
            thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    /// Returns each scripted listing once, then repeats the last one.
    fn scripted(listings: Vec<Result<Vec<String>>>) -> impl FnMut() -> Result<Vec<String>> {
        let mut queue: VecDeque<_> = listings.into();
        let mut last = Vec::new();
        move || match queue.pop_front() {
            Some(Ok(list)) => {
                last.clone_from(&list);
                Ok(list)
            },
            Some(Err(e)) => Err(e),
            None => Ok(last.clone()),
        }
    }

    fn quick() -> WatchConfig {
        WatchConfig::default()
            .with_timeout(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_new_ports_diff() {
        let before: PortSnapshot = ["A", "B"].into_iter().collect();
        let after: PortSnapshot = ["B", "C", "D"].into_iter().collect();
        assert_eq!(before.new_ports(&after), names(&["C", "D"]));
        assert!(after.new_ports(&before).contains(&"A".to_string()));
    }

    #[test]
    fn test_single_new_port_replaces() {
        let source = scripted(vec![
            Ok(names(&["A", "B"])),
            Ok(names(&["A"])),
            Ok(names(&["A", "B", "C"])),
        ]);
        let mut watcher = PortWatcher::with_config(source, quick());
        let before = watcher.snapshot().unwrap();

        let change = watcher.wait_for_new_port(&before).unwrap();
        assert_eq!(change, PortChange::Replaced("C".into()));
        assert_eq!(change.resolve("B"), "C");
    }

    #[test]
    fn test_ambiguous_change_is_unchanged() {
        let source = scripted(vec![
            Ok(names(&["A", "B"])),
            Ok(names(&["A", "B", "C", "D"])),
        ]);
        let mut watcher = PortWatcher::with_config(source, quick());
        let before = watcher.snapshot().unwrap();

        let change = watcher.wait_for_new_port(&before).unwrap();
        assert_eq!(change, PortChange::Unchanged);
        assert_eq!(change.resolve("B"), "B");
    }

    #[test]
    fn test_no_change_times_out_unchanged() {
        let source = scripted(vec![Ok(names(&["A", "B"]))]);
        let mut watcher = PortWatcher::with_config(source, quick());
        let before = watcher.snapshot().unwrap();

        let start = Instant::now();
        let change = watcher.wait_for_new_port(&before).unwrap();
        assert_eq!(change, PortChange::Unchanged);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_poll_errors_are_tolerated() {
        let source = scripted(vec![
            Ok(names(&["A"])),
            Err(Error::Protocol("enumeration failed".into())),
            Ok(names(&["A", "B"])),
        ]);
        let mut watcher = PortWatcher::with_config(source, quick());
        let before = watcher.snapshot().unwrap();

        assert_eq!(
            watcher.wait_for_new_port(&before).unwrap(),
            PortChange::Replaced("B".into())
        );
    }

    #[test]
    fn test_snapshot_error_propagates() {
        let source = scripted(vec![Err(Error::DeviceNotFound)]);
        let mut watcher = PortWatcher::new(source);
        assert!(matches!(watcher.snapshot(), Err(Error::DeviceNotFound)));
    }
}
