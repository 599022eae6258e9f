//! Network reachability monitoring.
//!
//! Platform code feeds the observed reachability into
//! [`ConnectivityMonitor::set_online`]; subscribers get the current state
//! immediately and then exactly one event per actual transition. Flap
//! debouncing is deliberately left to the sync engine's single-flight rule.

use tokio::sync::watch;

/// Shared reachability state with transition subscriptions
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial reachability
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Current reachability
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report the platform's observed reachability.
    ///
    /// Redundant reports (online while already online) emit no event.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            tracing::debug!("Connectivity transition: online={online}");
        }
    }

    /// Subscribe to reachability events; the first yield is the current state
    #[must_use]
    pub fn subscribe(&self) -> ConnectivityEvents {
        ConnectivityEvents {
            rx: self.tx.subscribe(),
            delivered_initial: false,
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Stream of reachability states for one subscriber
pub struct ConnectivityEvents {
    rx: watch::Receiver<bool>,
    delivered_initial: bool,
}

impl ConnectivityEvents {
    /// Wait for the next state; `None` once the monitor is dropped.
    ///
    /// The first call resolves immediately with the state at subscription
    /// time, even if no transition has occurred since process start.
    pub async fn next(&mut self) -> Option<bool> {
        if !self.delivered_initial {
            self.delivered_initial = true;
            self.rx.mark_unchanged();
            return Some(*self.rx.borrow());
        }

        match self.rx.changed().await {
            Ok(()) => Some(*self.rx.borrow_and_update()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initial_state_delivered_to_new_subscriber() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe();
        assert_eq!(events.next().await, Some(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transitions_are_observed_in_order() {
        let monitor = ConnectivityMonitor::new(false);
        let mut events = monitor.subscribe();
        assert_eq!(events.next().await, Some(false));

        monitor.set_online(true);
        assert_eq!(events.next().await, Some(true));

        monitor.set_online(false);
        assert_eq!(events.next().await, Some(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_redundant_reports_emit_no_event() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe();
        assert_eq!(events.next().await, Some(true));

        monitor.set_online(true);
        monitor.set_online(true);

        let pending = timeout(Duration::from_millis(50), events.next()).await;
        assert!(pending.is_err(), "no event expected while already online");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stream_ends_when_monitor_dropped() {
        let monitor = ConnectivityMonitor::new(false);
        let mut events = monitor.subscribe();
        assert_eq!(events.next().await, Some(false));

        drop(monitor);
        assert_eq!(events.next().await, None);
    }
}
