//! Server-wide ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use crate::metrics::WS_LIVENESS_EVICTIONS_TOTAL;

/// Outcome of one sweep over the live sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Connections that were pinged.
    pub probed: usize,
    /// Connections closed for missing the previous probe.
    pub evicted: usize,
}

/// Probe every open connection once.
///
/// A connection whose alive flag is still clear from the previous sweep is
/// closed; every other connection has its flag cleared and gets a ping. Only
/// a pong sets the flag again, so a silent peer survives one sweep and is
/// evicted on the next.
pub fn probe_connections(registry: &SessionRegistry) -> ProbeReport {
    let mut report = ProbeReport::default();
    for session in registry.sessions() {
        let connection = session.connection();
        if connection.is_closed() {
            continue;
        }
        if connection.check_alive() {
            if !connection.send_ping() {
                debug!(connection_id = %connection.id, "ping not queued");
            }
            report.probed += 1;
        } else {
            warn!(
                connection_id = %connection.id,
                age_secs = connection.age().as_secs(),
                "no pong since last probe, closing connection"
            );
            counter!(WS_LIVENESS_EVICTIONS_TOTAL).increment(1);
            connection.close();
            report.evicted += 1;
        }
    }
    report
}

/// Sweep the registry every `interval` until `cancel` fires.
pub async fn run_liveness_monitor(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ticker.tick().await;
    info!(?interval, "liveness monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = probe_connections(&registry);
                if report.evicted > 0 {
                    debug!(probed = report.probed, evicted = report.evicted, "liveness sweep");
                }
            }
            () = cancel.cancelled() => {
                info!("liveness monitor stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session_pair;

    #[tokio::test]
    async fn silent_peer_evicted_on_second_sweep() {
        let registry = SessionRegistry::new();
        let (session, _device) = session_pair("wf_api");
        registry.add(session.clone());

        assert_eq!(probe_connections(&registry), ProbeReport { probed: 1, evicted: 0 });
        assert!(!session.connection().is_closed());

        assert_eq!(probe_connections(&registry), ProbeReport { probed: 0, evicted: 1 });
        assert!(session.connection().is_closed());
    }

    #[tokio::test]
    async fn answering_peer_never_evicted() {
        let registry = SessionRegistry::new();
        let (session, device) = session_pair("wf_api");
        registry.add(session.clone());

        for _ in 0..10 {
            assert_eq!(probe_connections(&registry).evicted, 0);
            session.connection().mark_alive();
        }
        assert!(!session.connection().is_closed());
        for _ in 0..10 {
            if device.pings() == 10 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(device.pings(), 10);
    }

    #[tokio::test]
    async fn closed_connections_are_skipped() {
        let registry = SessionRegistry::new();
        let (session, _device) = session_pair("wf_api");
        registry.add(session.clone());
        session.disconnect();
        assert_eq!(probe_connections(&registry), ProbeReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_evicts_after_two_intervals() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _device) = session_pair("wf_api");
        registry.add(session.clone());
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(run_liveness_monitor(
            registry.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        time::sleep(Duration::from_secs(31)).await;
        assert!(!session.connection().is_closed());

        time::sleep(Duration::from_secs(30)).await;
        assert!(session.connection().is_closed());

        cancel.cancel();
        monitor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_keeps_answering_peer() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _device) = session_pair("wf_api");
        registry.add(session.clone());
        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(run_liveness_monitor(
            registry.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        for _ in 0..6 {
            time::sleep(Duration::from_secs(15)).await;
            session.connection().mark_alive();
        }
        assert!(!session.connection().is_closed());

        cancel.cancel();
        monitor.await.unwrap();
    }

    #[tokio::test]
    async fn monitor_stops_on_cancel() {
        let registry = Arc::new(SessionRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_liveness_monitor(registry, Duration::from_secs(60), cancel).await;
    }
}
