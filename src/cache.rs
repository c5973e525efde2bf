use std::time::{Duration, Instant};

use crate::{
    link::{DeviceLink, TransportError},
    prelude::*,
    snapshot::PlantSnapshot,
};

/// Collapses many logical reads into at most one physical fetch per interval,
/// and holds the last successful snapshot.
///
/// The DTU is a constrained gateway: dozens of exposed values would otherwise
/// each trigger their own register read.
pub struct SnapshotCache<L> {
    link: L,
    min_interval: Duration,

    /// Measured from the last *attempted* refresh, successful or not.
    last_attempt: Option<Instant>,

    snapshot: Option<PlantSnapshot>,
}

impl<L> SnapshotCache<L> {
    pub const fn new(link: L, min_interval: Duration) -> Self {
        Self { link, min_interval, last_attempt: None, snapshot: None }
    }

    /// The last successful snapshot, or `None` when the last fetch failed.
    pub const fn current(&self) -> Option<&PlantSnapshot> {
        self.snapshot.as_ref()
    }
}

impl<L: DeviceLink> SnapshotCache<L> {
    /// Re-fetch the snapshot, unless the minimum interval since the last
    /// attempt has not elapsed yet, in which case this is a no-op.
    ///
    /// A failed fetch discards the previous snapshot: a transient failure
    /// propagates as "unknown" to every consumer rather than silently
    /// serving stale data.
    #[instrument(skip_all)]
    pub async fn refresh(&mut self) {
        let now = Instant::now();
        if let Some(last_attempt) = self.last_attempt
            && now.duration_since(last_attempt) < self.min_interval
        {
            trace!("throttled");
            return;
        }
        self.last_attempt = Some(now);
        match self.link.fetch_snapshot().await {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
            }
            Err(error) => {
                match &error {
                    TransportError::Connect(_) => warn!("DTU is unreachable: {error:#}"),
                    TransportError::Request(_) | TransportError::Rejected(_) => {
                        warn!("DTU poll failed: {error:#}");
                    }
                    TransportError::ShortResponse { .. } => {
                        warn!("DTU answered with a malformed snapshot: {error:#}");
                    }
                }
                self.snapshot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::{ScriptedLink, plant};

    #[tokio::test]
    async fn second_refresh_within_interval_is_a_no_op() {
        let link = ScriptedLink::new(vec![Ok(plant(1000.0, 2))]);
        let mut cache = SnapshotCache::new(link, Duration::from_secs(3600));
        cache.refresh().await;
        cache.refresh().await;
        assert_eq!(cache.link.fetches(), 1);
        assert!(cache.current().is_some());
    }

    #[tokio::test]
    async fn failed_fetch_discards_the_previous_snapshot() {
        let link = ScriptedLink::new(vec![
            Ok(plant(1000.0, 2)),
            Err(TransportError::ShortResponse { expected: 20, actual: 3 }),
        ]);
        let mut cache = SnapshotCache::new(link, Duration::ZERO);
        cache.refresh().await;
        assert!(cache.current().is_some());
        cache.refresh().await;
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn throttle_counts_attempts_not_successes() {
        let link =
            ScriptedLink::new(vec![Err(TransportError::Connect("connection refused".into()))]);
        let mut cache = SnapshotCache::new(link, Duration::from_secs(3600));
        cache.refresh().await;
        cache.refresh().await;
        assert_eq!(cache.link.fetches(), 1);
        assert!(cache.current().is_none());
    }
}
