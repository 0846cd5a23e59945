use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::query::ReleaseQuery;
use tagrelay_provider::{Release, ReleaseSource};
use tagrelay_utils::{GatewayError, Result};

/// How long a fetched release list is served before it is refetched.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
/// Upper bound on one upstream listing call.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One fetched release list, newest-first by publish time. Never mutated.
#[derive(Debug)]
pub struct ReleaseSnapshot {
    releases: Vec<Release>,
    fetched_at: Instant,
}

impl ReleaseSnapshot {
    fn new(mut releases: Vec<Release>) -> Self {
        releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Self {
            releases,
            fetched_at: Instant::now(),
        }
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

#[derive(Default)]
struct RefreshState {
    last_error: Option<GatewayError>,
}

/// State shared with background refreshes.
struct Shared {
    snapshot: RwLock<Option<Arc<ReleaseSnapshot>>>,
    refresh_state: Mutex<RefreshState>,
    attempts: AtomicU64,
    background: AtomicBool,
}

impl Shared {
    async fn current(&self) -> Option<Arc<ReleaseSnapshot>> {
        self.snapshot.read().await.clone()
    }

    async fn refresh_locked(
        &self,
        source: &dyn ReleaseSource,
        fetch_timeout: Duration,
        state: &mut RefreshState,
    ) -> Result<Arc<ReleaseSnapshot>> {
        let result = match tokio::time::timeout(fetch_timeout, source.list_releases()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::source_unavailable(format!(
                "{} did not answer within {:?}",
                source.get_friendly_name(),
                fetch_timeout
            ))),
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(releases) => {
                let snapshot = Arc::new(ReleaseSnapshot::new(releases));
                *self.snapshot.write().await = Some(snapshot.clone());
                state.last_error = None;
                tracing::info!(
                    source = source.get_friendly_name(),
                    count = snapshot.releases().len(),
                    "release index refreshed"
                );
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!(
                    source = source.get_friendly_name(),
                    error = %err,
                    "release index refresh failed"
                );
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

/// Time-bounded cache of a [`ReleaseSource`]'s release list.
///
/// Readers share the current snapshot through an `Arc`; a refresh builds a
/// complete new snapshot and swaps it in. At most one refresh runs at a time.
/// Without any snapshot, callers wait for the running refresh and share its
/// outcome. With a stale snapshot, callers get it right away and the refresh
/// runs in the background.
pub struct ReleaseIndex {
    source: Arc<dyn ReleaseSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    shared: Arc<Shared>,
}

impl ReleaseIndex {
    pub fn new(source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            source,
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            shared: Arc::new(Shared {
                snapshot: RwLock::new(None),
                refresh_state: Mutex::new(RefreshState::default()),
                attempts: AtomicU64::new(0),
                background: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn source(&self) -> &Arc<dyn ReleaseSource> {
        &self.source
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// The cached snapshot regardless of age.
    pub async fn current(&self) -> Option<Arc<ReleaseSnapshot>> {
        self.shared.current().await
    }

    /// Fetch the full release list and replace the snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<ReleaseSnapshot>> {
        let mut state = self.shared.refresh_state.lock().await;
        self.shared
            .refresh_locked(self.source.as_ref(), self.fetch_timeout, &mut state)
            .await
    }

    /// Start a refresh on its own task unless one is already queued.
    fn refresh_in_background(&self) {
        if self
            .shared
            .background
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let shared = self.shared.clone();
        let source = self.source.clone();
        let (ttl, fetch_timeout) = (self.ttl, self.fetch_timeout);
        tokio::spawn(async move {
            let mut state = shared.refresh_state.lock().await;
            // a foreground refresh may have won the lock first
            let stale = shared.current().await.map_or(true, |s| s.age() >= ttl);
            if stale {
                // failures are logged and recorded in the state
                let _ = shared
                    .refresh_locked(source.as_ref(), fetch_timeout, &mut state)
                    .await;
            }
            drop(state);
            shared.background.store(false, Ordering::SeqCst);
        });
    }

    /// Serve the cached snapshot. A missing snapshot is fetched before
    /// returning; one older than the TTL is returned as is while a
    /// background refresh replaces it.
    ///
    /// The error only surfaces when nothing was ever fetched.
    pub async fn ensure_fresh(&self) -> Result<Arc<ReleaseSnapshot>> {
        match self.current().await {
            Some(snapshot) if snapshot.age() < self.ttl => return Ok(snapshot),
            Some(stale) => {
                tracing::warn!(age = ?stale.age(), "serving stale release list");
                self.refresh_in_background();
                return Ok(stale);
            }
            None => {}
        }

        let seen = self.shared.attempts.load(Ordering::SeqCst);
        let mut state = self.shared.refresh_state.lock().await;

        if self.shared.attempts.load(Ordering::SeqCst) != seen {
            // a refresh finished while we waited for the lock; share its outcome
            return match self.current().await {
                Some(snapshot) => Ok(snapshot),
                None => Err(state.last_error.clone().unwrap_or_else(|| {
                    GatewayError::source_unavailable("release list unavailable")
                })),
            };
        }
        if let Some(snapshot) = self.current().await {
            return Ok(snapshot);
        }

        self.shared
            .refresh_locked(self.source.as_ref(), self.fetch_timeout, &mut state)
            .await
    }

    /// All releases, newest-first by publish time.
    pub async fn list(&self) -> Result<Vec<Release>> {
        Ok(self.ensure_fresh().await?.releases().to_vec())
    }

    /// Releases matching `query`, highest version first; ties go to the most
    /// recently published. An empty result is not an error.
    pub async fn filter(&self, query: &ReleaseQuery) -> Result<Vec<Release>> {
        let snapshot = self.ensure_fresh().await?;
        let mut releases: Vec<Release> = snapshot
            .releases()
            .iter()
            .filter(|release| query.matches(release))
            .cloned()
            .collect();
        releases.sort_by(|a, b| {
            b.version()
                .cmp(a.version())
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        tracing::debug!(%query, count = releases.len(), "filtered releases");
        Ok(releases)
    }

    /// The newest release matching `query`, or `NotFound`.
    pub async fn resolve(&self, query: &ReleaseQuery) -> Result<Release> {
        self.filter(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(format!("no release matches {}", query)))
    }
}
