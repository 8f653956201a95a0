//! Per-resource cache of backend-owned state.
//!
//! A [`ResourceCache`] owns one `{data, loading, error}` record on a
//! `watch` channel. Refreshes are deduplicated: while one fetch is in
//! flight, every other caller joins it instead of issuing a second request,
//! and all of them resolve when the shared fetch settles.
//!
//! `loading` is raised only while the cache has never held data. Warm
//! refreshes are silent, and a failed warm refresh keeps the previous data.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Observable state of one cached resource.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceState<T> {
    /// Last successfully fetched value.
    pub data: Option<T>,
    /// True only during a cold load.
    pub loading: bool,
    /// Message of the most recent failed fetch, cleared on success.
    pub error: Option<String>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// What a non-forced refresh does when data is already cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Cached data is sufficient. Only `force` refetches.
    #[default]
    CacheFirst,
    /// Every refresh refetches in the background.
    Revalidate,
}

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, omo_rpc::Result<T>> + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, ()>>;

struct Inner<T> {
    name: &'static str,
    policy: RefreshPolicy,
    state: watch::Sender<ResourceState<T>>,
    in_flight: Mutex<Option<InFlight>>,
    fetcher: Fetcher<T>,
    fetch_count: AtomicU64,
}

/// Cached view of one backend resource. Cloning shares the cache.
pub struct ResourceCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ResourceCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache backed by `fetch`.
    pub fn new<F, Fut>(name: &'static str, policy: RefreshPolicy, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = omo_rpc::Result<T>> + Send + 'static,
    {
        let fetcher: Fetcher<T> = Arc::new(move || fetch().boxed());
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            inner: Arc::new(Inner {
                name,
                policy,
                state,
                in_flight: Mutex::new(None),
                fetcher,
                fetch_count: AtomicU64::new(0),
            }),
        }
    }

    /// Resource name used in logs and reports.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Refresh policy.
    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    /// Fetch from the backend unless a fetch is already running or the
    /// cached data suffices.
    ///
    /// Never fails: errors are recorded on the state. Joining callers
    /// resolve only after the shared fetch settles.
    pub async fn refresh(&self, force: bool) {
        let shared = {
            let mut slot = self.inner.in_flight.lock();
            if let Some(existing) = slot.as_ref() {
                debug!(resource = self.inner.name, "refresh in flight, joining");
                existing.clone()
            } else {
                if !force
                    && self.inner.policy == RefreshPolicy::CacheFirst
                    && self.inner.state.borrow().data.is_some()
                {
                    return;
                }
                let inner = Arc::clone(&self.inner);
                let fetch = inner.run().boxed().shared();
                *slot = Some(fetch.clone());
                fetch
            }
        };
        shared.await;
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// Cached data, if any.
    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    /// Whether a cold load is running.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Most recent fetch error.
    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Whether a fetch is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Watch every state change.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    /// Backend fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetch_count.load(Ordering::Relaxed)
    }

    /// Overwrite the cached data with an authoritative value.
    pub(crate) fn replace(&self, data: T) {
        self.inner.state.send_modify(|s| {
            s.data = Some(data);
            s.error = None;
        });
    }

    /// Edit the cached data in place. Returns false when nothing is cached.
    pub(crate) fn modify(&self, edit: impl FnOnce(&mut T)) -> bool {
        self.inner.state.send_if_modified(|s| match s.data.as_mut() {
            Some(data) => {
                edit(data);
                true
            }
            None => false,
        })
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(self: Arc<Self>) {
        let cold = self.state.borrow().data.is_none();
        if cold {
            self.state.send_modify(|s| s.loading = true);
        }
        let _ = self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let result = (self.fetcher)().await;
        match result {
            Ok(data) => self.state.send_modify(|s| {
                s.data = Some(data);
                s.error = None;
                s.loading = false;
            }),
            Err(err) => {
                warn!(resource = self.name, cold, error = %err, "refresh failed");
                self.state.send_modify(|s| {
                    s.error = Some(err.to_string());
                    s.loading = false;
                });
            }
        }
        *self.in_flight.lock() = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
