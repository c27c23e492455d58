use std::future::Future;
use std::time::{Duration, SystemTime};

/// How long contract state read from the chain is reused
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CachedState<T> {
    state: T,
    fetched_at: SystemTime,
}

/// Contract state owned by a single provider, reused while younger than the
/// TTL
///
/// There is no background refresh, an expired entry is replaced by the next
/// [`StateCache::get_or_try_fetch`].
#[derive(Debug)]
pub struct StateCache<T> {
    ttl: Duration,
    // blocking Mutex, never held across an await
    entry: std::sync::Mutex<Option<CachedState<T>>>,
}

impl<T: Clone> StateCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: std::sync::Mutex::new(None),
        }
    }

    /// Cached state if it was fetched at most `ttl` before `now`
    pub fn get(&self, now: SystemTime) -> Option<T> {
        let entry = self.entry.lock().expect("lock poison");
        entry.as_ref().and_then(|cached| {
            now.duration_since(cached.fetched_at)
                .is_ok_and(|age| age <= self.ttl)
                .then(|| cached.state.clone())
        })
    }

    pub fn put(&self, state: T, now: SystemTime) {
        *self.entry.lock().expect("lock poison") = Some(CachedState {
            state,
            fetched_at: now,
        });
    }

    pub async fn get_or_try_fetch<F, Fut>(&self, now: SystemTime, fetch: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(state) = self.get(now) {
            return Ok(state);
        }
        let state = fetch().await?;
        self.put(state.clone(), now);
        Ok(state)
    }
}

impl<T: Clone> Default for StateCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
