use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::QueryCache;
use crate::error::ClientError;

/// Cache resource holding favorite lists.
pub const FAVORITES: &str = "favorites";

/// Server calls the store depends on.
#[async_trait]
pub trait FavoritesBackend: Send + Sync {
    /// Toggle on the server and return whether the listing is now favorited.
    async fn toggle_favorite(&self, property_id: Uuid) -> Result<bool, ClientError>;

    /// Every listing the signed-in user has favorited.
    async fn favorite_ids(&self) -> Result<Vec<Uuid>, ClientError>;
}

#[derive(Debug, Default)]
struct FavoriteState {
    /// Last value the server confirmed.
    confirmed: bool,
    /// Value shown to the user, ahead of the server while toggles are pending.
    shown: bool,
    /// Toggles started but not yet answered.
    pending: u32,
    /// Held while a toggle for this listing is on the wire, so the server
    /// sees toggles in the order the user made them.
    gate: Arc<tokio::sync::Mutex<()>>,
}

/// Favorite flags for one signed-in user with optimistic toggles.
pub struct FavoritesStore<B> {
    backend: B,
    cache: QueryCache,
    states: Mutex<HashMap<Uuid, FavoriteState>>,
}

impl<B: FavoritesBackend> FavoritesStore<B> {
    pub fn new(backend: B, cache: QueryCache) -> Self {
        Self {
            backend,
            cache,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Replace local state with the server's favorite list. Listings with a
    /// toggle in flight keep their pending state.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let ids: HashSet<Uuid> = self.backend.favorite_ids().await?.into_iter().collect();
        let mut states = self.lock();
        states.retain(|id, state| state.pending > 0 || ids.contains(id));
        for id in ids {
            let state = states.entry(id).or_default();
            if state.pending == 0 {
                state.confirmed = true;
                state.shown = true;
            }
        }
        Ok(())
    }

    pub fn is_favorited(&self, property_id: Uuid) -> bool {
        self.lock()
            .get(&property_id)
            .is_some_and(|s| s.shown)
    }

    /// Flip the flag immediately, then confirm with the server. Toggles on
    /// one listing reach the server one at a time and in order. Once the last
    /// pending toggle is answered the flag equals the server's state; a failed
    /// toggle undoes its own flip and returns the error.
    pub async fn toggle(&self, property_id: Uuid) -> Result<bool, ClientError> {
        let (optimistic, gate) = {
            let mut states = self.lock();
            let state = states.entry(property_id).or_default();
            state.shown = !state.shown;
            state.pending += 1;
            (state.shown, state.gate.clone())
        };
        debug!("Favorite {} -> {} (pending)", property_id, optimistic);

        let result = {
            let _turn = gate.lock().await;
            let result = self.backend.toggle_favorite(property_id).await;

            let mut states = self.lock();
            let state = states.entry(property_id).or_default();
            state.pending = state.pending.saturating_sub(1);
            match &result {
                Ok(favorited) => {
                    state.confirmed = *favorited;
                    if state.pending == 0 {
                        state.shown = *favorited;
                    }
                }
                Err(e) => {
                    warn!("Favorite toggle on {} failed, rolling back: {}", property_id, e);
                    state.shown = if state.pending == 0 {
                        state.confirmed
                    } else {
                        !state.shown
                    };
                }
            }
            result
        };

        if result.is_ok() {
            self.cache.invalidate(FAVORITES);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, FavoriteState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::cache::QueryKey;

    /// In-memory server with a switch to make every call fail and optional
    /// per-call response delays.
    #[derive(Default)]
    struct FakeServer {
        favorites: Mutex<HashSet<Uuid>>,
        offline: AtomicBool,
        /// Delay for the n-th toggle call, in call order.
        delays: Vec<Duration>,
        /// Calls that fail regardless of `offline`, by call index.
        fail_calls: Vec<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FavoritesBackend for FakeServer {
        async fn toggle_favorite(&self, property_id: Uuid) -> Result<bool, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(call) {
                tokio::time::sleep(*delay).await;
            }
            if self.offline.load(Ordering::SeqCst) || self.fail_calls.contains(&call) {
                return Err(ClientError::Transport("offline".into()));
            }
            let mut favorites = self.favorites.lock().unwrap();
            if favorites.remove(&property_id) {
                Ok(false)
            } else {
                favorites.insert(property_id);
                Ok(true)
            }
        }

        async fn favorite_ids(&self) -> Result<Vec<Uuid>, ClientError> {
            Ok(self.favorites.lock().unwrap().iter().copied().collect())
        }
    }

    fn store() -> FavoritesStore<FakeServer> {
        FavoritesStore::new(FakeServer::default(), QueryCache::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn double_toggle_restores_original_state() {
        let store = store();
        let id = Uuid::new_v4();

        assert!(store.toggle(id).await.unwrap());
        assert!(store.is_favorited(id));
        assert!(!store.toggle(id).await.unwrap());
        assert!(!store.is_favorited(id));
        assert!(store.backend.favorites.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_toggle_rolls_back_to_confirmed_state() {
        let store = store();
        let id = Uuid::new_v4();
        store.toggle(id).await.unwrap();

        store.backend.offline.store(true, Ordering::SeqCst);
        let err = store.toggle(id).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(store.is_favorited(id));
    }

    #[tokio::test]
    async fn successful_toggle_invalidates_favorite_lists() {
        let store = store();
        let key = QueryKey::new(FAVORITES, "page=1");
        store
            .cache
            .fetch(key.clone(), || async { Ok::<_, ClientError>(0u32) })
            .await
            .unwrap();
        assert!(store.cache.is_fresh(&key));

        store.toggle(Uuid::new_v4()).await.unwrap();
        assert!(!store.cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn refresh_loads_server_state() {
        let store = store();
        let id = Uuid::new_v4();
        store.backend.favorites.lock().unwrap().insert(id);

        assert!(!store.is_favorited(id));
        store.refresh().await.unwrap();
        assert!(store.is_favorited(id));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_toggles_settle_on_server_state() {
        let backend = FakeServer {
            delays: vec![Duration::from_millis(200), Duration::from_millis(10)],
            ..Default::default()
        };
        let store = FavoritesStore::new(backend, QueryCache::new(Duration::from_secs(60)));
        let id = Uuid::new_v4();

        let (first, second) = tokio::join!(store.toggle(id), store.toggle(id));
        assert!(first.unwrap());
        assert!(!second.unwrap());

        let on_server = store.backend.favorites.lock().unwrap().contains(&id);
        assert!(!on_server);
        assert_eq!(store.is_favorited(id), on_server);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_among_concurrent_toggles_keeps_server_state() {
        let backend = FakeServer {
            delays: vec![Duration::from_millis(50), Duration::from_millis(50), Duration::from_millis(50)],
            fail_calls: vec![1],
            ..Default::default()
        };
        let store = FavoritesStore::new(backend, QueryCache::new(Duration::from_secs(60)));
        let id = Uuid::new_v4();

        let (a, b, c) = tokio::join!(store.toggle(id), store.toggle(id), store.toggle(id));
        assert!(a.unwrap());
        assert!(b.is_err());
        assert!(!c.unwrap());

        let on_server = store.backend.favorites.lock().unwrap().contains(&id);
        assert_eq!(store.is_favorited(id), on_server);
    }
}
