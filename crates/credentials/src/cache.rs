use std::sync::{Arc, Weak};
use std::time::Duration;

use foundation::time::Clock;
use futures_util::FutureExt;
use futures_util::future::Shared;
use parking_lot::Mutex;
use store::{KeyValueStore, load_json, save_json};
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialError, CredentialLease};
use crate::service::{BoxFuture, CredentialService};

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STORE_KEY: &str = "credentials.last";

#[derive(Debug, Clone)]
pub struct CredentialCacheConfig {
    /// A refresh starts once the remaining lifetime drops below this.
    pub refresh_margin: Duration,
    pub fetch_timeout: Duration,
    pub store_key: String,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            store_key: DEFAULT_STORE_KEY.to_string(),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Credential, CredentialError>>>;

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct State {
    current: Option<Credential>,
    inflight: Option<InFlight>,
    /// Bumped by `invalidate`; fetches started under an older generation are not installed.
    generation: u64,
}

struct Inner {
    service: Arc<dyn CredentialService>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn KeyValueStore>>,
    config: CredentialCacheConfig,
    state: Mutex<State>,
}

/// Holds one bearer credential and keeps it fresh.
///
/// Concurrent callers that find no usable credential all await the same in-flight fetch,
/// so at most one request is outstanding at a time. Cloning the cache is cheap and clones
/// share state.
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Inner>,
}

impl CredentialCache {
    pub fn new(
        service: Arc<dyn CredentialService>,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn KeyValueStore>>,
        config: CredentialCacheConfig,
    ) -> Self {
        let current = store
            .as_deref()
            .and_then(|s| load_persisted(s, &config.store_key, clock.as_ref()));

        Self {
            inner: Arc::new(Inner {
                service,
                clock,
                store,
                config,
                state: Mutex::new(State {
                    current,
                    ..State::default()
                }),
            }),
        }
    }

    /// The cached credential if it is still valid, without touching the network.
    pub fn try_get(&self) -> Option<Credential> {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .filter(|c| c.is_valid_at(now))
            .cloned()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().inflight.is_some()
    }

    pub async fn get_credential(&self) -> Result<CredentialLease, CredentialError> {
        let now = self.inner.clock.now();
        let margin = self.inner.config.refresh_margin;

        let fetch = {
            let mut state = self.inner.state.lock();
            let usable = state
                .current
                .as_ref()
                .filter(|c| c.is_valid_at(now))
                .cloned();

            if let Some(credential) = usable {
                if credential.needs_refresh(now, margin) {
                    let (fetch, started) = self.inner.join_or_start(&mut state);
                    if started {
                        debug!("credential close to expiry; refreshing in background");
                        tokio::spawn(async move {
                            if let Err(err) = fetch.await {
                                warn!("background credential refresh failed: {err}");
                            }
                        });
                    }
                }
                return Ok(CredentialLease::Valid(credential));
            }

            self.inner.join_or_start(&mut state).0
        };

        match fetch.await {
            Ok(credential) => Ok(CredentialLease::Valid(credential)),
            Err(cause) => {
                let stale = self.inner.state.lock().current.clone();
                match stale {
                    Some(credential) => {
                        warn!("handing out expired credential after failed refresh: {cause}");
                        Ok(CredentialLease::Degraded { credential, cause })
                    }
                    None => Err(cause),
                }
            }
        }
    }

    /// Drop the cached (and persisted) credential. The next call always fetches.
    pub fn invalidate(&self) {
        {
            let mut state = self.inner.state.lock();
            state.current = None;
            state.inflight = None;
            state.generation = state.generation.wrapping_add(1);
        }
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.delete(&self.inner.config.store_key) {
                warn!("failed to clear persisted credential: {err}");
            }
        }
        info!("credential cache invalidated");
    }
}

impl Inner {
    /// Join the in-flight fetch or start a new one. The flag is `true` for a new fetch.
    fn join_or_start(self: &Arc<Self>, state: &mut State) -> (SharedFetch, bool) {
        if let Some(inflight) = &state.inflight {
            return (inflight.fetch.clone(), false);
        }

        let generation = state.generation;
        let service = Arc::clone(&self.service);
        let clock = Arc::clone(&self.clock);
        let timeout = self.config.fetch_timeout;
        let weak: Weak<Inner> = Arc::downgrade(self);

        let fetch = async move {
            let result = match tokio::time::timeout(timeout, service.fetch()).await {
                Err(_elapsed) => Err(CredentialError::FetchTimeout),
                Ok(Err(err)) => Err(err),
                Ok(Ok(grant)) => {
                    let credential = Credential::from_grant(&grant, clock.now());
                    if credential.is_valid_at(clock.now()) {
                        Ok(credential)
                    } else {
                        Err(CredentialError::FetchFailed(
                            "credential service returned an expired token".to_string(),
                        ))
                    }
                }
            };
            match weak.upgrade() {
                Some(inner) => inner.complete(generation, result),
                None => result,
            }
        }
        .boxed()
        .shared();

        state.inflight = Some(InFlight {
            generation,
            fetch: fetch.clone(),
        });
        (fetch, true)
    }

    fn complete(
        &self,
        generation: u64,
        result: Result<Credential, CredentialError>,
    ) -> Result<Credential, CredentialError> {
        let install = {
            let mut state = self.state.lock();
            if state
                .inflight
                .as_ref()
                .is_some_and(|f| f.generation == generation)
            {
                state.inflight = None;
            }
            match &result {
                Ok(credential) if state.generation == generation => {
                    state.current = Some(credential.clone());
                    Some(credential.clone())
                }
                Ok(_) => {
                    debug!("discarding credential fetched before invalidation");
                    None
                }
                Err(err) => {
                    warn!("credential fetch failed: {err}");
                    None
                }
            }
        };

        if let (Some(credential), Some(store)) = (install, &self.store) {
            debug!(expires_at = credential.expires_at().as_millis(), "credential refreshed");
            if let Err(err) = save_json(store.as_ref(), &self.config.store_key, &credential) {
                warn!("failed to persist credential: {err}");
            }
        }
        result
    }
}

fn load_persisted(store: &dyn KeyValueStore, key: &str, clock: &dyn Clock) -> Option<Credential> {
    match load_json::<Credential>(store, key) {
        Ok(Some(credential)) if credential.is_valid_at(clock.now()) => {
            info!("reusing persisted credential");
            Some(credential)
        }
        Ok(Some(_expired)) => {
            debug!("discarding expired persisted credential");
            if let Err(err) = store.delete(key) {
                warn!("failed to clear expired credential: {err}");
            }
            None
        }
        Ok(None) => None,
        Err(err) => {
            warn!("ignoring unreadable persisted credential: {err}");
            None
        }
    }
}
