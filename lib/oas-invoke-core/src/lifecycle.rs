//! Client handles and their readiness lifecycle.
//!
//! A [`ClientHandle`] starts `Pending`, then settles exactly once to `Ready`
//! or `Failed`. Opening a different URL never mutates an existing handle: it
//! creates a new one and the old one is simply abandoned, in-flight calls
//! included.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::auth::{Authentication, Credentials};
use crate::description::ApiDescription;
use crate::error::SpecLoadError;
use crate::invoker::OperationInvoker;
use crate::registry::SpecRegistry;
use crate::status::SuccessStatuses;
use crate::transport::{ReqwestTransport, Transport};

const EVENT_CAPACITY: usize = 16;

/// Readiness of a [`ClientHandle`].
#[derive(Debug, Clone)]
pub enum HandleState {
    /// The description is being loaded.
    Pending,
    /// The description is loaded; the handle may be invoked.
    Ready(Arc<ApiDescription>),
    /// Loading failed; the handle is unusable.
    Failed(Arc<SpecLoadError>),
}

impl HandleState {
    /// `"pending"`, `"ready"` or `"failed"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether the state is final.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
struct HandleInner {
    url: String,
    authentication: Option<Authentication>,
    state: watch::Sender<HandleState>,
    abandoned: AtomicBool,
}

/// Binds a spec URL to its description and readiness state.
///
/// Clones observe the same state. Only [`ClientLifecycle`] settles a handle.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

impl ClientHandle {
    fn pending(url: &str, authentication: Option<Authentication>) -> Self {
        let (state, _) = watch::channel(HandleState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                url: url.to_string(),
                authentication,
                state,
                abandoned: AtomicBool::new(false),
            }),
        }
    }

    /// Leaves `Pending`; later calls are ignored.
    fn settle(&self, state: HandleState) {
        self.inner.state.send_if_modified(|current| {
            if current.is_settled() {
                return false;
            }
            *current = state;
            true
        });
    }

    /// The spec URL, exactly as opened.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> HandleState {
        self.inner.state.borrow().clone()
    }

    /// Whether the handle may be invoked.
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), HandleState::Ready(_))
    }

    /// The description, only when `Ready`.
    pub fn description(&self) -> Option<Arc<ApiDescription>> {
        match &*self.inner.state.borrow() {
            HandleState::Ready(description) => Some(Arc::clone(description)),
            HandleState::Pending | HandleState::Failed(_) => None,
        }
    }

    /// The load error, only when `Failed`.
    pub fn error(&self) -> Option<Arc<SpecLoadError>> {
        match &*self.inner.state.borrow() {
            HandleState::Failed(error) => Some(Arc::clone(error)),
            HandleState::Pending | HandleState::Ready(_) => None,
        }
    }

    /// Waits until the handle leaves `Pending` and returns the final state.
    pub async fn wait_settled(&self) -> HandleState {
        let mut receiver = self.inner.state.subscribe();
        match receiver.wait_for(HandleState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Whether both values are clones of the same handle.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn authentication(&self) -> Option<&Authentication> {
        self.inner.authentication.as_ref()
    }

    /// Whether the lifecycle has replaced or closed this handle.
    pub fn is_abandoned(&self) -> bool {
        self.inner.abandoned.load(Ordering::Acquire)
    }

    fn abandon(&self) {
        self.inner.abandoned.store(true, Ordering::Release);
    }
}

/// Lifecycle notification, emitted once per handle when it settles.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A handle became `Ready`.
    Ready {
        /// Spec URL of the handle.
        url: String,
    },
    /// A handle became `Failed`.
    Failed {
        /// Spec URL of the handle.
        url: String,
        /// Why loading failed.
        error: Arc<SpecLoadError>,
    },
}

/// Owns the current [`ClientHandle`] and the [`SpecRegistry`] behind it.
#[derive(Debug)]
pub struct ClientLifecycle<T = ReqwestTransport> {
    registry: Arc<SpecRegistry<T>>,
    transport: Arc<T>,
    authentication: Option<Authentication>,
    success: SuccessStatuses,
    current: Mutex<Option<ClientHandle>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ClientLifecycle {
    /// Starts configuring a lifecycle using [`ReqwestTransport`].
    pub fn builder() -> ClientLifecycleBuilder {
        ClientLifecycleBuilder::default()
    }
}

impl<T> ClientLifecycle<T>
where
    T: Transport,
{
    /// Returns the handle for `url` once it has settled.
    ///
    /// The same URL yields the same handle, whatever its state, until
    /// [`close`](Self::close) or an `open` with another URL. A new URL creates
    /// a brand-new handle; handles previously returned are left untouched.
    pub async fn open(&self, url: &str) -> ClientHandle {
        let handle = {
            let mut current = self.lock_current();
            match current.as_ref().filter(|handle| handle.url() == url) {
                Some(handle) => {
                    debug!(%url, state = handle.state().name(), "reusing client handle");
                    handle.clone()
                }
                None => {
                    let handle = ClientHandle::pending(url, self.authentication.clone());
                    if let Some(previous) = current.replace(handle.clone()) {
                        previous.abandon();
                        info!(previous = %previous.url(), %url, "spec URL changed, abandoning previous handle");
                    }
                    self.spawn_load(handle.clone());
                    handle
                }
            }
        };

        handle.wait_settled().await;
        handle
    }

    fn spawn_load(&self, handle: ClientHandle) {
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        tokio::spawn(async move {
            let url = handle.url().to_string();
            let still_current = || !handle.is_abandoned();
            let (state, event) = match registry.load_cached_if(&url, still_current).await {
                Ok(description) => {
                    info!(%url, "client ready");
                    (
                        HandleState::Ready(description),
                        LifecycleEvent::Ready { url },
                    )
                }
                Err(error) => {
                    let error = Arc::new(error);
                    warn!(%url, %error, "client failed");
                    (
                        HandleState::Failed(Arc::clone(&error)),
                        LifecycleEvent::Failed { url, error },
                    )
                }
            };
            handle.settle(state);
            // Nobody listening is fine.
            let _ = events.send(event);
        });
    }

    /// Releases `handle` if it is the current one, and drops the cached description.
    ///
    /// Returns `false` (and does nothing) for any other handle.
    pub async fn close(&self, handle: &ClientHandle) -> bool {
        let released = {
            let mut current = self.lock_current();
            match current.as_ref() {
                Some(current_handle) if current_handle.same_as(handle) => current.take(),
                _ => None,
            }
        };
        let Some(released) = released else {
            return false;
        };

        released.abandon();
        info!(url = %released.url(), "client closed");
        self.registry.invalidate().await;
        true
    }

    /// The current handle, if any.
    pub fn current(&self) -> Option<ClientHandle> {
        self.lock_current().clone()
    }

    /// Subscribes to `Ready`/`Failed` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// An invoker sharing this lifecycle's transport and success statuses.
    pub fn invoker(&self) -> OperationInvoker<T> {
        OperationInvoker::new(Arc::clone(&self.transport))
            .with_success_statuses(self.success.clone())
    }

    /// The registry backing this lifecycle.
    pub fn registry(&self) -> &SpecRegistry<T> {
        &self.registry
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<ClientHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ClientLifecycle`].
#[derive(Debug)]
pub struct ClientLifecycleBuilder<T = ReqwestTransport> {
    transport: Arc<T>,
    authentication: Option<Authentication>,
    success: SuccessStatuses,
}

impl Default for ClientLifecycleBuilder {
    fn default() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::default()),
            authentication: None,
            success: SuccessStatuses::default(),
        }
    }
}

impl<T> ClientLifecycleBuilder<T>
where
    T: Transport,
{
    /// Replaces the transport.
    pub fn with_transport<U>(self, transport: U) -> ClientLifecycleBuilder<U>
    where
        U: Transport,
    {
        ClientLifecycleBuilder {
            transport: Arc::new(transport),
            authentication: self.authentication,
            success: self.success,
        }
    }

    /// Attaches a `{authType, user, password}` bundle to every request.
    #[must_use]
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.with_authentication(credentials.into_authentication())
    }

    /// Attaches an authentication to every request.
    #[must_use]
    pub fn with_authentication(mut self, authentication: Option<Authentication>) -> Self {
        self.authentication = authentication;
        self
    }

    /// Sets the statuses delivered on the success channel.
    #[must_use]
    pub fn with_success_statuses(mut self, success: SuccessStatuses) -> Self {
        self.success = success;
        self
    }

    /// Builds the lifecycle, without any handle.
    pub fn build(self) -> ClientLifecycle<T> {
        let Self {
            transport,
            authentication,
            success,
        } = self;
        let registry = SpecRegistry::new(Arc::clone(&transport))
            .with_authentication(authentication.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        ClientLifecycle {
            registry: Arc::new(registry),
            transport,
            authentication,
            success,
            current: Mutex::new(None),
            events,
        }
    }
}
