//! Detector lifecycle controller
//!
//! [`VadController`] owns at most one detector and exposes five operations:
//! [`initialize`](VadController::initialize), [`terminate`](VadController::terminate),
//! [`start`](VadController::start), [`pause`](VadController::pause) and
//! [`toggle`](VadController::toggle). Calls that are not valid in the current
//! state are logged as warnings and skipped, so callers can invoke them
//! freely from an event loop.
//!
//! Two policies run on top of the operations:
//! - auto-initialize: [`VadController::mount`] initializes once when
//!   `initialize_on_mount` is set
//! - auto-start: [`start`](VadController::start) runs whenever the controller
//!   becomes ready and `start_on_ready` is set
//!
//! Every state change is published as a [`VadState`] snapshot on a watch
//! channel.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::detector::{AudioChunk, Detector, DetectorFactory};
use crate::options::{ControllerOptions, DetectorOptions, PartialVadOptions, VadOptions, split};

pub use state::VadState;

struct Inner {
    detector: Option<Arc<dyn Detector>>,
    loading: bool,
    error: Option<String>,
    listening: bool,
    mounted: bool,
    options: ControllerOptions,
    detector_options: DetectorOptions,
}

impl Inner {
    fn ready(&self) -> bool {
        self.detector.is_some() && !self.loading && self.error.is_none()
    }

    fn ready_detector(&self) -> Option<Arc<dyn Detector>> {
        self.detector.clone().filter(|_| self.ready())
    }

    fn is_current(&self, detector: &Arc<dyn Detector>) -> bool {
        self.detector
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, detector))
    }
}

/// Lifecycle controller for a single detector
///
/// The internal lock is never held while the detector is called, so detector
/// callbacks may use the controller freely.
pub struct VadController {
    id: Uuid,
    factory: Arc<dyn DetectorFactory>,
    defaults: VadOptions,
    inner: Mutex<Inner>,
    state: Arc<watch::Sender<VadState>>,
}

impl VadController {
    /// Create a controller with default options under `overrides`
    ///
    /// No detector is created; see [`mount`](Self::mount) for the
    /// auto-initializing constructor.
    #[must_use]
    pub fn new(factory: Arc<dyn DetectorFactory>, overrides: &PartialVadOptions) -> Self {
        Self::with_defaults(factory, VadOptions::default(), overrides)
    }

    /// Create a controller with custom defaults
    #[must_use]
    pub fn with_defaults(
        factory: Arc<dyn DetectorFactory>,
        defaults: VadOptions,
        overrides: &PartialVadOptions,
    ) -> Self {
        let (tx, _) = watch::channel(VadState::default());
        let state = Arc::new(tx);
        let (options, detector_options) =
            split(&defaults, overrides, speaking_publisher(&state));

        let id = Uuid::new_v4();
        tracing::debug!(controller = %id, factory = factory.name(), ?options, "controller created");

        Self {
            id,
            factory,
            defaults,
            inner: Mutex::new(Inner {
                detector: None,
                loading: false,
                error: None,
                listening: false,
                mounted: true,
                options,
                detector_options,
            }),
            state,
        }
    }

    /// Create a controller and apply the auto-initialize policy
    ///
    /// When `initialize_on_mount` is set, initialization is spawned on the
    /// current tokio runtime. Outside a runtime it is skipped with a warning.
    #[must_use]
    pub fn mount(factory: Arc<dyn DetectorFactory>, overrides: &PartialVadOptions) -> Arc<Self> {
        let controller = Arc::new(Self::new(factory, overrides));
        if controller.lock().options.initialize_on_mount {
            controller.spawn_initialize();
        }
        controller
    }

    /// Controller identifier used in logs
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current state snapshot
    #[must_use]
    pub fn state(&self) -> VadState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VadState> {
        self.state.subscribe()
    }

    /// Check if a detector is present, not loading and not errored
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().ready()
    }

    /// Options currently in effect for the controller
    #[must_use]
    pub fn controller_options(&self) -> ControllerOptions {
        self.lock().options
    }

    /// Live audio stream of the current detector, if it exposes one
    #[must_use]
    pub fn audio_stream(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        let detector = self.lock().detector.clone()?;
        detector.audio_stream()
    }

    /// Construct a new detector
    ///
    /// Skipped with a warning while another initialization is in flight. A
    /// previous construction error is cleared and construction retried. A
    /// ready detector is terminated first. Construction failures are stored
    /// in the state, never returned.
    pub async fn initialize(&self) {
        let (options, previous) = {
            let mut inner = self.lock();
            if !inner.mounted {
                tracing::warn!(controller = %self.id, "cannot initialize after unmount");
                return;
            }
            if inner.loading {
                tracing::warn!(controller = %self.id, "cannot initialize while loading");
                return;
            }
            if let Some(error) = inner.error.take() {
                tracing::info!(controller = %self.id, %error, "retrying after failed initialization");
            }

            inner.loading = true;
            inner.listening = false;
            (inner.detector_options.clone(), inner.detector.take())
        };

        if let Some(detector) = previous {
            self.release(&detector);
        }
        self.publish(&self.lock());

        tracing::debug!(controller = %self.id, factory = self.factory.name(), "creating detector");
        let result = self.factory.create(options).await;

        let auto_start = {
            let mut inner = self.lock();
            if !inner.mounted {
                drop(inner);
                if let Ok(detector) = result {
                    detector.destroy();
                }
                tracing::debug!(controller = %self.id, "unmounted during initialization, discarding detector");
                return;
            }

            match result {
                Ok(detector) => {
                    inner.detector = Some(Arc::from(detector));
                    tracing::info!(controller = %self.id, "detector ready");
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(controller = %self.id, error = %message, "detector construction failed");
                    inner.detector = None;
                    inner.error = Some(message);
                    inner.listening = false;
                }
            }
            inner.loading = false;
            self.publish(&inner);
            inner.ready() && inner.options.start_on_ready
        };

        if auto_start {
            tracing::debug!(controller = %self.id, "ready, starting automatically");
            self.start();
        }
    }

    /// Destroy the current detector and release its audio resources
    ///
    /// Skipped with a warning when no detector exists. The new state is
    /// published once the detector's resources are released.
    pub fn terminate(&self) {
        let detector = {
            let mut inner = self.lock();
            let Some(detector) = inner.detector.take() else {
                tracing::warn!(controller = %self.id, "cannot terminate while uninstantiated");
                return;
            };
            inner.loading = false;
            inner.error = None;
            inner.listening = false;
            detector
        };

        self.release(&detector);
        self.publish(&self.lock());
    }

    /// Start detection
    ///
    /// Skipped with a warning until the controller is ready.
    pub fn start(&self) {
        let detector = {
            let inner = self.lock();
            let Some(detector) = inner.ready_detector() else {
                tracing::warn!(controller = %self.id, "cannot start until ready");
                return;
            };
            if inner.listening {
                tracing::debug!(controller = %self.id, "already listening");
                return;
            }
            detector
        };

        detector.start();
        self.set_listening(&detector, true);
        tracing::debug!(controller = %self.id, "listening started");
    }

    /// Pause detection, keeping the detector and its audio stream
    ///
    /// Skipped with a warning until the controller is ready.
    pub fn pause(&self) {
        let Some(detector) = self.lock().ready_detector() else {
            tracing::warn!(controller = %self.id, "cannot pause until ready");
            return;
        };

        detector.pause();
        self.set_listening(&detector, false);
        tracing::debug!(controller = %self.id, "listening paused");
    }

    /// Pause when listening, start otherwise
    pub fn toggle(&self) {
        let listening = self.lock().listening;
        if listening {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Replace the caller options
    ///
    /// Detector options take effect on the next initialization. Turning
    /// `initialize_on_mount` on re-runs the auto-initialize policy.
    pub fn reconfigure(self: &Arc<Self>, overrides: &PartialVadOptions) {
        let initialize = {
            let mut inner = self.lock();
            let (options, detector_options) =
                split(&self.defaults, overrides, speaking_publisher(&self.state));
            let newly_enabled = options.initialize_on_mount && !inner.options.initialize_on_mount;
            tracing::debug!(controller = %self.id, ?options, "controller reconfigured");
            inner.options = options;
            inner.detector_options = detector_options;
            newly_enabled && inner.mounted
        };

        if initialize {
            self.spawn_initialize();
        }
    }

    /// Tear down the detector and stop accepting operations
    ///
    /// An initialization still in flight discards its detector when it
    /// completes.
    pub fn unmount(&self) {
        let detector = {
            let mut inner = self.lock();
            if !inner.mounted {
                return;
            }
            inner.mounted = false;
            inner.loading = false;
            inner.listening = false;
            inner.detector.take()
        };

        if let Some(detector) = detector {
            self.release(&detector);
        }
        self.publish(&self.lock());
        tracing::debug!(controller = %self.id, "controller unmounted");
    }

    fn spawn_initialize(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(controller = %self.id, "no tokio runtime, skipping automatic initialization");
            return;
        };

        let controller = Arc::clone(self);
        runtime.spawn(async move {
            controller.initialize().await;
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, detector: &Arc<dyn Detector>) {
        detector.destroy();
        tracing::debug!(controller = %self.id, "detector terminated");
    }

    /// Record a start or pause, unless the detector was replaced meanwhile
    fn set_listening(&self, detector: &Arc<dyn Detector>, listening: bool) {
        let mut inner = self.lock();
        if inner.is_current(detector) {
            inner.listening = listening;
            self.publish(&inner);
        }
    }

    fn publish(&self, inner: &Inner) {
        let next = VadState {
            loading: inner.loading,
            error: inner.error.clone(),
            ready: inner.ready(),
            listening: inner.listening,
            user_speaking: false,
        };
        self.state.send_if_modified(|state| {
            let user_speaking = inner.listening && state.user_speaking;
            let next = VadState {
                user_speaking,
                ..next
            };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

impl Drop for VadController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(detector) = inner.detector.take() {
            detector.destroy();
        }
    }
}

/// Publishes the speaking flag derived by the injected frame handler
fn speaking_publisher(state: &Arc<watch::Sender<VadState>>) -> impl Fn(bool) + Send + Sync + 'static {
    let state = Arc::clone(state);
    move |speaking| {
        state.send_if_modified(|s| {
            if s.listening && s.user_speaking != speaking {
                s.user_speaking = speaking;
                true
            } else {
                false
            }
        });
    }
}
