//! Capture sessions and their lifecycle
//!
//! A `Session` moves through `Open -> Running -> Closing -> Closed`.
//! The native handle lives in a lock-guarded slot that is emptied
//! exactly once, by whichever of `close` or the final drop gets there
//! first. Deliveries check the slot under the same lock, so nothing is
//! sent once a close has taken the handle.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pcapbridge_core::{
    CaptureMessage, CorrelationToken, Error, LinkType, Result, SessionState,
};

use crate::config::CaptureConfig;
use crate::driver::{CaptureDriver, NativeSession};
use crate::runner::{self, RunnerHandle};
use crate::stats::{CaptureStats, StatsAccumulator};

/// Lifecycle state together with the native handle it guards
pub(crate) struct Slot {
    pub(crate) state: SessionState,
    pub(crate) native: Option<Arc<dyn NativeSession>>,
}

/// Session state shared with the capture thread
pub(crate) struct Shared {
    pub(crate) token: CorrelationToken,
    pub(crate) link_type: LinkType,
    pub(crate) device: String,
    pub(crate) consumer: mpsc::Sender<CaptureMessage>,
    pub(crate) slot: RwLock<Slot>,
    pub(crate) runner_active: AtomicBool,
    pub(crate) stats: StatsAccumulator,
}

impl Shared {
    pub(crate) fn new(
        token: CorrelationToken,
        link_type: LinkType,
        device: String,
        consumer: mpsc::Sender<CaptureMessage>,
        native: Arc<dyn NativeSession>,
    ) -> Self {
        Self {
            token,
            link_type,
            device,
            consumer,
            slot: RwLock::new(Slot {
                state: SessionState::Open,
                native: Some(native),
            }),
            runner_active: AtomicBool::new(false),
            stats: StatsAccumulator::new(),
        }
    }
}

struct SessionCore {
    shared: Arc<Shared>,
    config: CaptureConfig,
    runner: Mutex<Option<RunnerHandle>>,
}

impl SessionCore {
    fn close(&self) -> Result<()> {
        let token = self.shared.token;
        let native = {
            let mut slot = self.shared.slot.write();
            match slot.native.take() {
                Some(native) => {
                    slot.state = SessionState::Closing;
                    native
                }
                None => return Err(Error::invalid_state(slot.state, "close")),
            }
        };

        info!(token = %token, "Closing capture session");
        native.request_break();

        let runner = self.runner.lock().take();
        if let Some(runner) = runner {
            if !runner.wait(self.config.close_grace) {
                warn!(
                    token = %token,
                    grace_ms = self.config.close_grace.as_millis() as u64,
                    "Capture thread did not acknowledge break; native close deferred until it exits"
                );
            }
        }

        drop(native);
        self.shared.slot.write().state = SessionState::Closed;
        info!(token = %token, "Capture session closed");
        Ok(())
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        if self.shared.slot.read().native.is_none() {
            return;
        }
        debug!(token = %self.shared.token, "Finalizing unclosed capture session");
        if let Err(e) = self.close() {
            debug!(token = %self.shared.token, error = %e, "Session closed concurrently");
        }
    }
}

/// Handle to a capture session
///
/// Clones share the same session. When the last clone is dropped an
/// unclosed session is closed as if `close` had been called, which
/// blocks the dropping thread the same way `close` does.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// Open a capture session delivering to `consumer`
    ///
    /// `config.device` of `None` (or empty) selects the driver's "any"
    /// device. Library failures come back as `Error::Capture` carrying
    /// the library's diagnostic unchanged.
    pub fn open<D: CaptureDriver + ?Sized>(
        driver: &D,
        config: CaptureConfig,
        consumer: mpsc::Sender<CaptureMessage>,
    ) -> Result<Self> {
        config.validate()?;

        let device = match config.device.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => driver.any_device().map(str::to_string).ok_or_else(|| {
                Error::invalid_argument(
                    "no device given and this platform has no \"any\" capture device",
                )
            })?,
        };

        let native: Arc<dyn NativeSession> =
            Arc::from(driver.open_live(&device, &config).map_err(Error::Capture)?);
        let link_type = LinkType(native.link_type());
        let token = CorrelationToken::new();

        info!(
            token = %token,
            device = %device,
            link_type = %link_type,
            snaplen = config.snaplen,
            "Opened capture session"
        );

        let shared = Arc::new(Shared::new(token, link_type, device, consumer, native));
        Ok(Self {
            core: Arc::new(SessionCore {
                shared,
                config,
                runner: Mutex::new(None),
            }),
        })
    }

    /// Open a session together with a fresh bounded consumer channel
    ///
    /// The channel holds `config.channel_capacity` messages.
    pub fn open_channel<D: CaptureDriver + ?Sized>(
        driver: &D,
        config: CaptureConfig,
    ) -> Result<(Self, mpsc::Receiver<CaptureMessage>)> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let session = Self::open(driver, config, tx)?;
        Ok((session, rx))
    }

    /// Start the capture thread
    ///
    /// Fails with `InvalidState` unless the session is `Open`; nothing
    /// is spawned in that case.
    pub fn start(&self) -> Result<()> {
        let shared = &self.core.shared;
        let mut runner = self.core.runner.lock();

        let native = {
            let mut slot = shared.slot.write();
            let native = match (slot.state, slot.native.as_ref()) {
                (SessionState::Open, Some(native)) => Arc::clone(native),
                (state, _) => return Err(Error::invalid_state(state, "start")),
            };
            slot.state = SessionState::Running;
            native
        };

        match runner::spawn(Arc::clone(shared), native) {
            Ok(handle) => {
                *runner = Some(handle);
                info!(token = %shared.token, "Capture started");
                Ok(())
            }
            Err(e) => {
                let mut slot = shared.slot.write();
                if slot.state == SessionState::Running {
                    slot.state = SessionState::Open;
                }
                Err(e.into())
            }
        }
    }

    /// Close the session
    ///
    /// Requests a break, waits up to `close_grace` for the capture
    /// thread to exit, then releases the native handle. A second call
    /// fails with `InvalidState`.
    ///
    /// This blocks the calling thread for as long as the wait lasts. From
    /// async code run it with `tokio::task::spawn_blocking`.
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    /// Compile and install a BPF filter
    ///
    /// A rejected expression returns the library diagnostic and leaves
    /// the session state untouched.
    pub fn set_filter(&self, expression: &str, optimize: bool) -> Result<()> {
        if expression.contains('\0') {
            return Err(Error::invalid_argument("filter expression contains a NUL byte"));
        }
        self.call_native("filter", |native| native.install_filter(expression, optimize))?;
        debug!(token = %self.token(), filter = %expression, "Filter installed");
        Ok(())
    }

    /// Inject a raw frame on the session's device
    pub fn send(&self, frame: &[u8]) -> Result<()> {
        self.call_native("send on", |native| native.send_raw(frame))?;
        debug!(token = %self.token(), len = frame.len(), "Frame sent");
        Ok(())
    }

    /// Delivery statistics
    pub fn stats(&self) -> CaptureStats {
        self.core.shared.stats.snapshot()
    }

    /// Delivery statistics merged with the library's counters
    pub fn capture_stats(&self) -> Result<CaptureStats> {
        let native_stats = self.call_native("read statistics of", |native| native.stats())?;
        Ok(self.stats().with_native(native_stats))
    }

    /// Token tagging every message this session delivers
    pub fn token(&self) -> CorrelationToken {
        self.core.shared.token
    }

    /// Link-layer type recorded at open
    pub fn link_type(&self) -> LinkType {
        self.core.shared.link_type
    }

    /// Device the session was opened on
    pub fn device(&self) -> &str {
        &self.core.shared.device
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &CaptureConfig {
        &self.core.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.core.shared.slot.read().state
    }

    /// Whether the capture thread is still inside its loop
    pub fn is_running(&self) -> bool {
        self.core.shared.runner_active.load(Ordering::SeqCst)
    }

    /// Run a library call against the live handle
    ///
    /// With no read timeout a running capture loop never lets go of the
    /// handle, so the call is refused with `InvalidState` instead of
    /// waiting on it. The runner lock keeps `start` out meanwhile.
    fn call_native<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&dyn NativeSession) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let unbounded_reads = self.core.config.timeout_ms == 0;
        let _runner = unbounded_reads.then(|| self.core.runner.lock());

        let native = {
            let slot = self.core.shared.slot.read();
            match slot.native.as_ref() {
                Some(_) if unbounded_reads && self.is_running() => {
                    return Err(Error::invalid_state(slot.state, operation))
                }
                Some(native) => Arc::clone(native),
                None => return Err(Error::invalid_state(slot.state, operation)),
            }
        };
        call(native.as_ref()).map_err(Error::Capture)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token())
            .field("device", &self.device())
            .field("link_type", &self.link_type())
            .field("state", &self.state())
            .finish()
    }
}
