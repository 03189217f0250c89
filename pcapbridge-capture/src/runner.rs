//! Capture loop runner
//!
//! One OS thread per started session drives the blocking capture call
//! and feeds every frame through the delivery channel. The thread holds
//! its own reference to the native handle; dropping that reference and
//! then the exit sender is how it tells `close` it is gone.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::delivery::{deliver_error, deliver_packet};
use crate::driver::{FrameHeader, LoopExit, NativeSession};
use crate::session::Shared;

/// Join handle and exit acknowledgement of a capture thread
pub(crate) struct RunnerHandle {
    thread: JoinHandle<()>,
    exited: Receiver<()>,
}

impl RunnerHandle {
    /// Wait up to `grace` for the thread to exit, then join it
    ///
    /// Returns `false` if the grace period ran out; the thread is then
    /// left detached and releases the native handle whenever it exits.
    pub(crate) fn wait(self, grace: Duration) -> bool {
        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    error!("Capture thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Spawn the capture thread for `shared`
pub(crate) fn spawn(shared: Arc<Shared>, native: Arc<dyn NativeSession>) -> io::Result<RunnerHandle> {
    let (exit_tx, exited) = bounded::<()>(0);
    let name = format!("pcapbridge-{}", shared.token);

    shared.runner_active.store(true, Ordering::SeqCst);
    let thread_shared = Arc::clone(&shared);
    let result = thread::Builder::new()
        .name(name)
        .spawn(move || run(thread_shared, native, exit_tx));

    match result {
        Ok(thread) => Ok(RunnerHandle { thread, exited }),
        Err(e) => {
            shared.runner_active.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

fn run(shared: Arc<Shared>, native: Arc<dyn NativeSession>, exit_tx: Sender<()>) {
    info!(token = %shared.token, device = %shared.device, "Capture loop started");

    let exit = {
        let mut on_frame = |header: &FrameHeader, bytes: &[u8]| {
            deliver_packet(&shared, native.as_ref(), header, bytes);
        };
        native.run_blocking(&mut on_frame)
    };

    match exit {
        LoopExit::BreakRequested => {
            debug!(token = %shared.token, "Capture loop stopped on break");
        }
        LoopExit::Failed(message) => {
            deliver_error(&shared, native.as_ref(), message);
        }
        LoopExit::Other(code) => {
            warn!(token = %shared.token, code, "Capture loop returned unexpectedly");
        }
    }

    // Release the native handle before acknowledging exit
    drop(native);
    shared.runner_active.store(false, Ordering::SeqCst);
    info!(token = %shared.token, "Capture loop finished");
    drop(exit_tx);
}
