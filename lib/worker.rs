// Background threads with cooperative, channel-based shutdown
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Observed by a worker between timed I/O attempts.
pub(crate) struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// True once the owning [`Worker`] asked the thread to stop.
    pub fn is_requested(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Handle to a named background thread.
///
/// Stopping closes the shutdown channel; the thread notices on its next poll.
pub(crate) struct Worker {
    name: String,
    shutdown: Option<Sender<()>>,
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: String, body: F) -> io::Result<Self>
    where
        F: FnOnce(ShutdownSignal) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (exited_tx, exited_rx) = bounded::<()>(0);

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            // dropped when the thread ends, which wakes `stop`
            let _exited = exited_tx;
            body(ShutdownSignal { rx: shutdown_rx });
        })?;

        Ok(Worker {
            name,
            shutdown: Some(shutdown_tx),
            exited: exited_rx,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop without waiting for it.
    pub fn signal(&mut self) {
        self.shutdown.take();
    }

    /// Ask the thread to stop and wait up to `timeout` for it to exit.
    ///
    /// Never waits when called from the worker thread itself. Returns whether the
    /// thread is known to have exited.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.signal();

        let Some(handle) = self.handle.take() else {
            return true;
        };

        if handle.thread().id() == thread::current().id() {
            tracing::debug!("{} stopping itself, not joining", self.name);
            self.handle = Some(handle);
            return false;
        }

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("{} panicked", self.name);
                }
                true
            }
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("{} did not stop within {:?}", self.name, timeout);
                self.handle = Some(handle);
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // detach; the thread exits on its own once signalled
        self.signal();
    }
}
