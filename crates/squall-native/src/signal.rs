//! Per-request abort signals
//!
//! Each native request carries an [`AbortSignal`]. The server fires it when
//! hyper drops the request future, which happens when the client goes away
//! before a response was produced.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Listener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    aborted: bool,
    listeners: Vec<Listener>,
}

/// Read side of an abort: observe it or subscribe to it
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<Mutex<State>>,
}

impl AbortSignal {
    /// A signal that never fires unless its controller aborts
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Register a listener
    ///
    /// Listeners run once, on the aborting thread. Subscribing to a signal
    /// that already fired runs the listener immediately.
    pub fn on_abort(&self, listener: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.aborted {
            drop(state);
            listener();
            return;
        }
        state.listeners.push(Box::new(listener));
    }

    fn fire(&self) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            if state.aborted {
                return false;
            }
            state.aborted = true;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener();
        }
        true
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AbortSignal")
            .field("aborted", &state.aborted)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// Write side of an abort
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Returns false if it had already fired.
    pub fn abort(&self) -> bool {
        self.signal.fire()
    }
}

/// Aborts its signal on drop unless disarmed
///
/// Held inside the hyper service future: a future that completes disarms it,
/// a future dropped mid-flight (connection reset) aborts the request.
#[derive(Debug)]
pub(crate) struct AbortOnDrop {
    controller: Option<AbortController>,
}

impl AbortOnDrop {
    pub(crate) fn new(controller: AbortController) -> Self {
        Self {
            controller: Some(controller),
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.controller = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.abort();
        }
    }
}
