//! WebSocket bridge
//!
//! The native server reports socket activity through [`SocketEvents`]
//! callbacks. [`Handshake`] turns those callbacks into state a handler can
//! await: an "open" cell, a "closed" cell and an inbox that buffers messages
//! until the handler starts reading.
//!
//! The write handle moves into the [`Socket`] once it opens. Dropping the
//! `Socket` closes the connection.

use parking_lot::Mutex;
use squall_native::{CloseReason, Message, NativeSocket, SocketEvents};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Socket operation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("Socket closed ({}): {}", .0.code, .0.reason)]
    Closed(CloseReason),

    #[error("WebSocket upgrade needs a request served by a running server")]
    Unavailable,
}

/// Write-once cell that can be awaited
pub(crate) struct Deferred<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Deferred<T> {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Set the value; later calls are ignored
    pub(crate) fn fulfil(&self, value: T) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub(crate) async fn wait(&self) -> Option<T> {
        let mut rx = self.tx.subscribe();
        let value = rx.wait_for(Option::is_some).await.ok()?;
        (*value).clone()
    }
}

enum Inbox {
    /// No reader yet
    Buffering(VecDeque<Message>),
    /// Reader attached; messages go straight to it
    Live(mpsc::UnboundedSender<Message>),
}

/// Where the write handle is until the handler takes it
enum Slot {
    Waiting,
    Ready(NativeSocket),
    Taken,
    /// Nobody is waiting anymore; a late open is closed right away
    Abandoned,
}

/// Per-upgrade synchronization state
pub(crate) struct Handshake {
    opened: Deferred<()>,
    slot: Mutex<Slot>,
    closed: Deferred<CloseReason>,
    inbox: Mutex<Inbox>,
}

impl Handshake {
    pub(crate) fn new() -> Self {
        Self {
            opened: Deferred::new(),
            slot: Mutex::new(Slot::Waiting),
            closed: Deferred::new(),
            inbox: Mutex::new(Inbox::Buffering(VecDeque::new())),
        }
    }

    /// Hand the write handle over; the handshake keeps no copy
    fn take(&self) -> Option<NativeSocket> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(native) => Some(native),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// The waiting handler went away before the socket opened
    fn abandon(&self) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Abandoned) {
            Slot::Ready(native) => go_away(&native),
            Slot::Taken => *slot = Slot::Taken,
            Slot::Waiting | Slot::Abandoned => {}
        }
    }

    /// Switch the inbox to live delivery
    ///
    /// Buffered messages are handed over under the inbox lock, so nothing
    /// that arrives during the switch can overtake them.
    fn attach(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inbox = self.inbox.lock();
        if let Inbox::Buffering(queue) = &mut *inbox {
            for message in queue.drain(..) {
                let _ = tx.send(message);
            }
        }
        *inbox = Inbox::Live(tx);
        rx
    }

    fn close_error(&self) -> SocketError {
        SocketError::Closed(self.closed.get().unwrap_or_else(CloseReason::abnormal))
    }
}

fn go_away(native: &NativeSocket) {
    let reason = CloseReason::going_away();
    let _ = native.close(reason.code, &reason.reason);
}

impl SocketEvents for Handshake {
    fn on_open(&self, socket: NativeSocket) {
        {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Abandoned) {
                go_away(&socket);
                return;
            }
            *slot = Slot::Ready(socket);
        }
        self.opened.fulfil(());
    }

    fn on_message(&self, message: Message) {
        match &mut *self.inbox.lock() {
            Inbox::Buffering(queue) => queue.push_back(message),
            Inbox::Live(tx) => {
                let _ = tx.send(message);
            }
        }
    }

    fn on_close(&self, reason: CloseReason) {
        self.closed.fulfil(reason);
    }
}

/// Open WebSocket
pub struct Socket {
    native: NativeSocket,
    handshake: Arc<Handshake>,
    reader: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl Socket {
    /// Wait for the native "open" event
    ///
    /// If this future is dropped first, the socket is closed as soon as it
    /// opens.
    pub(crate) async fn open(handshake: Arc<Handshake>) -> Result<Socket, SocketError> {
        let mut guard = AbandonOnDrop {
            handshake: &handshake,
            armed: true,
        };

        let native = tokio::select! {
            biased;
            Some(()) = handshake.opened.wait() => handshake.take(),
            Some(reason) = handshake.closed.wait() => return Err(SocketError::Closed(reason)),
            else => None,
        };
        let Some(native) = native else {
            return Err(SocketError::Closed(CloseReason::abnormal()));
        };
        guard.armed = false;

        debug!(socket = native.id(), "socket attached");
        Ok(Socket {
            native,
            handshake: Arc::clone(&handshake),
            reader: tokio::sync::Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.native.id()
    }

    /// Next message
    ///
    /// The first call drains everything received since the socket opened,
    /// in arrival order. Fails once the socket is closed and no message is
    /// left.
    pub async fn recv(&self) -> Result<Message, SocketError> {
        let mut reader = self.reader.lock().await;
        let rx = reader.get_or_insert_with(|| self.handshake.attach());

        tokio::select! {
            biased;
            Some(message) = rx.recv() => Ok(message),
            _ = self.handshake.closed.wait() => Err(self.handshake.close_error()),
        }
    }

    /// Send a text or binary message
    pub fn send(&self, message: impl Into<Message>) -> Result<(), SocketError> {
        if self.handshake.closed.get().is_some() {
            return Err(self.handshake.close_error());
        }
        self.native
            .send(message)
            .map_err(|_| self.handshake.close_error())
    }

    /// Send a close frame
    pub fn close(&self, code: u16, reason: &str) -> Result<(), SocketError> {
        if self.handshake.closed.get().is_some() {
            return Err(self.handshake.close_error());
        }
        self.native
            .close(code, reason)
            .map_err(|_| self.handshake.close_error())
    }

    /// Close reason, once closed
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.handshake.closed.get()
    }

    /// Wait until the socket closes
    pub async fn closed(&self) -> CloseReason {
        self.handshake
            .closed
            .wait()
            .await
            .unwrap_or_else(CloseReason::abnormal)
    }

    /// Feed every message to `f` until the socket closes
    pub async fn run<F, Fut>(&self, mut f: F) -> CloseReason
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            match self.recv().await {
                Ok(message) => f(message).await,
                Err(SocketError::Closed(reason)) => return reason,
                Err(SocketError::Unavailable) => return CloseReason::abnormal(),
            }
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.handshake.closed.get().is_none() && !self.native.is_closed() {
            debug!(socket = self.native.id(), "socket dropped, closing");
            let _ = self.native.close(1000, "");
        }
    }
}

struct AbandonOnDrop<'a> {
    handshake: &'a Handshake,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.handshake.abandon();
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").field("id", &self.id()).finish()
    }
}
