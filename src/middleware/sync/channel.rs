use super::envelope::SyncMessage;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::Notify;
use tracing::{trace, warn};

/// Prefix of generated channel names.
pub const BASE_CHANNEL_NAME: &str = "__PANTRY_SHAREABLE_STORE__";

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub(crate) struct Posted {
    from: u64,
    message: SyncMessage,
}

struct HubInner {
    channels: Mutex<HashMap<String, broadcast::Sender<Posted>>>,
    closed: AtomicBool,
    capacity: usize,
    next_endpoint: AtomicU64,
}

/// In-process broadcast medium shared by every execution context.
///
/// Each named channel is a `tokio::sync::broadcast` channel. Endpoints
/// opened on the same name see each other's posts but never their own.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Hub whose channels buffer at most `capacity` undelivered messages
    /// per receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                capacity: capacity.max(1),
                next_endpoint: AtomicU64::new(0),
            }),
        }
    }

    /// Refuse new endpoints. Endpoints already open keep working.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.channels.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn open(&self, name: &str) -> SyncResult<ChannelEndpoint> {
        if self.is_closed() {
            return Err(SyncError::Unsupported);
        }
        let sender = self
            .inner
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone();
        let receiver = sender.subscribe();
        Ok(ChannelEndpoint {
            id: self.inner.next_endpoint.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One execution context, such as a browser tab or a process.
///
/// The context owns the counter that names channels for stores that do not
/// pin a name, so two contexts that create their stores in the same order
/// end up on matching channels.
pub struct SyncContext {
    hub: Option<BroadcastHub>,
    counter: AtomicUsize,
}

impl SyncContext {
    pub fn new(hub: &BroadcastHub) -> Self {
        Self {
            hub: Some(hub.clone()),
            counter: AtomicUsize::new(0),
        }
    }

    /// A context without any broadcast mechanism.
    pub fn detached() -> Self {
        Self {
            hub: None,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.hub.as_ref().is_some_and(|hub| !hub.is_closed())
    }

    /// Open an endpoint on `name`.
    pub fn open(&self, name: &str) -> SyncResult<ChannelEndpoint> {
        match &self.hub {
            Some(hub) => hub.open(name),
            None => Err(SyncError::Unsupported),
        }
    }

    /// Open an endpoint on `name`, or on the next generated name.
    pub(crate) fn open_channel(&self, name: Option<&str>) -> SyncResult<ChannelEndpoint> {
        if !self.is_supported() {
            return Err(SyncError::Unsupported);
        }
        match name {
            Some(name) => self.open(name),
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                self.open(&format!("{BASE_CHANNEL_NAME}{n}"))
            }
        }
    }
}

/// A handle on one named channel.
pub struct ChannelEndpoint {
    id: u64,
    name: String,
    sender: broadcast::Sender<Posted>,
    receiver: Mutex<Option<broadcast::Receiver<Posted>>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl ChannelEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Post to every other endpoint on this channel.
    pub fn post(&self, message: SyncMessage) {
        if self.is_closed() {
            return;
        }
        let posted = Posted {
            from: self.id,
            message,
        };
        if self.sender.send(posted).is_err() {
            trace!(channel = %self.name, "no receivers for posted message");
        }
    }

    /// Next queued message from another endpoint, without waiting.
    pub fn try_recv(&self) -> SyncResult<Option<SyncMessage>> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut guard = self.receiver.lock();
        let Some(receiver) = guard.as_mut() else {
            return Ok(None);
        };
        loop {
            match receiver.try_recv() {
                Ok(posted) if posted.from == self.id => continue,
                Ok(posted) => return Ok(Some(posted.message)),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.name, skipped, "sync receiver lagged; messages dropped");
                }
                Err(TryRecvError::Closed) => return Err(SyncError::ChannelClosed),
            }
        }
    }

    /// Wait for the next message from another endpoint.
    ///
    /// Returns `None` once the endpoint is closed or the receiver has been
    /// taken by another waiter.
    pub async fn recv(&self) -> Option<SyncMessage> {
        let mut slot = ReceiverSlot {
            slot: &self.receiver,
            receiver: self.receiver.lock().take(),
        };
        let receiver = slot.receiver.as_mut()?;
        loop {
            if self.is_closed() {
                return None;
            }
            tokio::select! {
                _ = self.shutdown.notified() => return None,
                result = receiver.recv() => match result {
                    Ok(posted) if posted.from == self.id => continue,
                    Ok(posted) => return Some(posted.message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %self.name, skipped, "sync receiver lagged; messages dropped");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Stop posting and receiving, and wake any pending `recv`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

// Puts a taken receiver back, even when `recv` is cancelled.
struct ReceiverSlot<'a> {
    slot: &'a Mutex<Option<broadcast::Receiver<Posted>>>,
    receiver: Option<broadcast::Receiver<Posted>>,
}

impl Drop for ReceiverSlot<'_> {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            *self.slot.lock() = Some(receiver);
        }
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
