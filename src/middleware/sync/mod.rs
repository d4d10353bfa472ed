//! Sync middleware: keeps copies of one logical store eventually
//! consistent across execution contexts.
//!
//! Every local write is stamped with a strictly increasing timestamp and
//! broadcast as a [`SyncEnvelope`] before it is applied locally. An incoming
//! envelope is applied only if its timestamp is newer than anything this
//! instance has sent or applied, so the larger timestamp wins no matter in
//! which order messages arrive. Incoming state goes straight to the wrapped
//! store's setter and is never re-broadcast.

mod channel;
mod config;
mod envelope;

pub use channel::{BroadcastHub, ChannelEndpoint, SyncContext, BASE_CHANNEL_NAME};
pub use config::{system_clock, Clock, FieldsToSync, InitialSync, JsonCodec, StateCodec, SyncConfig};
pub use envelope::{SyncEnvelope, SyncMessage, INITIAL_SYNC_EVENT};

use crate::error::{StoreResult, SyncResult};
use crate::merge::{merge_into, select_paths};
use crate::store::{ReadableStore, SetState, StoreApi, StoreId, Subscription};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What happened to one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The envelope was newer and its state was applied.
    Applied,
    /// The envelope was not newer than the high-water mark and was dropped.
    Stale,
    /// An initial-sync request was answered with the current state.
    Replied,
    /// The envelope could not be decoded.
    Rejected,
    /// A text message other than the initial-sync request, or a request
    /// this instance cannot answer.
    Ignored,
}

struct SyncedInner<T, S> {
    store: S,
    channel: Option<Arc<ChannelEndpoint>>,
    config: SyncConfig,
    // Highest timestamp sent or applied.
    high_water: Mutex<u64>,
    _state: PhantomData<fn() -> T>,
}

enum Incoming<T> {
    Whole(T),
    Partial(serde_json::Value),
}

/// Sync middleware over any [`StoreApi`].
///
/// Without a broadcast mechanism the wrapper is a pass-through and the
/// store stays local.
pub struct Synced<T, S> {
    inner: Arc<SyncedInner<T, S>>,
}

impl<T, S> Synced<T, S>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    pub fn new(store: S, context: &SyncContext, config: SyncConfig) -> Self {
        let channel = match context.open_channel(config.channel_name.as_deref()) {
            Ok(channel) => {
                debug!(store = %store.id(), channel = %channel.name(), "sync channel opened");
                Some(Arc::new(channel))
            }
            Err(error) => {
                debug!(store = %store.id(), %error, "sync unavailable; store stays local");
                None
            }
        };
        let synced = Self {
            inner: Arc::new(SyncedInner {
                store,
                channel,
                config,
                high_water: Mutex::new(0),
                _state: PhantomData,
            }),
        };
        if synced.inner.config.initial_sync == InitialSync::OnAttach {
            synced.request_initial_sync();
        }
        synced
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner.store
    }

    pub fn is_connected(&self) -> bool {
        self.inner.channel.is_some()
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.inner.channel.as_deref().map(ChannelEndpoint::name)
    }

    /// Highest timestamp this instance has sent or applied.
    pub fn high_water(&self) -> u64 {
        *self.inner.high_water.lock()
    }

    /// Ask peers on the channel for their current state.
    pub fn request_initial_sync(&self) {
        if let Some(channel) = &self.inner.channel {
            trace!(channel = %channel.name(), "requesting initial sync");
            channel.post(SyncMessage::initial_sync_request());
        }
    }

    /// Apply one incoming message.
    pub fn receive(&self, message: SyncMessage) -> Received {
        match message {
            SyncMessage::Envelope(envelope) => self.inner.apply(envelope),
            SyncMessage::Text(text) if text == INITIAL_SYNC_EVENT => {
                if self.inner.reply_initial() {
                    Received::Replied
                } else {
                    Received::Ignored
                }
            }
            SyncMessage::Text(_) => Received::Ignored,
        }
    }

    /// Process every queued message. Returns how many were applied.
    pub fn drain(&self) -> usize {
        let Some(channel) = &self.inner.channel else {
            return 0;
        };
        let mut applied = 0;
        loop {
            match channel.try_recv() {
                Ok(Some(message)) => {
                    if self.receive(message) == Received::Applied {
                        applied += 1;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(channel = %channel.name(), %error, "sync channel failed");
                    break;
                }
            }
        }
        applied
    }

    /// Apply incoming messages as they arrive, until the store is
    /// destroyed.
    pub async fn listen(&self) {
        let Some(channel) = self.inner.channel.clone() else {
            return;
        };
        while let Some(message) = channel.recv().await {
            self.receive(message);
        }
        trace!(channel = %channel.name(), "sync listener stopped");
    }
}

impl<T, S> SyncedInner<T, S>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn stamp(&self) -> u64 {
        let mut high_water = self.high_water.lock();
        // Saturates at u64::MAX; later writes reuse that stamp and peers drop them as stale.
        let timestamp = (self.config.clock)().max(high_water.saturating_add(1));
        *high_water = timestamp;
        timestamp
    }

    fn encode(&self, state: &T) -> SyncResult<String> {
        let value = serde_json::to_value(state)?;
        let value = match &self.config.fields {
            FieldsToSync::All => value,
            FieldsToSync::Fields(paths) => select_paths(&value, paths),
        };
        self.config.codec.encode(&value)
    }

    fn broadcast(&self, channel: &ChannelEndpoint, timestamp: u64, state: &T) {
        match self.encode(state) {
            Ok(state) => {
                trace!(channel = %channel.name(), timestamp, "broadcasting state");
                channel.post(SyncMessage::Envelope(SyncEnvelope { timestamp, state }));
            }
            Err(error) => {
                warn!(channel = %channel.name(), %error, "state could not be encoded; not broadcast");
            }
        }
    }

    fn decode(&self, text: &str) -> SyncResult<Incoming<T>> {
        let value = self.config.codec.decode(text)?;
        Ok(match self.config.fields {
            FieldsToSync::All => Incoming::Whole(serde_json::from_value(value)?),
            FieldsToSync::Fields(_) => Incoming::Partial(value),
        })
    }

    fn apply(&self, envelope: SyncEnvelope) -> Received {
        let incoming = match self.decode(&envelope.state) {
            Ok(incoming) => incoming,
            Err(error) => {
                warn!(timestamp = envelope.timestamp, %error, "undecodable sync envelope dropped");
                return Received::Rejected;
            }
        };

        {
            let mut high_water = self.high_water.lock();
            if envelope.timestamp <= *high_water {
                debug!(
                    timestamp = envelope.timestamp,
                    high_water = *high_water,
                    "stale sync envelope discarded"
                );
                return Received::Stale;
            }
            *high_water = envelope.timestamp;
        }

        trace!(timestamp = envelope.timestamp, "applying synced state");
        match incoming {
            Incoming::Whole(state) => self.store.set_state(SetState::Replace(state)),
            Incoming::Partial(patch) => self.store.set_state(SetState::update(move |current: &T| {
                merge_into(current, patch).unwrap_or_else(|error| {
                    warn!(%error, "synced fields do not fit state; ignored");
                    current.clone()
                })
            })),
        }
        Received::Applied
    }

    fn reply_initial(&self) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        let timestamp = *self.high_water.lock();
        let state = self.store.get_state();
        self.broadcast(channel, timestamp, &state);
        true
    }
}

impl<T, S> ReadableStore<T> for Synced<T, S>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn id(&self) -> StoreId {
        self.inner.store.id()
    }

    fn get_state(&self) -> T {
        self.inner.store.get_state()
    }

    fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.store.with_state(f)
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }
}

impl<T, S> StoreApi<T> for Synced<T, S>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn set_state(&self, update: SetState<T>) {
        let Some(channel) = self.inner.channel.clone() else {
            self.inner.store.set_state(update);
            return;
        };
        let timestamp = self.inner.stamp();
        let inner = Arc::clone(&self.inner);
        // Broadcast from inside the write so the envelope carries exactly
        // the state the wrapped store commits, whatever it layers below.
        self.inner.store.set_state(SetState::update(move |current: &T| {
            let next = update.apply(current);
            if next != *current {
                inner.broadcast(&channel, timestamp, &next);
            }
            next
        }));
    }

    fn get_initial_state(&self) -> StoreResult<T> {
        self.inner.store.get_initial_state()
    }

    fn destroy(&self) -> StoreResult<()> {
        if let Some(channel) = &self.inner.channel {
            channel.close();
        }
        self.inner.store.destroy()
    }
}

impl<T, S> Clone for Synced<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Wrap `store` in the sync middleware.
pub fn with_sync<T, S>(store: S, context: &SyncContext, config: SyncConfig) -> Synced<T, S>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    Synced::new(store, context, config)
}
