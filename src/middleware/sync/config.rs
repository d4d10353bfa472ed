use crate::error::{SyncError, SyncResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Converts state to and from transport text.
pub trait StateCodec: Send + Sync {
    fn encode(&self, state: &Value) -> SyncResult<String>;
    fn decode(&self, text: &str) -> SyncResult<Value>;
}

/// The default codec: plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl StateCodec for JsonCodec {
    fn encode(&self, state: &Value) -> SyncResult<String> {
        serde_json::to_string(state).map_err(SyncError::from)
    }

    fn decode(&self, text: &str) -> SyncResult<Value> {
        serde_json::from_str(text).map_err(SyncError::from)
    }
}

/// Which parts of the state travel between contexts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldsToSync {
    /// The whole state; incoming envelopes replace it.
    #[default]
    All,
    /// Only these dot-separated paths; incoming values are merged in.
    Fields(Vec<String>),
}

/// Whether a newly attached store asks its peers for their state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialSync {
    /// The host calls `request_initial_sync` when it is ready.
    #[default]
    Manual,
    /// The request is posted as soon as the channel opens.
    OnAttach,
}

/// Millisecond clock used to stamp outgoing envelopes.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Milliseconds since the Unix epoch.
pub fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Configuration for the sync middleware.
#[derive(Clone)]
pub struct SyncConfig {
    pub(crate) channel_name: Option<String>,
    pub(crate) codec: Arc<dyn StateCodec>,
    pub(crate) fields: FieldsToSync,
    pub(crate) initial_sync: InitialSync,
    pub(crate) clock: Clock,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            channel_name: None,
            codec: Arc::new(JsonCodec),
            fields: FieldsToSync::All,
            initial_sync: InitialSync::Manual,
            clock: Arc::new(system_clock),
        }
    }

    /// Pin the channel name instead of drawing one from the context counter.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_channel_name(name)
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn with_codec(mut self, codec: impl StateCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Sync only the given dot-separated paths.
    pub fn with_fields<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.fields = FieldsToSync::Fields(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_initial_sync(mut self, mode: InitialSync) -> Self {
        self.initial_sync = mode;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn fields(&self) -> &FieldsToSync {
        &self.fields
    }

    pub fn initial_sync(&self) -> InitialSync {
        self.initial_sync
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("channel_name", &self.channel_name)
            .field("fields", &self.fields)
            .field("initial_sync", &self.initial_sync)
            .finish()
    }
}
