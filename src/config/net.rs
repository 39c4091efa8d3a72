use serde::Deserialize;

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_LISTEN_BACKLOG: u32 = 1024;
const DEFAULT_READ_BUFFER_CAPACITY: usize = 4 * 1024;
const DEFAULT_MAX_BODY_LEN: usize = 16 * 1024 * 1024;

// -----------------------------------------------------------------------------
// ----- NetConfig -------------------------------------------------------------

/// Sizing knobs for a `SimpleNet`. Every field has a default, so a partial
/// `[net]` table in the config file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    /// Shared event queue. Readers block once it is full.
    pub event_queue_capacity: usize,

    /// Per-connection queue of serialized messages awaiting the writer.
    pub outbound_queue_capacity: usize,

    pub listen_backlog: u32,

    pub read_buffer_capacity: usize,

    /// Largest body a protocol header may announce before the connection is
    /// torn down.
    pub max_body_len: usize,

    pub no_delay: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            no_delay: true,
        }
    }
}

impl NetConfig {
    // tokio channels panic on a zero capacity
    pub(crate) fn normalized(mut self) -> Self {
        self.event_queue_capacity = self.event_queue_capacity.max(1);
        self.outbound_queue_capacity = self.outbound_queue_capacity.max(1);
        self.read_buffer_capacity = self.read_buffer_capacity.max(1);
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
