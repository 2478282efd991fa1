//! Streaming pipeline: registry, reconciliation, fan-in and relay.

pub mod buffer;
pub mod listener;
pub mod live_adapter;
pub mod reconciler;
pub mod registry;
pub mod relay;
pub mod session;

pub use buffer::{output_buffer, OutputBuffer, OutputDrain};
pub use listener::{listen_for_adapter_events, ListenerExit, ListenerSpawner};
pub use live_adapter::LiveAdapter;
pub use reconciler::{Announcer, Reconciler, TickReport};
pub use registry::AdapterRegistry;
pub use relay::{frame_record, OutputRelay, RelayOutcome};
pub use session::{SessionReport, StreamSession};
