//! Concrete collaborators plugged into the event streamer.

pub mod http_adapter;
pub mod preference_file;

pub use http_adapter::{ndjson_events, HttpAdapter, HttpAdapterFactory};
pub use preference_file::{FilePreferenceStore, PreferenceFileError};
