//! # Mesh-Relay Test Suite
//!
//! Cross-crate integration tests.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── reconciliation_flows.rs  # Whole sessions driven by mock adapters
//!     └── sse_end_to_end.rs        # Real sockets: HTTP client, relay, HTTP adapters
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::sse_end_to_end
//! ```

pub mod integration;
