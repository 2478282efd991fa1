//! Integration flows across the streamer, the node and telemetry.

mod reconciliation_flows;
mod sse_end_to_end;
