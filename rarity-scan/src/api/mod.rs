//! HTTP API handlers
//!
//! REST endpoints to start scans and read rankings, plus an SSE stream of scan
//! progress.

pub mod health;
pub mod ranking;
pub mod scans;
pub mod sse;

pub use health::health_routes;
pub use ranking::ranking_routes;
pub use scans::scan_routes;
pub use sse::event_stream;
