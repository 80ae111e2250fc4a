//! # chaos-posts
//!
//! HTTP service exposing CRUD on a single `posts` table, built to exercise
//! the cross-cutting concerns around every request:
//!
//! - a trace segment per request, with a sub-segment per data operation;
//! - fault injection that rejects a configurable share of requests so
//!   clients can prove their retry logic;
//! - a connection pool created on first use, with every connection
//!   returned on every exit path.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!     │
//!     ├── trace_segments (middleware/)     open segment, record status
//!     ├── inject_faults  (middleware/)     maybe reject before handler
//!     │
//!     ├── REST Handlers (api/)             one sub-segment per operation
//!     │
//!     ├── PostStore (persistence/)         PostgreSQL or in-memory
//!     ├── LazyPool + SecretStore
//!     │
//!     └── SegmentSink (telemetry/)         log, UDP daemon, or memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod middleware;
pub mod persistence;
pub mod telemetry;
