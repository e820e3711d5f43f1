//! Synchronous client for the Intercom user API.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network; a `Transport` executes the round-trip. On top of that
//! the `Messenger` context adds a deferred mode, where writes are appended to
//! a local log and replayed later in one batch, and an increment mode, where
//! counter fields in a user's custom data accumulate across updates.
//!
//! # Design
//! - `IntercomClient` is stateless: base URL and credentials only.
//! - Each operation is split into `build_*` and `parse_*`, so the I/O
//!   boundary is explicit and the request logic is testable without a server.
//! - All process-level state (flags, last error, bulk buffer) lives in a
//!   `Messenger` value owned by the caller.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod lookup;
pub mod merge;
pub mod messenger;
pub mod queue;
pub mod types;

pub use client::{Credentials, IntercomClient};
pub use config::ClientConfig;
pub use error::{ApiError, ConfigError, LastError, QueueError, TransportError, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use lookup::{is_email, UserLookup};
pub use merge::{AttributeSource, MergePolicy, RecomputeMode, RecomputeRule};
pub use messenger::{Dispatch, Messenger, PurgeReport};
pub use queue::{DeferredCall, DeferredQueue, ReplayReport};
pub use types::{AccountSnapshot, Impression, RemoteUser, UserList, UserPayload};
