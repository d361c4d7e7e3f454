//! Human-authorization relay server.
//!
//! A standalone HTTP service brokering checkpoint decisions between the
//! automation loop and a human approver:
//!
//! - [`store::RequestStore`]: durable request state, token verification,
//!   lazy expiry as an explicit transition function
//! - [`http`]: axum routes (create / approval page / resolve / status) with
//!   optional bearer gating and graceful shutdown
//! - [`tunnel`]: optional managed tunnel subprocess for public exposure
//!
//! # Security Properties
//!
//! - Two independent secrets per request: the open token (approval page +
//!   decision submission) and the poll token (bridge status queries). They
//!   are generated independently and never exchangeable.
//! - Only SHA-256 hashes of tokens are persisted; verification hashes the
//!   presented token and compares in constant time (`subtle`).
//! - The first valid decision wins; later resolve attempts fail without
//!   mutating state.
//! - Expiry is enforced on every read path, so a request cannot stay
//!   `pending` past its deadline even if the background sweep never runs.

pub mod artifacts;
pub mod http;
pub mod page;
pub mod store;
pub mod token;
pub mod tunnel;

pub use http::{serve, RelayState};
pub use store::RequestStore;
pub use tunnel::Tunnel;
