//! Client-side human-authorization bridge.
//!
//! Used by the task loop when the model emits a `request_human_auth`
//! action: creates the relay request, surfaces the open URL through the
//! notifier, polls until a terminal status (or budget exhaustion, or the
//! task's stop signal), and applies an approved delegation artifact to the
//! execution target exactly once.

pub mod bridge;
pub mod client;
pub mod delegation;
pub mod notify;

pub use bridge::{AuthHandoff, HumanAuthBridge};
pub use client::RelayClient;
pub use notify::{NoopNotifier, Notifier, NotifyError, TelegramNotifier};
