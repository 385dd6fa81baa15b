//! Session/state coordinator for a seller's marketplace workflow.
//!
//! This crate keeps a signed-in browser session alive across several
//! independent surfaces (services, chat, orders, finance), caches expensive
//! page reads behind a short freshness window, prevents duplicate
//! auto-replies with a durable cooldown store, and interleaves a continuous
//! posting loop with an inbound-message watch loop under a single run
//! switch. The browser itself is behind the [`driver::Driver`] trait; the
//! site's volatile markup is reached only through ordered selector-candidate
//! lookups that degrade to "not found" instead of failing.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod driver;
pub mod error;
pub mod extract;
pub mod login;
pub mod reply;
pub mod surface;

/// Coordinator configuration and selector candidate lists.
pub use config::{Config, PostCadence, SelectorSet};
/// The root session coordinator.
pub use coordinator::{Coordinator, ScreenshotCallback};
/// Durable per-conversation reply cooldown store.
pub use dedup::DedupStore;
/// Browser-automation collaborator boundary.
pub use driver::{Driver, Element, SurfaceId};
/// Crate error types and result alias.
pub use error::{DriverError, Error, ExtractError, Result};
/// Structured extraction records.
pub use extract::{ActiveOrder, DialogRecord, TradeTotals};
/// Logical browser views and ordered-fallback lookup.
pub use surface::{Purpose, Surface};
