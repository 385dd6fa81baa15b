//! Error types for the coordinator and its collaborator boundaries.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error.
#[derive(Debug, Error)]
pub enum Error {
	#[error("storage io at {path}: {source}")]
	Storage {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("storage encode/decode failed: {0}")]
	Codec(#[from] serde_json::Error),

	/// Login attempt exhausted its wait window without a logged-in marker.
	#[error("login not confirmed within {secs}s")]
	LoginTimeout { secs: u64 },

	/// A cookie-header import carried none of the session-critical cookies.
	#[error("cookie header carries no session cookie")]
	CookieHeader,

	#[error(transparent)]
	Driver(#[from] DriverError),

	#[error(transparent)]
	Extract(#[from] ExtractError),
}

/// Failures at the browser-automation boundary.
///
/// Navigation and lookup failures are expected and frequent; callers above
/// the driver resolve them to `None`/`false` rather than escalating.
#[derive(Debug, Error)]
pub enum DriverError {
	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error("navigation to {url} failed: {reason}")]
	Navigation { url: String, reason: String },

	/// The surface (tab) backing a handle is gone.
	#[error("surface is no longer live")]
	SurfaceClosed,

	/// A protocol call failed or timed out.
	#[error("browser call failed: {0}")]
	Call(String),
}

/// Extraction outcome taxonomy.
///
/// Distinguishes "no candidate matched anything" from "the surface itself
/// misbehaved", so the coordinator can decide between an empty result and a
/// diagnostic capture while still never throwing to the operator.
#[derive(Debug, Error)]
pub enum ExtractError {
	#[error("no selector candidate matched")]
	NotFound,

	#[error("surface failure during extraction: {0}")]
	Surface(#[from] DriverError),
}
