//! # Call Control - Live Telephony Session Registry
//!
//! This crate keeps an in-memory registry of the telephony sessions visible to
//! one extension (or a whole account) in sync with the platform. State comes
//! from two channels:
//!
//! - **REST** - bootstrap preload of active calls, and sessions the
//!   application originates (call-out, conference)
//! - **Notifications** - the asynchronous `/telephony/sessions` event feed,
//!   handed to [`CallControl::ingest`] one message at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rvoip_call_control::{CallControlBuilder, CallControlEvent, HttpTransportConfig, NotificationMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let control = CallControlBuilder::new()
//!         .http_transport(HttpTransportConfig::from_env())
//!         .build()?;
//!
//!     let mut events = control.subscribe();
//!     control.initialize().await;
//!
//!     // feed notifications as they arrive from the subscription channel
//!     let message: NotificationMessage = serde_json::from_str(
//!         r#"{"event":"/restapi/v1.0/account/~/extension/~/telephony/sessions","body":{"telephonySessionId":"s1","parties":[]}}"#,
//!     )?;
//!     control.ingest(&message);
//!
//!     while let Ok(event) = events.recv().await {
//!         if let CallControlEvent::NewSession { session } = event {
//!             println!("new session {} ({:?})", session.id(), session.status());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────┐
//! │  notification dispatcher │      │  application code    │
//! └────────────┬─────────────┘      └──────────┬───────────┘
//!              │ ingest()                       │ create_call() / restore()
//! ┌────────────▼────────────────────────────────▼───────────┐
//! │                     CallControl                          │
//! │   session map ── eviction policy ── bootstrap            │
//! └────────────┬─────────────────────────────────┬──────────┘
//!              │ apply_update()                   │ get/post
//! ┌────────────▼─────────────┐      ┌────────────▼──────────┐
//! │ Session (parties, status)│      │  PlatformTransport    │
//! └──────────────────────────┘      └───────────────────────┘
//! ```

pub mod bootstrap;
pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod party;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types
pub use builder::CallControlBuilder;
pub use config::{CallControlConfig, HttpTransportConfig};
pub use error::{CallControlError, CallControlResult};
pub use events::{CallControlEvent, EventStream, SessionStatusChange};
pub use party::{normalize_party, Party, PartyCapabilities, PartyDirection, PartyStatus, PartyStatusCode};
pub use registry::{CallControl, IngestOutcome, HANDOFF_REASON};
pub use session::{ListenerId, Session, SessionData, SessionUpdate};
pub use transport::{HttpTransport, PlatformTransport};
pub use types::{ActiveCall, CallTarget, Device, Extension, NotificationMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
