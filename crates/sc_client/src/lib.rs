//! sc_client — Key custody and the encrypted message delivery pipeline
//!
//! # Module layout
//! - `custody`        — ensure/persist/publish the user's long-term keypair
//! - `pipeline`       — compose → seal → transmit → reconcile; render inbound
//! - `policy`         — send policy and placeholder rendering
//! - `timeline`       — per-room message list with echo reconciliation
//! - `pending`        — outgoing messages keyed by `clientMessageId`
//! - `rendered`       — display-ready messages, lazily fetched attachments
//! - `collaborators`  — directory / transport / history / blob contracts
//! - `loopback`       — in-memory server implementing every contract
//! - `session`        — per-user context handed to the pipeline
//! - `config`         — `SC_*` environment configuration

pub mod collaborators;
pub mod config;
pub mod custody;
pub mod error;
pub mod loopback;
pub mod pending;
pub mod pipeline;
pub mod policy;
pub mod rendered;
pub mod session;
pub mod timeline;

pub use collaborators::{BlobStore, Collaborators, Directory, HistoryStore, Member, Transport};
pub use config::{ClientConfig, SendPolicy};
pub use custody::KeyCustody;
pub use error::{CustodyError, PipelineError, TransportError};
pub use loopback::LoopbackServer;
pub use pipeline::{DeliveryPipeline, Draft, DraftFile, Inbound, SendOutcome};
pub use policy::{RenderedBody, Unavailable, PLACEHOLDER};
pub use rendered::{AttachmentHandle, RenderedMessage};
pub use session::Session;
pub use timeline::{Applied, DeliveryStatus, TimelineEntry};

/// Initialise structured logging; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secure_chat=info,sc_store=info".into()),
        )
        .init();
}
