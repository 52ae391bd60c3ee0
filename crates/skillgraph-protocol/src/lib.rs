//! # SkillGraph Protocol
//!
//! The BAP/BPP message exchange: contexts, ACK/NACK, out-of-band dispatch,
//! and signature checks on inbound provider callbacks.
//!
//! ## Flow
//!
//! 1. A caller asks the [`BapEngine`] to search/select/confirm/status/support
//! 2. The engine logs an `initiated` row and returns ACK (or NACK on bad input)
//! 3. The [`Dispatcher`] delivers the call and logs the outcome
//! 4. The provider answers later with a signed `on_*` callback
//! 5. [`verify_inbound`] checks the signature against the [`TrustRegistry`]
//! 6. Pollers read the callback via [`BapEngine::get_result`]
//!
//! ## Transport
//!
//! The [`Transport`] trait abstracts the network. [`HttpTransport`] uses
//! reqwest; [`transport::memory::MemoryTransport`] routes in-process for
//! tests.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod messages;
pub mod registry;
pub mod transport;

pub use dispatcher::{DispatchJob, DispatchOutcome, DispatchTicket, Dispatcher, DEFAULT_CAPACITY};
pub use engine::{BapConfig, BapEngine, OutboundAck, PollResult};
pub use error::{ProtocolError, Result};
pub use inbound::{sign_envelope, signed_payload, verify_inbound, InboundRejection};
pub use messages::{
    envelope, new_id, AckResponse, AckStatus, BapIdentity, Context, ProviderRef, SearchIntent,
};
pub use registry::{StoreTrustRegistry, TrustRegistry};
pub use transport::{HttpTransport, Transport, TransportResponse, DEFAULT_TIMEOUT};
