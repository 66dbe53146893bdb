//! Session bridge for the chat-protocol client.
//!
//! A single [`Supervisor`] owns the protocol session on a dedicated background
//! thread. Request handlers submit [`Operation`]s through
//! [`Supervisor::dispatch`] and get back an [`Outcome`] within a per-kind time
//! budget, without ever touching the session directly.

pub mod address;
mod bridge;
pub mod client;
pub mod error;
pub mod media;
pub mod operation;
pub mod state;
pub mod supervisor;

pub use {
    address::{DEFAULT_COUNTRY_CODE, DOMAIN_SUFFIX, RecipientAddress, normalize},
    client::{
        BuiltMessage, EventSender, InboundMessage, MediaRequest, ProtocolClient, SendReceipt,
        SessionEvent,
    },
    error::{DispatchError, Error, Result},
    media::{MEDIA_PROFILES, MediaKind, MediaProfile},
    operation::{
        Delivery, MediaEcho, MediaPayload, Operation, OperationKind, Outcome, Payload,
        TEXT_STRATEGIES, TextStrategy,
    },
    state::ConnectionState,
    supervisor::{SessionStatus, Supervisor, SupervisorConfig, Timeouts},
};
