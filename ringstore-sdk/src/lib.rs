//! Wire protocol and client helper shared by ringstore peers and the CLI.
//!
//! A ringstore exchange is one TCP connection carrying one length-prefixed
//! JSON request and one length-prefixed JSON response. This crate owns
//! everything both sides need to agree on: the framing ([`frame`]), the
//! request/response envelopes ([`message`]), peer identity triples
//! ([`peer`]), the on-wire store representation ([`store`]), and the client
//! side of the exchange ([`client`]).

pub mod client;
pub mod error;
pub mod frame;
pub mod message;
pub mod peer;
pub mod store;

pub use error::WireError;
pub use peer::Peer;
pub use store::Store;
