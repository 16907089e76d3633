//! # gatewayd-core
//!
//! Core JSON-API splitter, DPA transaction engine and IQMESH network
//! services for an IQRF mesh gateway daemon. A concrete deployment wires
//! a [`channel::DpaCoordinatorChannel`] transport driver, an
//! [`engine::DpaEngineImpl`], a [`schema::SchemaRegistry`] and a
//! [`splitter::MessageSplitter`] together, then registers the
//! [`services`] handlers for the `mType`s it supports.
//!
//! ## Architecture
//!
//! ```text
//! transport (MQTT/WS/...)  <->  MessageSplitter  <->  ServiceHandler impls
//!                                     |                     |
//!                               SchemaRegistry         DpaEngine
//!                                                            |
//!                                                  DpaCoordinatorChannel
//! ```
//!
//! Framing of bytes on the channel, and the transports a splitter
//! attaches to, are out of scope for this crate; it owns the protocol
//! logic in between.

pub mod channel;
pub mod config;
pub mod domain_types;
pub mod dpa;
pub mod engine;
pub mod error;
pub mod iqrf_code;
pub mod observability;
pub mod schema;
pub mod services;
pub mod splitter;

pub use error::GatewayError;
