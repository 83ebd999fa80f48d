//! Async client for Raritan-style PDU JSON-RPC management APIs.
//!
//! This crate provides the pieces the exporter builds on:
//!
//! - [`rpc`] - JSON-RPC 2.0 transport with basic auth and request timeouts
//! - [`bulk`] - the vendor `performBulk` batching endpoint
//! - [`pdu`] - typed domain operations (PDU info, inlets, outlets,
//!   overcurrent protectors, sensor readings, SNMP configuration)
//! - [`catalog`] - flattening discovery results into a uniform sensor list
//! - [`error`] - error types

pub mod bulk;
pub mod catalog;
pub mod error;
pub mod pdu;
pub mod rpc;

// Re-export commonly used types at the crate root
pub use bulk::BulkRequest;
pub use catalog::{CatalogEntry, SensorCategory, build_catalog};
pub use error::{Error, Result};
pub use pdu::{
    InletInfo, OcpInfo, OutletInfo, PduClient, PduInfo, Reading, Resource, SnmpInfo,
};
pub use rpc::{Auth, Request, Response, RpcClient};
