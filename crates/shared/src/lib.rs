//! Types shared between the casework client core and anything that talks
//! to the case-management service: domain identifiers, wire payloads, and
//! the service error shape.

pub mod domain;
pub mod error;
pub mod protocol;
