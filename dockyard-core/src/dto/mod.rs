//! Data Transfer Objects
//!
//! Wire representations exchanged with the source-hosting system: incoming
//! webhook events and the request/response bodies of its REST API. DTOs are
//! converted into domain types at the crate boundary.

pub mod github;
pub mod webhook;
