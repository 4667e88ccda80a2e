//! API types shared by sreq services

pub mod auth;

pub use auth::{hash_token, ApiAuthError, Caller, TokenRegistry};
