//! Credits API Library
//!
//! Exposes the service internals for the server binary, the OpenAPI export
//! binary and integration tests.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod routes;
pub mod services;
