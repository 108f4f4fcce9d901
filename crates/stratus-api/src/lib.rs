//! # stratus-api
//!
//! The HTTP surface of the control plane. Handlers validate through the
//! policy engine, create execution records, and hand work to the
//! executors; everything stateful lives behind `web::Data` so the app
//! stays stateless across replicas.
//!
//! Session authentication itself is out of scope: the session gateway in
//! front of this service resolves the cookie and forwards the operator
//! identity, which the [`auth::Operator`] extractor picks up.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod routes;

pub use auth::{Operator, PasswordVerifier};
pub use routes::configure_routes;
