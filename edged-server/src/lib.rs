//! Library surface for the `edged` binary, split out so integration tests can exercise the
//! HTTP router and TLS loading without spawning the whole process.

pub mod error;
pub mod routes;
pub mod tls;
