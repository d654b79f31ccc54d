#![deny(unsafe_code)]

//! HTTP data API
//!
//! - `POST /authenticate` exchanges a username and password for a bearer token
//! - `POST /{topic}/{first|last}/{count}/{unit}` relative history window
//! - `POST /{topic}/from/{from}/to/{to}` absolute history range
//! - `POST /{topic}/publish/{payload}` publish through the event bus
//!
//! Topics travel as one path segment with `|` in place of `/`.

mod api;
mod error;
mod extract;
mod tls;

pub use api::{listen_and_serve, route};
pub use error::ApiError;
