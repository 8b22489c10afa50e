//! Authorization server side of the gateway: the token endpoint client and
//! the one-shot login flow (redirect + code exchange).

pub mod client;
pub mod exchange;
