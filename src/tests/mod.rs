pub mod common;
mod gateway_routes;
