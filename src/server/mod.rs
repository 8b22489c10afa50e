pub mod api_key;
pub mod api_routes;
pub mod auth_routes;
pub mod server;
