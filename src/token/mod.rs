pub mod manager;
pub mod record;
pub mod store;
