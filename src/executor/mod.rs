//! The authenticated call primitive every upstream operation goes through.

pub mod call;
pub mod request;

pub use call::CallExecutor;
pub use request::RequestDescriptor;
