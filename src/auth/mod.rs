//! External authorization decisions.

pub mod bearer;
pub mod headers;
pub mod server;

pub use bearer::extract_bearer_token;
pub use headers::RequestHeaders;
pub use server::AuthServer;
