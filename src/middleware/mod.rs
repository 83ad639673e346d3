pub mod agent_context;
pub mod security_headers;

pub use agent_context::ResolvedAgent;
pub use security_headers::add_security_headers;
