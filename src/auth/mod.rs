// Authentication module
// Resolves the calling customer from a JWT bearer token

pub mod error;
pub mod middleware;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use middleware::AuthenticatedCustomer;
pub use token::{Claims, TokenService};
