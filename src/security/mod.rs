pub mod csrf;
pub mod token;

pub use csrf::CsrfService;
pub use token::{TokenError, VerificationClaims, VerificationTokenService};
