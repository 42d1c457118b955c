//! Authentication module for BlogCraft server
//!
//! Passwordless email sign-in, JWT-backed sessions and the request
//! extractor that guards owner-scoped routes.

mod extractor;
pub mod handlers;
mod service;

pub use extractor::AuthenticatedUser;
pub use service::{AuthService, Claims, SessionGrant, SignInLink};
