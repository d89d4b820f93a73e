//! Token lifecycle: issue, validate, list, update, revoke.

pub mod duration;
pub mod issuer;
pub mod jwt;
pub mod service;
pub mod validator;

pub use issuer::{IssueRequest, IssuedToken, TokenIssuer};
pub use service::{TokenService, TokenUpdate};
pub use validator::TokenValidator;
