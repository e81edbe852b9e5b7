//! Authorization gate.
//!
//! Every endpoint resolves the bearer token into a [`Machine`] first. Deletion additionally
//! checks the remote address against the trusted origins.

pub mod credentials;
pub mod origin;

pub use credentials::{bearer_token, CredentialValidator, Machine, StaticCredentials};
pub use origin::OriginPolicy;
