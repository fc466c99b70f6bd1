//! Orchestration of sign-in, redirect completion, token acquisition and access checks.

mod errors;
mod guard;
mod provider;
mod redirect;
mod signin;
mod token;

pub use errors::GuardError;
pub use provider::AuthProvider;
pub use redirect::{RedirectOutcome, RedirectQuery, RedirectRejection};
pub use token::TokenAcquisition;
