mod client;
mod entra;
mod errors;
mod types;
mod validator;

pub use client::IdentityClient;
pub use entra::{EntraClient, build_authorization_url};
pub use errors::{IdentityError, TokenValidationError};
pub use types::{
    Account, AuthCodeTokenRequest, AuthCodeUrlRequest, OboRequest, SilentRequest, TokenResponse,
};
pub use validator::{JwksTokenValidator, TokenValidator};
