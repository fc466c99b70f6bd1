mod cookie;
mod errors;
mod repository;
mod types;

pub use cookie::{
    clear_session_cookie, get_session_id_from_headers, new_session_id, set_session_cookie,
};
pub use errors::SessionError;
pub use repository::{CacheSessionRepository, SessionRepository};
pub use types::{AuthSession, ResourceToken};
