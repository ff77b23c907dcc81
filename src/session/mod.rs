pub mod extract;
pub mod manager;

pub use extract::{client_meta, SessionContext, SESSION_HEADER};
pub use manager::{CreatedSession, SessionManager};
