pub mod pending;
pub mod session;
pub mod user;

pub use pending::{OtpCheck, PendingRegistration};
pub use session::{ActivityRecord, SessionRecord, SessionType};
pub use user::{looks_like_email, User, UserProfile};
