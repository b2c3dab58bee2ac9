pub mod session;

pub use session::rate::RateLimiter;
pub use session::store::SessionStore;
pub use session::types::{ChatRole, HistoryMessage, Session, SessionSnapshot, SessionStats};
