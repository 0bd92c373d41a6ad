//! Conversation state: turn templating, structured history, sessions.

pub mod history;
pub mod response;
pub mod session;
pub mod turns;

pub use history::ChatHistory;
pub use session::{SessionMap, new_session_id};
pub use turns::TurnChat;
