pub mod cursor;
pub mod pending;
pub mod session;
pub mod turn;

pub use cursor::Cursor;
pub use pending::PendingExport;
pub use session::{Session, SessionState};
pub use turn::{SessionKey, Turn, TurnRole};
