pub mod activity;
pub mod counter;
pub mod document;
pub mod protocol;
pub mod user;

pub use activity::{ActivityEntry, EventType};
pub use counter::Counter;
pub use document::Document;
pub use protocol::{ProtocolRecord, ProtocolSummary};
pub use user::User;
