pub mod message;
pub mod response;
pub mod transaction;

pub use message::Message;
pub use response::Response;
pub use transaction::{ReplyReceiver, ReplySender, Transaction};
