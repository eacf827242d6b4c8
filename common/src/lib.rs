pub mod interface;
pub mod manager;
pub mod model;
pub mod shutdown;

pub use interface::{Input, Output, Pipeline};
pub use manager::Manager;
pub use model::{Message, ReplyReceiver, ReplySender, Response, Transaction};
pub use shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
