pub mod dispatcher;
pub mod selector;
pub mod usage;

pub use dispatcher::{ChatCommand, ChatDispatcher, ChatReply};
pub use usage::UsageRecorder;
