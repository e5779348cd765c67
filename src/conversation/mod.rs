mod adapter;
mod reference;
mod turn;

pub use adapter::{ChannelAdapter, OutboxAdapter};
pub use reference::{Account, ConversationReference};
pub use turn::{TurnContext, TurnEvent};
