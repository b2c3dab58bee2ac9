pub mod agent;

pub use agent::client::AnthropicClient;
pub use agent::engine::{TurnEngine, TurnSettings};
pub use agent::registry::{ToolHandler, ToolRegistry};
pub use agent::types::*;
