pub mod yapp;

pub use yapp::manager::YappManager;
pub use yapp::transfer::{YappAction, YappEvent, YappState, YappTransfer};
pub use yapp::types::{is_yapp_packet, YappHeader, BLOCK_SIZE};
