pub mod ax25;

pub use ax25::address::Ax25Address;
pub use ax25::frame::{Ax25Frame, Ax25FrameType};
pub use ax25::link::{LinkEvent, LinkManager};
pub use ax25::types::{Ax25Error, Ax25ErrorKind, Ax25Result, AxConnection, ConnectionState};
