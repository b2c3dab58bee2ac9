pub mod telnet;

pub use telnet::codec::{TelnetCodec, TelnetItem};
pub use telnet::protocol::{self, parse_new_environ};
pub use telnet::server::{TelnetEvent, TelnetServer};
pub use telnet::types::{TelnetError, TelnetErrorKind, TelnetResult};
