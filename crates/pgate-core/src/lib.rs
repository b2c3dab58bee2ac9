pub mod core;

pub use self::core::callsign;
pub use self::core::callsign::{
    format_callsign, is_valid_callsign, normalize_callsign, parse_callsign,
};
pub use self::core::filerules;
pub use self::core::operator::OperatorInfo;
