pub mod kiss;

pub use kiss::codec::KissCodec;
pub use kiss::error::{KissError, KissErrorKind, KissResult};
pub use kiss::protocol::{self, KissCommand};
pub use kiss::tnc::{KissTnc, KissTncHandle};
