pub mod tools;

pub use tools::band_conditions::{register_band_conditions_tool, BandConditions};
pub use tools::bands;
pub use tools::bbs::{register_bbs_tool, BbsControl};
pub use tools::chat_tool::register_chat_tool;
pub use tools::dx_cluster::{register_dx_tool, DxCluster};
pub use tools::file_tool::register_file_tool;
pub use tools::message_tool::register_message_tool;
pub use tools::pota::{register_pota_tool, PotaSpots};
pub use tools::qrz::{register_qrz_tool, QrzClient};
pub use tools::web_search::{register_search_tool, WebSearch};
