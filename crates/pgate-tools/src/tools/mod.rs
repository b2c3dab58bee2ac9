pub mod band_conditions;
pub mod bands;
pub mod bbs;
pub mod chat_tool;
pub mod dx_cluster;
pub mod file_tool;
pub mod message_tool;
pub mod pota;
pub mod qrz;
pub mod web_search;
