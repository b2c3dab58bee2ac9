pub mod address;
pub mod frame;
pub mod link;
pub mod types;
