pub mod db;

pub use db::store::Database;
pub use db::types::*;
