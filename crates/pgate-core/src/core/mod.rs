pub mod callsign;
pub mod filerules;
pub mod operator;
