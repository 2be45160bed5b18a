pub mod analyze;
pub mod import;
pub mod list;
pub mod resolve;
pub mod status;
