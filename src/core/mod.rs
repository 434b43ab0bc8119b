pub mod accessor;
pub mod car;
pub mod error;
pub mod ids;
