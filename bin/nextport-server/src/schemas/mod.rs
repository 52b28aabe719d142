pub mod convert;
pub mod repo;
