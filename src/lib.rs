pub mod compile;
pub mod datstructures;
pub mod infra;
