pub mod audit;
pub mod cleanup;
