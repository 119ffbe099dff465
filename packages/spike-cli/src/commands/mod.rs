pub mod analyze;
pub mod batch;
pub mod info;
pub mod sort;
pub mod validate;
