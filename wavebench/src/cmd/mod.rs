pub mod analyze;
pub mod curve;
pub mod mock;
pub mod run;
