pub mod run;
pub mod solvers;
pub mod status;
pub mod validate;
