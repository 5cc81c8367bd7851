pub mod apply;
pub mod plan;
pub mod show;
pub mod validate;
