pub mod remap;
pub mod resolve;
pub mod select;
pub mod validate;
