mod class_loader;
mod primitive;
mod reflection;
mod structs;

pub use class_loader::*;
pub use primitive::{PRIMITIVE_TYPES, primitive_type};
pub use reflection::*;
pub use structs::*;
