mod attributes;
pub(crate) mod error;
mod parser;
mod structs;

pub use attributes::*;
pub use error::{ConstantPoolError, ParseError};
pub use parser::parse;
pub use structs::*;
