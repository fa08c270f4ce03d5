use std::sync::Arc;

use nom::{
    IResult, Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u32},
};

use crate::class::{
    AttributeInfo, ConstantPool, ParseError,
    error::DecodeError,
    parser::{finish, parse_attributes},
};

pub const CODE_ATTRIBUTE: &str = "Code";
pub const CONSTANT_VALUE_ATTRIBUTE: &str = "ConstantValue";

type PResult<'a, T> = IResult<&'a [u8], T, DecodeError>;

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Arc<[u8]>,
    pub exception_table: Vec<ExceptionTableItem>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableItem {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// `0` catches everything.
    pub catch_type: u16,
}

/// Finds the first attribute called `name`.
pub fn find_attribute<'a>(
    attributes: &'a [AttributeInfo],
    constant_pool: &ConstantPool,
    name: &str,
) -> Result<Option<&'a AttributeInfo>, ParseError> {
    for attribute in attributes {
        if constant_pool.utf8(attribute.attribute_name_index)?.as_ref() == name {
            return Ok(Some(attribute));
        }
    }
    Ok(None)
}

pub fn parse_code(info: &[u8]) -> Result<CodeAttribute, ParseError> {
    finish(info, code_attribute(info))
}

/// Returns the constant pool index stored in a `ConstantValue` attribute.
pub fn parse_constant_value(info: &[u8]) -> Result<u16, ParseError> {
    finish(info, be_u16(info))
}

fn code_attribute(input: &[u8]) -> PResult<'_, CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(exception_table_item, exception_table_length as _).parse(input)?;
    let (input, attributes) = parse_attributes(input)?;
    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code: Arc::from(code),
            exception_table,
            attributes,
        },
    ))
}

fn exception_table_item(input: &[u8]) -> PResult<'_, ExceptionTableItem> {
    let (input, (start_pc, end_pc, handler_pc, catch_type)) =
        (be_u16, be_u16, be_u16, be_u16).parse(input)?;
    Ok((
        input,
        ExceptionTableItem {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}
