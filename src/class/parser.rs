use std::{borrow::Cow, sync::Arc};

use cesu8_str::java as cesu8_java;
use nom::{
    IResult, Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u32, u8},
};
use tracing::trace;

use crate::{
    class::{
        AttributeInfo, ClassDescriptor, ConstantPool, ConstantPoolEntry, FieldInfo, MethodInfo,
        ParseError,
        error::{DecodeError, DecodeErrorKind},
    },
    consts::{CLASS_MAGIC, ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
};

type PResult<'a, T> = IResult<&'a [u8], T, DecodeError>;

/// Decodes a class file. Pure: no I/O and no knowledge of other classes.
pub fn parse(bytes: &[u8]) -> Result<ClassDescriptor, ParseError> {
    let class = finish(bytes, class_file(bytes))?;
    check_indices(&class)?;
    Ok(class)
}

/// Converts the outcome of a parser run over the whole of `bytes`, rejecting leftover input.
pub(crate) fn finish<T>(bytes: &[u8], result: PResult<'_, T>) -> Result<T, ParseError> {
    let (rest, value) = result.map_err(|err| match err {
        nom::Err::Error(err) | nom::Err::Failure(err) => err.into_parse_error(bytes.len()),
        nom::Err::Incomplete(_) => ParseError::Truncated {
            offset: bytes.len(),
        },
    })?;
    if !rest.is_empty() {
        return Err(ParseError::TrailingBytes {
            remaining: rest.len(),
        });
    }
    Ok(value)
}

fn class_file(input: &[u8]) -> PResult<'_, ClassDescriptor> {
    let (input, (magic, minor, major)) = parse_header(input)?;
    let (input, constant_pool) = parse_constant_pool(input)?;

    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces) = parse_interfaces(input)?;
    let (input, fields) = parse_fields(input)?;
    let (input, methods) = parse_methods(input)?;
    let (input, attributes) = parse_attributes(input)?;

    Ok((
        input,
        ClassDescriptor {
            magic,
            minor_version: minor,
            major_version: major,
            constant_pool,
            access_flags: ClassAccessFlag::from_bits_retain(access_flags),
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

fn parse_header(input: &[u8]) -> PResult<'_, (u32, u16, u16)> {
    let (rest, magic) = be_u32(input)?;
    if magic != CLASS_MAGIC {
        return Err(nom::Err::Failure(DecodeError::new(
            input,
            DecodeErrorKind::InvalidMagic(magic),
        )));
    }
    let (rest, minor) = be_u16(rest)?;
    let (rest, major) = be_u16(rest)?;
    Ok((rest, (magic, minor, major)))
}

fn parse_constant_pool(input: &[u8]) -> PResult<'_, ConstantPool> {
    let (input, constant_pool_count) = be_u16(input)?;
    let expected = (constant_pool_count as usize).saturating_sub(1);

    let mut entries = Vec::with_capacity(expected);
    let mut input = input;

    while entries.len() < expected {
        let constant;
        (input, constant) = parse_constant(input)?;
        trace!("constant #{}: {}", entries.len() + 1, constant.kind());
        let need_unusable = constant.is_wide();
        entries.push(constant);
        if need_unusable {
            entries.push(ConstantPoolEntry::Unusable);
        }
    }
    // a wide constant in the last slot claims an index past the declared count
    entries.truncate(expected);

    Ok((input, ConstantPool::new(entries)))
}

fn parse_constant(mut input: &[u8]) -> PResult<'_, ConstantPoolEntry> {
    let tag;
    (input, tag) = u8(input)?;
    let cp_info = match tag {
        1 => {
            let length;
            (input, length) = be_u16(input)?;
            let string_start = input;
            let bytes;
            (input, bytes) = take(length).parse(input)?;
            let Some(string) = decode_modified_utf8(bytes) else {
                return Err(nom::Err::Failure(DecodeError::new(
                    string_start,
                    DecodeErrorKind::InvalidUtf8,
                )));
            };
            ConstantPoolEntry::Utf8(string)
        }
        3 => {
            let int;
            (input, int) = be_i32(input)?;
            ConstantPoolEntry::Integer(int)
        }
        4 => {
            let float;
            (input, float) = be_f32(input)?;
            ConstantPoolEntry::Float(float)
        }
        5 => {
            let long;
            (input, long) = be_i64(input)?;
            ConstantPoolEntry::Long(long)
        }
        6 => {
            let double;
            (input, double) = be_f64(input)?;
            ConstantPoolEntry::Double(double)
        }
        7 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolEntry::Class { name_index }
        }
        8 => {
            let string_index;
            (input, string_index) = be_u16(input)?;
            ConstantPoolEntry::String { string_index }
        }
        9 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
        }
        10 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolEntry::Methodref {
                class_index,
                name_and_type_index,
            }
        }
        11 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }
        }
        12 => {
            let (name_index, descriptor_index);
            (input, name_index) = be_u16(input)?;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            }
        }
        15 => {
            let (reference_kind, reference_index);
            (input, reference_kind) = u8(input)?;
            (input, reference_index) = be_u16(input)?;
            ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            }
        }
        16 => {
            let descriptor_index;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolEntry::MethodType { descriptor_index }
        }
        17 => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        18 => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        19 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolEntry::Module { name_index }
        }
        20 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolEntry::Package { name_index }
        }
        _ => {
            return Err(nom::Err::Failure(DecodeError::new(
                input,
                DecodeErrorKind::UnknownConstantTag(tag),
            )));
        }
    };
    Ok((input, cp_info))
}

fn decode_modified_utf8(bytes: &[u8]) -> Option<Arc<str>> {
    let java_str = cesu8_java::JavaStr::from_java_cesu8(bytes).ok()?;
    let string: Cow<'_, str> = cesu8_java::from_java_cesu8(java_str);
    Some(Arc::from(string))
}

fn parse_interfaces(input: &[u8]) -> PResult<'_, Vec<u16>> {
    let (input, interface_count) = be_u16(input)?;
    count(be_u16, interface_count as _).parse(input)
}

fn parse_fields(input: &[u8]) -> PResult<'_, Vec<FieldInfo>> {
    let (input, field_count) = be_u16(input)?;
    count(parse_field, field_count as _).parse(input)
}

fn parse_field(input: &[u8]) -> PResult<'_, FieldInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, attributes) = parse_attributes(input)?;
    Ok((
        input,
        FieldInfo {
            access_flags: FieldAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

fn parse_methods(input: &[u8]) -> PResult<'_, Vec<MethodInfo>> {
    let (input, methods_count) = be_u16(input)?;
    count(parse_method, methods_count as _).parse(input)
}

fn parse_method(input: &[u8]) -> PResult<'_, MethodInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, attributes) = parse_attributes(input)?;
    Ok((
        input,
        MethodInfo {
            access_flags: MethodAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

pub(crate) fn parse_attributes(input: &[u8]) -> PResult<'_, Vec<AttributeInfo>> {
    let (input, attributes_count) = be_u16(input)?;
    count(parse_attribute, attributes_count as _).parse(input)
}

fn parse_attribute(input: &[u8]) -> PResult<'_, AttributeInfo> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length).parse(input)?;

    Ok((
        input,
        AttributeInfo {
            attribute_name_index,
            info: info.to_vec(),
        },
    ))
}

/// Every index the header and member tables carry must name an entry of the right kind.
fn check_indices(class: &ClassDescriptor) -> Result<(), ParseError> {
    let cp = &class.constant_pool;
    cp.check_references()?;
    class.class_name()?;
    class.super_class_name()?;
    class.interface_names()?;
    let members = class
        .fields
        .iter()
        .map(|f| (f.name_index, f.descriptor_index, &f.attributes))
        .chain(
            class
                .methods
                .iter()
                .map(|m| (m.name_index, m.descriptor_index, &m.attributes)),
        );
    for (name_index, descriptor_index, attributes) in members {
        cp.utf8(name_index)?;
        cp.utf8(descriptor_index)?;
        for attribute in attributes {
            cp.utf8(attribute.attribute_name_index)?;
        }
    }
    for attribute in &class.attributes {
        cp.utf8(attribute.attribute_name_index)?;
    }
    Ok(())
}
