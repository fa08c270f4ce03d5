use std::sync::Arc;

mod constant_pool;

pub use constant_pool::*;

use crate::{
    class::ConstantPoolError,
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
};

/// A decoded class file. Indices are still symbolic; the runtime model is built from this and
/// the descriptor itself is dropped afterwards.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: ClassAccessFlag,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassDescriptor {
    pub fn class_name(&self) -> Result<&Arc<str>, ConstantPoolError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// `None` only for a class file without a super class (`java/lang/Object`).
    pub fn super_class_name(&self) -> Result<Option<&Arc<str>>, ConstantPoolError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&Arc<str>>, ConstantPoolError> {
        self.interfaces
            .iter()
            .map(|&index| self.constant_pool.class_name(index))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlag,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlag,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

/// Attribute in raw form; interpretation is attribute specific.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub info: Vec<u8>,
}
