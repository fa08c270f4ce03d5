use std::sync::Arc;

use crate::class::ConstantPoolError;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolEntry {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Upper half of a long or double.
    Unusable,
}

impl ConstantPoolEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            ConstantPoolEntry::Utf8(_) => "Utf8",
            ConstantPoolEntry::Integer(_) => "Integer",
            ConstantPoolEntry::Float(_) => "Float",
            ConstantPoolEntry::Long(_) => "Long",
            ConstantPoolEntry::Double(_) => "Double",
            ConstantPoolEntry::Class { .. } => "Class",
            ConstantPoolEntry::String { .. } => "String",
            ConstantPoolEntry::Fieldref { .. } => "Fieldref",
            ConstantPoolEntry::Methodref { .. } => "Methodref",
            ConstantPoolEntry::InterfaceMethodref { .. } => "InterfaceMethodref",
            ConstantPoolEntry::NameAndType { .. } => "NameAndType",
            ConstantPoolEntry::MethodHandle { .. } => "MethodHandle",
            ConstantPoolEntry::MethodType { .. } => "MethodType",
            ConstantPoolEntry::Dynamic { .. } => "Dynamic",
            ConstantPoolEntry::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantPoolEntry::Module { .. } => "Module",
            ConstantPoolEntry::Package { .. } => "Package",
            ConstantPoolEntry::Unusable => "Unusable",
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_))
    }
}

/// The 1-indexed constant pool of a class file. Entry `0` does not exist and the slot after a
/// long or double holds [`ConstantPoolEntry::Unusable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
}

impl ConstantPool {
    pub(crate) fn new(entries: Vec<ConstantPoolEntry>) -> Self {
        ConstantPool { entries }
    }

    /// `constant_pool_count` as written in the class file.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16 + 1
    }

    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry, ConstantPoolError> {
        let entry = index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
            .ok_or(ConstantPoolError::OutOfRange {
                index,
                count: self.count(),
            })?;
        if let ConstantPoolEntry::Unusable = entry {
            return Err(ConstantPoolError::Unusable { index });
        }
        Ok(entry)
    }

    /// Iterates over usable entries with their 1-based index.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, ConstantPoolEntry::Unusable))
            .map(|(i, entry)| (i as u16 + 1, entry))
    }

    pub fn utf8(&self, index: u16) -> Result<&Arc<str>, ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(string) => Ok(string),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&Arc<str>, ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    /// (name, descriptor)
    pub fn name_and_type(&self, index: u16) -> Result<(&Arc<str>, &Arc<str>), ConstantPoolError> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    /// Checks that every index stored inside an entry points at an entry of the right kind.
    pub(crate) fn check_references(&self) -> Result<(), ConstantPoolError> {
        for (index, entry) in self.iter() {
            match entry {
                ConstantPoolEntry::Class { name_index }
                | ConstantPoolEntry::Module { name_index }
                | ConstantPoolEntry::Package { name_index } => {
                    self.utf8(*name_index)?;
                }
                ConstantPoolEntry::String { string_index } => {
                    self.utf8(*string_index)?;
                }
                ConstantPoolEntry::MethodType { descriptor_index } => {
                    self.utf8(*descriptor_index)?;
                }
                ConstantPoolEntry::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    self.class_name(*class_index)?;
                    self.name_and_type(*name_and_type_index)?;
                }
                ConstantPoolEntry::NameAndType { .. } => {
                    self.name_and_type(index)?;
                }
                ConstantPoolEntry::Dynamic {
                    name_and_type_index,
                    ..
                }
                | ConstantPoolEntry::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => {
                    self.name_and_type(*name_and_type_index)?;
                }
                ConstantPoolEntry::MethodHandle {
                    reference_index, ..
                } => {
                    self.get(*reference_index)?;
                }
                ConstantPoolEntry::Utf8(_)
                | ConstantPoolEntry::Integer(_)
                | ConstantPoolEntry::Float(_)
                | ConstantPoolEntry::Long(_)
                | ConstantPoolEntry::Double(_)
                | ConstantPoolEntry::Unusable => {}
            }
        }
        Ok(())
    }
}

fn mismatch(index: u16, expected: &'static str, found: &ConstantPoolEntry) -> ConstantPoolError {
    ConstantPoolError::Mismatch {
        index,
        expected,
        found: found.kind(),
    }
}
