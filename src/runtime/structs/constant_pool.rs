use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::{
    class::{ConstantPool, ConstantPoolEntry, ConstantPoolError},
    runtime::RuntimeClass,
};

/// Runtime view of a constant pool entry. Symbolic references carry their names so they can be
/// resolved without the class file, plus a cell for the resolved target.
#[derive(Debug)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(CpClassInfo),
    String(Arc<str>),
    Fieldref {
        class: CpClassInfo,
        name_and_type: CpNameAndTypeInfo,
        field_index: OnceCell<FieldIndex>,
    },
    Methodref {
        class: CpClassInfo,
        name_and_type: CpNameAndTypeInfo,
    },
    InterfaceMethodref {
        class: CpClassInfo,
        name_and_type: CpNameAndTypeInfo,
    },
    NameAndType(CpNameAndTypeInfo),
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType(Arc<str>),
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type: CpNameAndTypeInfo,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type: CpNameAndTypeInfo,
    },
    Module(Arc<str>),
    Package(Arc<str>),
    Empty,
}

impl ConstantPoolInfo {
    pub fn kind(&self) -> &'static str {
        match self {
            ConstantPoolInfo::Utf8(_) => "Utf8",
            ConstantPoolInfo::Integer(_) => "Integer",
            ConstantPoolInfo::Float(_) => "Float",
            ConstantPoolInfo::Long(_) => "Long",
            ConstantPoolInfo::Double(_) => "Double",
            ConstantPoolInfo::Class(_) => "Class",
            ConstantPoolInfo::String(_) => "String",
            ConstantPoolInfo::Fieldref { .. } => "Fieldref",
            ConstantPoolInfo::Methodref { .. } => "Methodref",
            ConstantPoolInfo::InterfaceMethodref { .. } => "InterfaceMethodref",
            ConstantPoolInfo::NameAndType(_) => "NameAndType",
            ConstantPoolInfo::MethodHandle { .. } => "MethodHandle",
            ConstantPoolInfo::MethodType(_) => "MethodType",
            ConstantPoolInfo::Dynamic { .. } => "Dynamic",
            ConstantPoolInfo::InvokeDynamic { .. } => "InvokeDynamic",
            ConstantPoolInfo::Module(_) => "Module",
            ConstantPoolInfo::Package(_) => "Package",
            ConstantPoolInfo::Empty => "Unusable",
        }
    }
}

#[derive(Debug)]
pub struct CpClassInfo {
    pub(crate) name: Arc<str>,
    // weak so that a class referring to itself does not keep itself alive
    pub(crate) class: OnceCell<Weak<RuntimeClass>>,
}

impl CpClassInfo {
    fn new(name: &Arc<str>) -> Self {
        CpClassInfo {
            name: Arc::clone(name),
            class: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class this entry was resolved to, if it has been and is still alive.
    pub fn resolved(&self) -> Option<Arc<RuntimeClass>> {
        self.class.get().and_then(Weak::upgrade)
    }

    pub(crate) fn set_class(&self, class: &Arc<RuntimeClass>) {
        // a racing resolution stored the same registry instance
        let _ = self.class.set(Arc::downgrade(class));
    }
}

#[derive(Debug, Clone)]
pub struct CpNameAndTypeInfo {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
}

impl CpNameAndTypeInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

/// Where a field reference points once linked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldIndex {
    Instance(usize),
    Static(usize),
}

/// Copies the class file constant pool into its runtime form. Index `i` of the result is
/// constant pool index `i + 1`.
pub(crate) fn runtime_constant_pool(
    pool: &ConstantPool,
) -> Result<Vec<ConstantPoolInfo>, ConstantPoolError> {
    let class = |index: u16| pool.class_name(index).map(CpClassInfo::new);
    let name_and_type = |index: u16| {
        pool.name_and_type(index)
            .map(|(name, descriptor)| CpNameAndTypeInfo {
                name: Arc::clone(name),
                descriptor: Arc::clone(descriptor),
            })
    };

    let mut entries = Vec::with_capacity(pool.count() as usize);
    for index in 1..pool.count() {
        let entry = match pool.get(index) {
            Ok(entry) => entry,
            Err(ConstantPoolError::Unusable { .. }) => {
                entries.push(ConstantPoolInfo::Empty);
                continue;
            }
            Err(err) => return Err(err),
        };
        let info = match entry {
            ConstantPoolEntry::Utf8(string) => ConstantPoolInfo::Utf8(Arc::clone(string)),
            ConstantPoolEntry::Integer(value) => ConstantPoolInfo::Integer(*value),
            ConstantPoolEntry::Float(value) => ConstantPoolInfo::Float(*value),
            ConstantPoolEntry::Long(value) => ConstantPoolInfo::Long(*value),
            ConstantPoolEntry::Double(value) => ConstantPoolInfo::Double(*value),
            ConstantPoolEntry::Class { .. } => ConstantPoolInfo::Class(class(index)?),
            ConstantPoolEntry::String { string_index } => {
                ConstantPoolInfo::String(Arc::clone(pool.utf8(*string_index)?))
            }
            ConstantPoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            } => ConstantPoolInfo::Fieldref {
                class: class(*class_index)?,
                name_and_type: name_and_type(*name_and_type_index)?,
                field_index: OnceCell::new(),
            },
            ConstantPoolEntry::Methodref {
                class_index,
                name_and_type_index,
            } => ConstantPoolInfo::Methodref {
                class: class(*class_index)?,
                name_and_type: name_and_type(*name_and_type_index)?,
            },
            ConstantPoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => ConstantPoolInfo::InterfaceMethodref {
                class: class(*class_index)?,
                name_and_type: name_and_type(*name_and_type_index)?,
            },
            ConstantPoolEntry::NameAndType { .. } => {
                ConstantPoolInfo::NameAndType(name_and_type(index)?)
            }
            ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            } => ConstantPoolInfo::MethodHandle {
                reference_kind: *reference_kind,
                reference_index: *reference_index,
            },
            ConstantPoolEntry::MethodType { descriptor_index } => {
                ConstantPoolInfo::MethodType(Arc::clone(pool.utf8(*descriptor_index)?))
            }
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index: *bootstrap_method_attr_index,
                name_and_type: name_and_type(*name_and_type_index)?,
            },
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index: *bootstrap_method_attr_index,
                name_and_type: name_and_type(*name_and_type_index)?,
            },
            ConstantPoolEntry::Module { name_index } => {
                ConstantPoolInfo::Module(Arc::clone(pool.utf8(*name_index)?))
            }
            ConstantPoolEntry::Package { name_index } => {
                ConstantPoolInfo::Package(Arc::clone(pool.utf8(*name_index)?))
            }
            ConstantPoolEntry::Unusable => ConstantPoolInfo::Empty,
        };
        entries.push(info);
    }
    Ok(entries)
}
