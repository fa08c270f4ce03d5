//! Assembles class files in memory for tests.

use std::collections::HashMap;

use crate::{
    class::ConstantPoolEntry,
    consts::{
        CLASS_CLASS_NAME, CLASS_MAGIC, CLONEABLE_CLASS_NAME, ClassAccessFlag, FieldAccessFlag,
        MethodAccessFlag, OBJECT_CLASS_NAME, SERIALIZABLE_CLASS_NAME, STRING_CLASS_NAME,
    },
    search::MemorySearch,
};

struct Member {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<(u16, Vec<u8>)>,
}

pub(crate) struct ClassFileBuilder {
    major_version: u16,
    access_flags: ClassAccessFlag,
    constants: Vec<ConstantPoolEntry>,
    utf8_cache: HashMap<String, u16>,
    class_cache: HashMap<String, u16>,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
}

impl ClassFileBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut builder = ClassFileBuilder {
            major_version: 52,
            access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
            constants: vec![],
            utf8_cache: HashMap::new(),
            class_cache: HashMap::new(),
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
        };
        builder.this_class = builder.class(name);
        builder
    }

    pub(crate) fn access(mut self, access_flags: ClassAccessFlag) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub(crate) fn interface_type(self) -> Self {
        self.access(
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT,
        )
    }

    pub(crate) fn major_version(mut self, major_version: u16) -> Self {
        self.major_version = major_version;
        self
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.super_class = self.class(name);
        self
    }

    pub(crate) fn interface(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    pub(crate) fn field(mut self, access_flags: FieldAccessFlag, name: &str, descriptor: &str) -> Self {
        let member = self.member(access_flags.bits(), name, descriptor);
        self.fields.push(member);
        self
    }

    /// Field carrying a `ConstantValue` attribute pointing at `value_index`.
    pub(crate) fn constant_field(
        mut self,
        access_flags: FieldAccessFlag,
        name: &str,
        descriptor: &str,
        value_index: u16,
    ) -> Self {
        let mut member = self.member(access_flags.bits(), name, descriptor);
        let attribute_name = self.utf8("ConstantValue");
        member
            .attributes
            .push((attribute_name, value_index.to_be_bytes().to_vec()));
        self.fields.push(member);
        self
    }

    pub(crate) fn method(mut self, access_flags: MethodAccessFlag, name: &str, descriptor: &str) -> Self {
        let member = self.member(access_flags.bits(), name, descriptor);
        self.methods.push(member);
        self
    }

    /// Method with a `Code` attribute and an empty exception table.
    pub(crate) fn method_with_code(
        mut self,
        access_flags: MethodAccessFlag,
        name: &str,
        descriptor: &str,
        code: &[u8],
    ) -> Self {
        let mut member = self.member(access_flags.bits(), name, descriptor);
        let attribute_name = self.utf8("Code");
        let mut info = vec![];
        info.extend(2u16.to_be_bytes());
        info.extend(1u16.to_be_bytes());
        info.extend((code.len() as u32).to_be_bytes());
        info.extend(code);
        info.extend(0u16.to_be_bytes());
        info.extend(0u16.to_be_bytes());
        member.attributes.push((attribute_name, info));
        self.methods.push(member);
        self
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8_cache.get(value) {
            return index;
        }
        let index = self.raw_constant(ConstantPoolEntry::Utf8(value.into()));
        self.utf8_cache.insert(value.to_string(), index);
        index
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.class_cache.get(name) {
            return index;
        }
        let name_index = self.utf8(name);
        let index = self.raw_constant(ConstantPoolEntry::Class { name_index });
        self.class_cache.insert(name.to_string(), index);
        index
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        self.raw_constant(ConstantPoolEntry::Integer(value))
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        self.raw_constant(ConstantPoolEntry::Long(value))
    }

    pub(crate) fn double(&mut self, value: f64) -> u16 {
        self.raw_constant(ConstantPoolEntry::Double(value))
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let string_index = self.utf8(value);
        self.raw_constant(ConstantPoolEntry::String { string_index })
    }

    pub(crate) fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let name_and_type_index = self.raw_constant(ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        });
        self.raw_constant(ConstantPoolEntry::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    /// Appends an entry without checking it. Returns its 1-based index.
    pub(crate) fn raw_constant(&mut self, entry: ConstantPoolEntry) -> u16 {
        let wide = entry.is_wide();
        self.constants.push(entry);
        let index = self.constants.len() as u16;
        if wide {
            self.constants.push(ConstantPoolEntry::Unusable);
        }
        index
    }

    fn member(&mut self, access_flags: u16, name: &str, descriptor: &str) -> Member {
        Member {
            access_flags,
            name_index: self.utf8(name),
            descriptor_index: self.utf8(descriptor),
            attributes: vec![],
        }
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = vec![];
        out.extend(CLASS_MAGIC.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(self.major_version.to_be_bytes());
        out.extend((self.constants.len() as u16 + 1).to_be_bytes());
        for constant in &self.constants {
            write_constant(&mut out, constant);
        }
        out.extend(self.access_flags.bits().to_be_bytes());
        out.extend(self.this_class.to_be_bytes());
        out.extend(self.super_class.to_be_bytes());
        out.extend((self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend(interface.to_be_bytes());
        }
        for members in [&self.fields, &self.methods] {
            out.extend((members.len() as u16).to_be_bytes());
            for member in members {
                out.extend(member.access_flags.to_be_bytes());
                out.extend(member.name_index.to_be_bytes());
                out.extend(member.descriptor_index.to_be_bytes());
                out.extend((member.attributes.len() as u16).to_be_bytes());
                for (name_index, info) in &member.attributes {
                    out.extend(name_index.to_be_bytes());
                    out.extend((info.len() as u32).to_be_bytes());
                    out.extend(info);
                }
            }
        }
        // no class attributes
        out.extend(0u16.to_be_bytes());
        out
    }
}

fn write_constant(out: &mut Vec<u8>, constant: &ConstantPoolEntry) {
    let pair = |out: &mut Vec<u8>, tag: u8, a: u16, b: u16| {
        out.push(tag);
        out.extend(a.to_be_bytes());
        out.extend(b.to_be_bytes());
    };
    match constant {
        ConstantPoolEntry::Utf8(value) => {
            out.push(1);
            out.extend((value.len() as u16).to_be_bytes());
            out.extend(value.as_bytes());
        }
        ConstantPoolEntry::Integer(value) => {
            out.push(3);
            out.extend(value.to_be_bytes());
        }
        ConstantPoolEntry::Float(value) => {
            out.push(4);
            out.extend(value.to_be_bytes());
        }
        ConstantPoolEntry::Long(value) => {
            out.push(5);
            out.extend(value.to_be_bytes());
        }
        ConstantPoolEntry::Double(value) => {
            out.push(6);
            out.extend(value.to_be_bytes());
        }
        ConstantPoolEntry::Class { name_index } => {
            out.push(7);
            out.extend(name_index.to_be_bytes());
        }
        ConstantPoolEntry::String { string_index } => {
            out.push(8);
            out.extend(string_index.to_be_bytes());
        }
        ConstantPoolEntry::Fieldref {
            class_index,
            name_and_type_index,
        } => pair(out, 9, *class_index, *name_and_type_index),
        ConstantPoolEntry::Methodref {
            class_index,
            name_and_type_index,
        } => pair(out, 10, *class_index, *name_and_type_index),
        ConstantPoolEntry::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => pair(out, 11, *class_index, *name_and_type_index),
        ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        } => pair(out, 12, *name_index, *descriptor_index),
        ConstantPoolEntry::MethodHandle {
            reference_kind,
            reference_index,
        } => {
            out.push(15);
            out.push(*reference_kind);
            out.extend(reference_index.to_be_bytes());
        }
        ConstantPoolEntry::MethodType { descriptor_index } => {
            out.push(16);
            out.extend(descriptor_index.to_be_bytes());
        }
        ConstantPoolEntry::Dynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        } => pair(out, 17, *bootstrap_method_attr_index, *name_and_type_index),
        ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        } => pair(out, 18, *bootstrap_method_attr_index, *name_and_type_index),
        ConstantPoolEntry::Module { name_index } => {
            out.push(19);
            out.extend(name_index.to_be_bytes());
        }
        ConstantPoolEntry::Package { name_index } => {
            out.push(20);
            out.extend(name_index.to_be_bytes());
        }
        ConstantPoolEntry::Unusable => {}
    }
}

/// The classes every loader needs before it can hand out class objects and array classes.
pub(crate) fn bootstrap_search() -> MemorySearch {
    let mut search = MemorySearch::new();
    search.insert(
        OBJECT_CLASS_NAME,
        ClassFileBuilder::new(OBJECT_CLASS_NAME)
            .method(MethodAccessFlag::PUBLIC, "<init>", "()V")
            .method(MethodAccessFlag::PUBLIC, "hashCode", "()I")
            .build(),
    );
    search.insert(
        SERIALIZABLE_CLASS_NAME,
        ClassFileBuilder::new(SERIALIZABLE_CLASS_NAME)
            .interface_type()
            .super_class(OBJECT_CLASS_NAME)
            .build(),
    );
    search.insert(
        CLONEABLE_CLASS_NAME,
        ClassFileBuilder::new(CLONEABLE_CLASS_NAME)
            .interface_type()
            .super_class(OBJECT_CLASS_NAME)
            .build(),
    );
    search.insert(
        CLASS_CLASS_NAME,
        ClassFileBuilder::new(CLASS_CLASS_NAME)
            .access(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
            .super_class(OBJECT_CLASS_NAME)
            .interface(SERIALIZABLE_CLASS_NAME)
            .field(FieldAccessFlag::PRIVATE, "name", "Ljava/lang/String;")
            .build(),
    );
    search.insert(
        STRING_CLASS_NAME,
        ClassFileBuilder::new(STRING_CLASS_NAME)
            .access(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
            .super_class(OBJECT_CLASS_NAME)
            .interface(SERIALIZABLE_CLASS_NAME)
            .field(FieldAccessFlag::PRIVATE | FieldAccessFlag::FINAL, "value", "[B")
            .build(),
    );
    search
}
