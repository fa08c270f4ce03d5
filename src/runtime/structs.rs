use std::{
    cell::Cell,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU8, Ordering},
    },
};

use once_cell::sync::OnceCell;
use parking_lot::{ReentrantMutex, RwLock};

pub use constant_pool::*;

use crate::{
    class::{CodeAttribute, ConstantPoolError},
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    descriptor::{FieldDescriptor, FieldType, MethodDescriptor},
    runtime::ClassObject,
};

mod constant_pool;

/// A class as the runtime sees it. Shared through `Arc`; the registry of the defining loader
/// holds exactly one instance per name.
pub struct RuntimeClass {
    pub(crate) name: Arc<str>,
    pub(crate) kind: ClassKind,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) loader_id: u64,
    pub(crate) magic: u32,
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) super_class: Option<Arc<RuntimeClass>>,
    pub(crate) interfaces: Vec<Arc<RuntimeClass>>,
    // declared fields only, inherited instance fields live in the super classes
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) instance_slot_count: usize,
    pub(crate) static_fields: Vec<RwLock<Value>>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) state: AtomicU8,
    pub(in crate::runtime) clinit_call: ReentrantMutex<Cell<InitStatus>>,
    pub(in crate::runtime) class_object: OnceCell<Weak<ClassObject>>,
}

#[derive(Debug, Clone)]
pub enum ClassKind {
    Ordinary,
    /// `None` is `void`.
    Primitive(Option<FieldType>),
    Array {
        component: Arc<RuntimeClass>,
        dimensions: usize,
    },
}

/// Lifecycle position of a class. Only ever moves forward.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClassState {
    Loaded,
    Verified,
    Prepared,
    Resolved,
    Initialized,
}

impl ClassState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClassState::Loaded,
            1 => ClassState::Verified,
            2 => ClassState::Prepared,
            3 => ClassState::Resolved,
            _ => ClassState::Initialized,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(in crate::runtime) enum InitStatus {
    NotInit,
    InProgress,
    Init,
    Erroneous,
}

/// Contents of a static field cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `boolean`, `byte`, `char`, `short` and `int`.
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// String literal taken from a `ConstantValue` attribute.
    String(Arc<str>),
    Null,
}

impl Value {
    pub fn zero(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: FieldDescriptor,
    /// Index into the instance layout or, for static fields, into the static storage.
    pub(crate) slot: usize,
    pub(crate) constant_value: Option<u16>,
}

impl FieldInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn access_flags(&self) -> FieldAccessFlag {
        self.access_flags
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn constant_value_index(&self) -> Option<u16> {
        self.constant_value
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::STATIC)
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: MethodDescriptor,
    pub(crate) code: Option<CodeAttribute>,
}

impl MethodInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn access_flags(&self) -> MethodAccessFlag {
        self.access_flags
    }

    /// `None` for abstract and native methods.
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.code.as_ref()
    }
}

impl RuntimeClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted form, as `Class.getName` reports it.
    pub fn binary_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn access_flags(&self) -> ClassAccessFlag {
        self.access_flags
    }

    pub fn loader_id(&self) -> u64 {
        self.loader_id
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    pub fn super_class(&self) -> Option<&Arc<RuntimeClass>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<RuntimeClass>] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Number of instance slots, inherited ones included.
    pub fn instance_slot_count(&self) -> usize {
        self.instance_slot_count
    }

    pub fn static_field_count(&self) -> usize {
        self.static_fields.len()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    pub fn component_type(&self) -> Option<&Arc<RuntimeClass>> {
        match &self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// `0` for everything but arrays.
    pub fn dimensions(&self) -> usize {
        match &self.kind {
            ClassKind::Array { dimensions, .. } => *dimensions,
            _ => 0,
        }
    }

    /// Looks up a field declared by this class. Inherited fields are not searched.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name.as_ref() == name)
    }

    /// Looks up an instance field here and then up the super class chain.
    pub fn instance_field(&self, name: &str, descriptor: &FieldDescriptor) -> Option<&FieldInfo> {
        let mut class = Some(self);
        while let Some(current) = class {
            let found = current.fields.iter().find(|field| {
                !field.is_static() && field.name.as_ref() == name && &field.descriptor == descriptor
            });
            if found.is_some() {
                return found;
            }
            class = current.super_class.as_deref();
        }
        None
    }

    pub fn method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|method| method.name.as_ref() == name && &method.descriptor == descriptor)
    }

    pub fn static_value(&self, slot: usize) -> Option<Value> {
        self.static_fields.get(slot).map(|cell| cell.read().clone())
    }

    /// Returns `false` when `slot` is out of range.
    pub fn set_static_value(&self, slot: usize, value: Value) -> bool {
        let Some(cell) = self.static_fields.get(slot) else {
            return false;
        };
        *cell.write() = value;
        true
    }

    pub fn constant(&self, index: u16) -> Result<&ConstantPoolInfo, ConstantPoolError> {
        let entry = index
            .checked_sub(1)
            .and_then(|i| self.constant_pool.get(i as usize))
            .ok_or(ConstantPoolError::OutOfRange {
                index,
                count: self.constant_pool.len() as u16 + 1,
            })?;
        if let ConstantPoolInfo::Empty = entry {
            return Err(ConstantPoolError::Unusable { index });
        }
        Ok(entry)
    }

    pub fn state(&self) -> ClassState {
        ClassState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the class forward to `state`. Never moves it back.
    pub(crate) fn advance(&self, state: ClassState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// The class object attached by the loader, once the `java/lang/Class` class exists.
    pub fn class_object(&self) -> Option<Arc<ClassObject>> {
        self.class_object.get().and_then(Weak::upgrade)
    }

    pub fn is_subclass_of(&self, other: &RuntimeClass) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if std::ptr::eq(current, other) {
                return true;
            }
            class = current.super_class.as_deref();
        }
        false
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // super classes and components are printed by name only
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .field("access_flags", &self.access_flags)
            .field("loader_id", &self.loader_id)
            .field(
                "super_class",
                &self.super_class.as_ref().map(|class| &class.name),
            )
            .field(
                "interfaces",
                &self
                    .interfaces
                    .iter()
                    .map(|class| &class.name)
                    .collect::<Vec<_>>(),
            )
            .field("fields", &self.fields)
            .field("instance_slot_count", &self.instance_slot_count)
            .field("methods", &self.methods.len())
            .field("state", &self.state())
            .finish()
    }
}

impl RuntimeClass {
    fn kind_name(&self) -> String {
        match &self.kind {
            ClassKind::Ordinary => "ordinary".to_string(),
            ClassKind::Primitive(_) => "primitive".to_string(),
            ClassKind::Array {
                component,
                dimensions,
            } => format!("array of {} ({dimensions}d)", component.name),
        }
    }
}
