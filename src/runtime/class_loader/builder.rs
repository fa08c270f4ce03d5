use std::{
    cell::Cell,
    sync::{Arc, atomic::AtomicU8},
};

use once_cell::sync::OnceCell;
use parking_lot::{ReentrantMutex, RwLock};

use crate::{
    class::{
        self, CODE_ATTRIBUTE, CONSTANT_VALUE_ATTRIBUTE, ClassDescriptor, ConstantPool,
        find_attribute, parse_code, parse_constant_value,
    },
    consts::{
        CLASS_MAGIC, CLONEABLE_CLASS_NAME, ClassAccessFlag, FieldAccessFlag, OBJECT_CLASS_NAME,
        SERIALIZABLE_CLASS_NAME,
    },
    descriptor::{
        DescriptorError, FieldDescriptor, FieldType, parse_field_descriptor,
        parse_method_descriptor,
    },
    error::LoadError,
    runtime::{
        ClassKind, ClassLoader, ClassState, ConstantPoolInfo, FieldInfo, InitStatus, MethodInfo,
        RuntimeClass, Value, runtime_constant_pool,
    },
};

/// Materializes a parsed class file. Super class and interfaces are loaded through `loader`
/// before anything else is decoded.
pub(super) fn ordinary_class(
    loader: &ClassLoader,
    name: &Arc<str>,
    descriptor: ClassDescriptor,
) -> Result<RuntimeClass, LoadError> {
    let bad_constant = |err| LoadError::bad_constant(name, err);
    let pool = &descriptor.constant_pool;

    let declared = descriptor.class_name().map_err(bad_constant)?;
    if declared != name {
        return Err(LoadError::NameMismatch {
            requested: Arc::clone(name),
            found: Arc::clone(declared),
        });
    }

    let super_class = descriptor
        .super_class_name()
        .map_err(bad_constant)?
        .map(|super_name| loader.load_class(super_name))
        .transpose()?;
    let interfaces = descriptor
        .interface_names()
        .map_err(bad_constant)?
        .into_iter()
        .map(|interface| loader.load_class(interface))
        .collect::<Result<Vec<_>, _>>()?;

    let constant_pool = runtime_constant_pool(pool).map_err(bad_constant)?;
    if let Some(super_class) = &super_class {
        link_class_entry(&constant_pool, descriptor.super_class, super_class);
    }
    for (&index, interface) in descriptor.interfaces.iter().zip(&interfaces) {
        link_class_entry(&constant_pool, index, interface);
    }

    let (fields, instance_slot_count) =
        layout_fields(name, pool, &descriptor.fields, super_class.as_deref())?;
    let static_fields = fields
        .iter()
        .filter(|field| field.is_static())
        .map(|field| RwLock::new(Value::zero(&field.descriptor.0)))
        .collect();
    let methods = descriptor
        .methods
        .iter()
        .map(|method| method_info(name, pool, method))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RuntimeClass {
        name: Arc::clone(name),
        kind: ClassKind::Ordinary,
        access_flags: descriptor.access_flags,
        loader_id: loader.id,
        magic: descriptor.magic,
        minor_version: descriptor.minor_version,
        major_version: descriptor.major_version,
        super_class,
        interfaces,
        fields,
        instance_slot_count,
        static_fields,
        methods,
        constant_pool,
        state: AtomicU8::new(ClassState::Loaded as u8),
        clinit_call: ReentrantMutex::new(Cell::new(InitStatus::NotInit)),
        class_object: OnceCell::new(),
    })
}

pub(super) fn primitive_class(
    loader: &ClassLoader,
    name: &Arc<str>,
    field_type: Option<FieldType>,
) -> RuntimeClass {
    synthetic_class(
        loader,
        name,
        ClassKind::Primitive(field_type),
        ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT,
        None,
        vec![],
        // nothing to initialize
        ClassState::Initialized,
    )
}

/// Synthesizes `name`, which starts with `[`. The component class is loaded first.
pub(super) fn array_class(loader: &ClassLoader, name: &Arc<str>) -> Result<RuntimeClass, LoadError> {
    let FieldDescriptor(field_type) =
        parse_field_descriptor(name).map_err(|err| LoadError::descriptor(name, err))?;
    let FieldType::Array(component_type) = field_type else {
        return Err(LoadError::descriptor(
            name,
            DescriptorError {
                descriptor: name.to_string(),
            },
        ));
    };

    let component = loader.load_class(&component_type.class_name())?;
    let dimensions = name.bytes().take_while(|&byte| byte == b'[').count();

    let mut access_flags = ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT;
    if component.is_primitive() || component.access_flags.contains(ClassAccessFlag::PUBLIC) {
        access_flags |= ClassAccessFlag::PUBLIC;
    }

    let super_class = loader.load_class(OBJECT_CLASS_NAME)?;
    let interfaces = vec![
        loader.load_class(CLONEABLE_CLASS_NAME)?,
        loader.load_class(SERIALIZABLE_CLASS_NAME)?,
    ];

    // arrays have no initializer
    Ok(synthetic_class(
        loader,
        name,
        ClassKind::Array {
            component,
            dimensions,
        },
        access_flags,
        Some(super_class),
        interfaces,
        ClassState::Resolved,
    ))
}

fn synthetic_class(
    loader: &ClassLoader,
    name: &Arc<str>,
    kind: ClassKind,
    access_flags: ClassAccessFlag,
    super_class: Option<Arc<RuntimeClass>>,
    interfaces: Vec<Arc<RuntimeClass>>,
    state: ClassState,
) -> RuntimeClass {
    let instance_slot_count = super_class
        .as_ref()
        .map_or(0, |super_class| super_class.instance_slot_count);
    RuntimeClass {
        name: Arc::clone(name),
        kind,
        access_flags,
        loader_id: loader.id,
        magic: CLASS_MAGIC,
        minor_version: 0,
        major_version: 0,
        super_class,
        interfaces,
        fields: vec![],
        instance_slot_count,
        static_fields: vec![],
        methods: vec![],
        constant_pool: vec![],
        state: AtomicU8::new(state as u8),
        clinit_call: ReentrantMutex::new(Cell::new(InitStatus::Init)),
        class_object: OnceCell::new(),
    }
}

fn link_class_entry(constant_pool: &[ConstantPoolInfo], index: u16, class: &Arc<RuntimeClass>) {
    let entry = index
        .checked_sub(1)
        .and_then(|i| constant_pool.get(i as usize));
    if let Some(ConstantPoolInfo::Class(info)) = entry {
        info.set_class(class);
    }
}

/// Decodes the declared fields and assigns slots. Instance slots continue after the super
/// class's, with long and double taking two; static slots count from zero, one per field.
/// Returns the fields and the total instance slot count.
fn layout_fields(
    class_name: &Arc<str>,
    pool: &ConstantPool,
    fields: &[class::FieldInfo],
    super_class: Option<&RuntimeClass>,
) -> Result<(Vec<FieldInfo>, usize), LoadError> {
    let mut instance_slot = super_class.map_or(0, |super_class| super_class.instance_slot_count);
    let mut static_slot = 0;

    let mut result = Vec::with_capacity(fields.len());
    for field in fields {
        let name = pool
            .utf8(field.name_index)
            .map_err(|err| LoadError::bad_constant(class_name, err))?;
        let descriptor = pool
            .utf8(field.descriptor_index)
            .map_err(|err| LoadError::bad_constant(class_name, err))?;
        let descriptor =
            parse_field_descriptor(descriptor).map_err(|err| LoadError::descriptor(class_name, err))?;
        let constant_value = find_attribute(&field.attributes, pool, CONSTANT_VALUE_ATTRIBUTE)
            .and_then(|attribute| {
                attribute
                    .map(|attribute| parse_constant_value(&attribute.info))
                    .transpose()
            })
            .map_err(|err| LoadError::parse(class_name, err))?;

        let is_static = field.access_flags.contains(FieldAccessFlag::STATIC);
        let slot = if is_static {
            static_slot += 1;
            static_slot - 1
        } else {
            let slot = instance_slot;
            instance_slot += if descriptor.0.is_wide() { 2 } else { 1 };
            slot
        };

        result.push(FieldInfo {
            access_flags: field.access_flags,
            name: Arc::clone(name),
            descriptor,
            slot,
            constant_value,
        });
    }
    Ok((result, instance_slot))
}

fn method_info(
    class_name: &Arc<str>,
    pool: &ConstantPool,
    method: &class::MethodInfo,
) -> Result<MethodInfo, LoadError> {
    let name = pool
        .utf8(method.name_index)
        .map_err(|err| LoadError::bad_constant(class_name, err))?;
    let descriptor = pool
        .utf8(method.descriptor_index)
        .map_err(|err| LoadError::bad_constant(class_name, err))?;
    let descriptor =
        parse_method_descriptor(descriptor).map_err(|err| LoadError::descriptor(class_name, err))?;
    let code = find_attribute(&method.attributes, pool, CODE_ATTRIBUTE)
        .and_then(|attribute| attribute.map(|attribute| parse_code(&attribute.info)).transpose())
        .map_err(|err| LoadError::parse(class_name, err))?;

    Ok(MethodInfo {
        access_flags: method.access_flags,
        name: Arc::clone(name),
        descriptor,
        code,
    })
}
