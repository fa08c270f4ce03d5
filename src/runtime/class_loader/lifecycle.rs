use std::{error::Error, fmt::Debug, sync::Arc};

use tracing::{debug, trace};

use crate::{
    class::ConstantPoolError,
    consts::{
        CLASS_MAGIC, CLINIT_METHOD_NAME, FieldAccessFlag, OBJECT_CLASS_NAME, STRING_CLASS_NAME,
    },
    descriptor::{FieldType, MethodDescriptor, parse_field_descriptor},
    error::LoadError,
    runtime::{
        ClassKind, ClassLoader, ClassObject, ClassState, ConstantPoolInfo, FieldIndex, FieldInfo,
        InitStatus, MethodInfo, RuntimeClass, Value, primitive_type,
    },
};

/// Runs `<clinit>`. The loader calls it at most once per class, after the super class has been
/// initialized, while holding the class's initialization lock.
pub trait StaticInitializer: Debug + Send + Sync {
    fn run(
        &self,
        loader: &ClassLoader,
        class: &Arc<RuntimeClass>,
        clinit: &MethodInfo,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Marks classes initialized without running any bytecode.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipInitializer;

impl StaticInitializer for SkipInitializer {
    fn run(
        &self,
        _: &ClassLoader,
        class: &Arc<RuntimeClass>,
        _: &MethodInfo,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        debug!("skipping {}.{CLINIT_METHOD_NAME}", class.name);
        Ok(())
    }
}

impl ClassLoader {
    /// Structural checks only: magic number, version range and sane supertypes.
    pub(super) fn verify(&self, class: &RuntimeClass) -> Result<(), LoadError> {
        let mismatch = |reason: String| LoadError::FormatMismatch {
            class: Arc::clone(&class.name),
            reason,
        };

        if class.magic != CLASS_MAGIC {
            return Err(mismatch(format!("bad magic {:#010x}", class.magic)));
        }
        let versions = self.config.min_major_version..=self.config.max_major_version;
        if !versions.contains(&class.major_version) {
            return Err(mismatch(format!(
                "unsupported class file version {}.{} (supported major versions {}..={})",
                class.major_version,
                class.minor_version,
                versions.start(),
                versions.end()
            )));
        }
        match &class.super_class {
            Some(super_class) if super_class.is_interface() => {
                return Err(mismatch(format!(
                    "super class {} is an interface",
                    super_class.name
                )));
            }
            None if !class.is_interface() && class.name.as_ref() != OBJECT_CLASS_NAME => {
                return Err(mismatch("missing super class".to_string()));
            }
            _ => {}
        }
        if let Some(interface) = class.interfaces.iter().find(|class| !class.is_interface()) {
            return Err(mismatch(format!("{} is not an interface", interface.name)));
        }

        class.advance(ClassState::Verified);
        debug!("verified {}", class.name);
        Ok(())
    }

    /// Static storage already holds zero values; this fills in compile-time constants.
    pub(super) fn prepare(&self, class: &RuntimeClass) -> Result<(), LoadError> {
        if self.config.constant_static_values {
            for field in class.fields.iter().filter(|field| field.is_static()) {
                let Some(index) = field.constant_value else {
                    continue;
                };
                if !field.access_flags.contains(FieldAccessFlag::FINAL) {
                    continue;
                }
                if let Some(value) = constant_value(class, field, index)? {
                    trace!("{}.{} = {value:?}", class.name, field.name);
                    *class.static_fields[field.slot].write() = value;
                }
            }
        }

        class.advance(ClassState::Prepared);
        debug!("prepared {}", class.name);
        Ok(())
    }

    /// Links field references that name the class itself. Everything else is resolved on first
    /// use through [`ClassLoader::resolve_class_ref`].
    pub(super) fn resolve(&self, class: &RuntimeClass) -> Result<(), LoadError> {
        for entry in &class.constant_pool {
            let ConstantPoolInfo::Fieldref {
                class: target,
                name_and_type,
                field_index,
            } = entry
            else {
                continue;
            };
            if target.name != class.name {
                continue;
            }
            let descriptor = parse_field_descriptor(&name_and_type.descriptor)
                .map_err(|err| LoadError::descriptor(&class.name, err))?;
            let own_static = class.fields.iter().find(|field| {
                field.is_static()
                    && field.name == name_and_type.name
                    && field.descriptor == descriptor
            });
            let index = match own_static {
                Some(field) => Some(FieldIndex::Static(field.slot)),
                None => class
                    .instance_field(&name_and_type.name, &descriptor)
                    .map(|field| FieldIndex::Instance(field.slot)),
            };
            // not found here: a static field of a super type, linked on use
            if let Some(index) = index {
                let _ = field_index.set(index);
            }
        }

        class.advance(ClassState::Resolved);
        debug!("resolved {}", class.name);
        Ok(())
    }

    /// Resolves the class reference at `index` of `class`'s constant pool, loading the target if
    /// needed. The result is cached in the constant pool.
    pub fn resolve_class_ref(
        &self,
        class: &Arc<RuntimeClass>,
        index: u16,
    ) -> Result<Arc<RuntimeClass>, LoadError> {
        let info = match class
            .constant(index)
            .map_err(|err| LoadError::bad_constant(&class.name, err))?
        {
            ConstantPoolInfo::Class(info) => info,
            other => {
                return Err(LoadError::bad_constant(
                    &class.name,
                    ConstantPoolError::Mismatch {
                        index,
                        expected: "Class",
                        found: other.kind(),
                    },
                ));
            }
        };
        if let Some(resolved) = info.resolved() {
            return Ok(resolved);
        }
        let resolved = if info.name == class.name {
            Arc::clone(class)
        } else {
            self.load_class(&info.name)?
        };
        info.set_class(&resolved);
        Ok(resolved)
    }

    /// Runs the static initialization of `class` unless it already happened: the super class
    /// first, then `<clinit>`. A recursive request from the initializing thread returns at once;
    /// other threads block until initialization finished.
    pub fn initialize_class(&self, class: &Arc<RuntimeClass>) -> Result<(), LoadError> {
        if !matches!(class.kind, ClassKind::Ordinary) {
            return Ok(());
        }

        let status = class.clinit_call.lock();
        match status.get() {
            InitStatus::Init | InitStatus::InProgress => return Ok(()),
            InitStatus::Erroneous => {
                return Err(LoadError::InitializationFailed {
                    class: Arc::clone(&class.name),
                    reason: "an earlier initialization attempt failed".to_string(),
                });
            }
            InitStatus::NotInit => {}
        }
        status.set(InitStatus::InProgress);

        match self.run_initializers(class) {
            Ok(()) => {
                status.set(InitStatus::Init);
                class.advance(ClassState::Initialized);
                debug!("initialized {}", class.name);
                Ok(())
            }
            Err(err) => {
                status.set(InitStatus::Erroneous);
                Err(err)
            }
        }
    }

    fn run_initializers(&self, class: &Arc<RuntimeClass>) -> Result<(), LoadError> {
        if let Some(super_class) = &class.super_class {
            self.initialize_class(super_class)?;
        }
        let clinit_descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let Some(clinit) = class.method(CLINIT_METHOD_NAME, &clinit_descriptor) else {
            return Ok(());
        };
        self.initializer
            .run(self, class, clinit)
            .map_err(|err| LoadError::InitializationFailed {
                class: Arc::clone(&class.name),
                reason: err.to_string(),
            })
    }

    /// Loads and initializes the class called `name`.
    pub fn load_and_initialize(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError> {
        let class = self.load_class(name)?;
        self.initialize_class(&class)?;
        Ok(class)
    }

    /// `Class.forName`: takes a binary name (`java.lang.String`, `[Ljava.lang.String;`),
    /// optionally initializes the class, and returns its class object. Internal names and
    /// primitive names are not found.
    pub fn for_name(&self, name: &str, initialize: bool) -> Result<Arc<ClassObject>, LoadError> {
        if name.contains('/') || primitive_type(name).is_some() {
            return Err(LoadError::NotFound(Arc::from(name)));
        }
        let name = name.replace('.', "/");
        let class = if initialize {
            self.load_and_initialize(&name)?
        } else {
            self.load_class(&name)?
        };
        self.class_object_of(&class)
    }
}

/// The `ConstantValue` of `field`, if its type is one that takes a constant.
fn constant_value(
    class: &RuntimeClass,
    field: &FieldInfo,
    index: u16,
) -> Result<Option<Value>, LoadError> {
    let entry = class
        .constant(index)
        .map_err(|err| LoadError::bad_constant(&class.name, err))?;
    let value = match (&field.descriptor.0, entry) {
        (
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int,
            ConstantPoolInfo::Integer(value),
        ) => Value::Int(*value),
        (FieldType::Long, ConstantPoolInfo::Long(value)) => Value::Long(*value),
        (FieldType::Float, ConstantPoolInfo::Float(value)) => Value::Float(*value),
        (FieldType::Double, ConstantPoolInfo::Double(value)) => Value::Double(*value),
        (FieldType::Object(name), ConstantPoolInfo::String(value)) if name == STRING_CLASS_NAME => {
            Value::String(Arc::clone(value))
        }
        (FieldType::Object(name), _) if name != STRING_CLASS_NAME => return Ok(None),
        (FieldType::Array(_), _) => return Ok(None),
        (field_type, other) => {
            return Err(LoadError::bad_constant(
                &class.name,
                ConstantPoolError::Mismatch {
                    index,
                    expected: expected_constant(field_type),
                    found: other.kind(),
                },
            ));
        }
    };
    Ok(Some(value))
}

fn expected_constant(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Long => "Long",
        FieldType::Float => "Float",
        FieldType::Double => "Double",
        FieldType::Object(_) | FieldType::Array(_) => "String",
        _ => "Integer",
    }
}
