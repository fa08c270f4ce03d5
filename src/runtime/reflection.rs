use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::runtime::RuntimeClass;

/// The `java/lang/Class` instance mirroring one runtime class.
#[derive(Debug)]
pub struct ClassObject {
    entity: Arc<RuntimeClass>,
    class: Arc<RuntimeClass>,
    binary_name: String,
}

impl ClassObject {
    fn new(entity: &Arc<RuntimeClass>, class_class: &Arc<RuntimeClass>) -> Self {
        ClassObject {
            entity: Arc::clone(entity),
            class: Arc::clone(class_class),
            binary_name: entity.binary_name(),
        }
    }

    /// The class this object describes.
    pub fn entity(&self) -> &Arc<RuntimeClass> {
        &self.entity
    }

    /// Always `java/lang/Class`.
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.binary_name
    }
}

/// One class object per class name.
#[derive(Debug, Default)]
pub struct ClassObjectPool {
    objects: DashMap<Arc<str>, Arc<ClassObject>>,
}

impl ClassObjectPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled object for `class`, creating it on first request, and makes sure the
    /// class points back at that same object.
    pub(crate) fn get_or_create(
        &self,
        class: &Arc<RuntimeClass>,
        class_class: &Arc<RuntimeClass>,
    ) -> Arc<ClassObject> {
        let object = Arc::clone(
            self.objects
                .entry(Arc::clone(&class.name))
                .or_insert_with(|| {
                    debug!("created class object for {}", class.name);
                    Arc::new(ClassObject::new(class, class_class))
                })
                .value(),
        );
        class.class_object.get_or_init(|| Arc::downgrade(&object));
        debug_assert!(
            class
                .class_object()
                .is_some_and(|attached| Arc::ptr_eq(&attached, &object))
        );
        object
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassObject>> {
        self.objects.get(name).map(|object| Arc::clone(object.value()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
