use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument};

use crate::{
    class,
    config::LoaderConfig,
    consts::CLASS_CLASS_NAME,
    error::LoadError,
    runtime::{
        ClassObject, ClassObjectPool, RuntimeClass,
        primitive::{PRIMITIVE_TYPES, primitive_type},
    },
    search::{ClassPathSearch, ClassSearch},
};

mod builder;
mod in_flight;
mod lifecycle;

use in_flight::InFlight;
pub use lifecycle::{SkipInitializer, StaticInitializer};

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Loads, links and initializes classes, and hands out their class objects.
///
/// Every class name maps to at most one [`RuntimeClass`] for the lifetime of the loader. When
/// several threads ask for the same class, one of them loads it and the others block until it
/// is done and then share its result.
#[derive(Debug)]
pub struct ClassLoader {
    id: u64,
    config: LoaderConfig,
    search: Box<dyn ClassSearch>,
    initializer: Box<dyn StaticInitializer>,
    class_registry: DashMap<Arc<str>, Arc<LoadSlot>>,
    in_flight: InFlight,
    class_objects: ClassObjectPool,
    class_class: OnceCell<Arc<RuntimeClass>>,
}

#[derive(Debug)]
struct LoadSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

#[derive(Debug)]
enum SlotState {
    Loading,
    Done(Result<Arc<RuntimeClass>, LoadError>),
}

impl LoadSlot {
    fn loading() -> Self {
        LoadSlot {
            state: Mutex::new(SlotState::Loading),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<Arc<RuntimeClass>, LoadError>) {
        *self.state.lock() = SlotState::Done(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<Arc<RuntimeClass>, LoadError> {
        let mut state = self.state.lock();
        loop {
            if let SlotState::Done(result) = &*state {
                return result.clone();
            }
            self.ready.wait(&mut state);
        }
    }

    fn loaded(&self) -> Option<Arc<RuntimeClass>> {
        match &*self.state.lock() {
            SlotState::Done(Ok(class)) => Some(Arc::clone(class)),
            _ => None,
        }
    }
}

impl ClassLoader {
    /// Creates a loader that searches `config.class_path` on disk and skips static initializers.
    pub fn new(config: LoaderConfig) -> Result<Self, LoadError> {
        let search = ClassPathSearch::new(config.class_path.clone());
        Self::with_search(config, search, SkipInitializer)
    }

    /// Creates a loader and bootstraps it: `java/lang/Class` (with everything it depends on) and
    /// the primitive classes are loaded, and every loaded class gets its class object.
    pub fn with_search(
        config: LoaderConfig,
        search: impl ClassSearch + 'static,
        initializer: impl StaticInitializer + 'static,
    ) -> Result<Self, LoadError> {
        let loader = ClassLoader {
            id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            search: Box::new(search),
            initializer: Box::new(initializer),
            class_registry: DashMap::new(),
            in_flight: InFlight::default(),
            class_objects: ClassObjectPool::new(),
            class_class: OnceCell::new(),
        };
        loader
            .bootstrap()
            .map_err(|err| LoadError::Bootstrap(Box::new(err)))?;
        Ok(loader)
    }

    fn bootstrap(&self) -> Result<(), LoadError> {
        let class_class = self.load_class(CLASS_CLASS_NAME)?;
        let class_class = Arc::clone(self.class_class.get_or_init(|| class_class));
        for (name, _) in &PRIMITIVE_TYPES {
            self.load_class(name)?;
        }
        for class in self.loaded_classes() {
            self.class_objects.get_or_create(&class, &class_class);
        }
        debug!(
            "class loader {} bootstrapped with {} classes",
            self.id,
            self.class_objects.len()
        );
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The `java/lang/Class` class. Present once the loader is constructed.
    pub fn class_class(&self) -> Option<&Arc<RuntimeClass>> {
        self.class_class.get()
    }

    /// Returns the class called `name`, loading, verifying, preparing and resolving it on first
    /// request. `name` is an internal name (`java/lang/Object`), an array descriptor (`[I`) or a
    /// primitive name (`int`). Initialization is left to [`ClassLoader::initialize_class`].
    #[instrument(level = "debug", skip(self))]
    pub fn load_class(&self, name: &str) -> Result<Arc<RuntimeClass>, LoadError> {
        if let Some(slot) = self.class_registry.get(name).map(|slot| Arc::clone(&slot)) {
            return self.wait_for_slot(name, &slot);
        }

        let name: Arc<str> = Arc::from(name);
        let (slot, _owner) = match self.class_registry.entry(Arc::clone(&name)) {
            Entry::Occupied(entry) => {
                let slot = Arc::clone(entry.get());
                drop(entry);
                return self.wait_for_slot(&name, &slot);
            }
            Entry::Vacant(entry) => {
                // registered while the entry is locked so waiters always find the owner
                let owner = self.in_flight.start(&name);
                let slot = Arc::new(LoadSlot::loading());
                entry.insert(Arc::clone(&slot));
                (slot, owner)
            }
        };

        let result = self.define_class(&name);
        // waiters must never see a class without its class object
        if let (Ok(class), Some(class_class)) = (&result, self.class_class.get()) {
            self.class_objects.get_or_create(class, class_class);
        }
        slot.publish(result.clone());
        if let Err(err) = &result {
            debug!("failed to load {name}: {err}");
            self.class_registry
                .remove_if(&name, |_, registered| Arc::ptr_eq(registered, &slot));
        }
        result
    }

    fn wait_for_slot(&self, name: &str, slot: &LoadSlot) -> Result<Arc<RuntimeClass>, LoadError> {
        if let Some(class) = slot.loaded() {
            return Ok(class);
        }
        let name: Arc<str> = Arc::from(name);
        let _waiting = self.in_flight.wait_for(&name)?;
        slot.wait()
    }

    fn define_class(&self, name: &Arc<str>) -> Result<Arc<RuntimeClass>, LoadError> {
        let class = if let Some(field_type) = primitive_type(name) {
            builder::primitive_class(self, name, field_type)
        } else if name.starts_with('[') {
            builder::array_class(self, name)?
        } else {
            let bytes = self
                .search
                .find(name)
                .map_err(|err| LoadError::from_search(name, err))?;
            let descriptor = class::parse(&bytes).map_err(|err| LoadError::parse(name, err))?;
            let class = builder::ordinary_class(self, name, descriptor)?;
            self.verify(&class)?;
            self.prepare(&class)?;
            self.resolve(&class)?;
            class
        };
        info!("defined {name}");
        Ok(Arc::new(class))
    }

    /// The class called `name` if it has already been loaded. Never loads anything.
    pub fn find_loaded(&self, name: &str) -> Option<Arc<RuntimeClass>> {
        let slot = self
            .class_registry
            .get(name)
            .map(|slot| Arc::clone(&slot))?;
        slot.loaded()
    }

    /// Snapshot of every successfully loaded class, in no particular order.
    pub fn loaded_classes(&self) -> Vec<Arc<RuntimeClass>> {
        let slots: Vec<_> = self
            .class_registry
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect();
        slots.iter().filter_map(|slot| slot.loaded()).collect()
    }

    /// Returns the single class object for the class called `name`, loading the class if needed.
    pub fn get_or_create_class_object(&self, name: &str) -> Result<Arc<ClassObject>, LoadError> {
        let class = self.load_class(name)?;
        self.class_object_of(&class)
    }

    pub(crate) fn class_object_of(
        &self,
        class: &Arc<RuntimeClass>,
    ) -> Result<Arc<ClassObject>, LoadError> {
        let class_class = self
            .class_class
            .get()
            .ok_or_else(|| LoadError::NotFound(Arc::from(CLASS_CLASS_NAME)))?;
        Ok(self.class_objects.get_or_create(class, class_class))
    }

    pub fn class_objects(&self) -> &ClassObjectPool {
        &self.class_objects
    }
}
