use crate::search::ClassPath;

/// Loader policy. `Default` has an empty class path; use [`LoaderConfig::from_env`] to pick up
/// the usual environment variables.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub class_path: ClassPath,
    /// Oldest accepted class file major version (JDK 1.1).
    pub min_major_version: u16,
    /// Newest accepted class file major version (Java 25).
    pub max_major_version: u16,
    /// Give `static final` primitive and `String` fields their `ConstantValue` during
    /// preparation. When off they keep the zero value until the static initializer runs.
    pub constant_static_values: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            class_path: ClassPath::new(),
            min_major_version: 45,
            max_major_version: 69,
            constant_static_values: true,
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        LoaderConfig {
            class_path: ClassPath::from_env(),
            ..Default::default()
        }
    }

    pub fn with_class_path(mut self, class_path: ClassPath) -> Self {
        self.class_path = class_path;
        self
    }
}
