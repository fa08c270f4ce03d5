use std::sync::Arc;

use thiserror::Error;

use crate::{
    class::{ConstantPoolError, ParseError},
    descriptor::DescriptorError,
    search::SearchError,
};

/// Why a class could not be produced. Cloned to every thread that waited on the same load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("class {0} not found")]
    NotFound(Arc<str>),
    #[error("failed to parse class {class}")]
    Parse {
        class: Arc<str>,
        #[source]
        source: ParseError,
    },
    #[error("class {class} failed verification: {reason}")]
    FormatMismatch { class: Arc<str>, reason: String },
    #[error("circular dependency while loading {class}")]
    CircularDependency { class: Arc<str> },
    #[error("failed to read class {class}")]
    Io {
        class: Arc<str>,
        #[source]
        source: SearchError,
    },
    #[error("class file for {requested} defines {found}")]
    NameMismatch { requested: Arc<str>, found: Arc<str> },
    #[error("invalid descriptor in class {class}")]
    InvalidDescriptor {
        class: Arc<str>,
        #[source]
        source: DescriptorError,
    },
    #[error("bad constant in class {class}")]
    BadConstant {
        class: Arc<str>,
        #[source]
        source: ConstantPoolError,
    },
    #[error("initialization of {class} failed: {reason}")]
    InitializationFailed { class: Arc<str>, reason: String },
    #[error("failed to bootstrap the class loader")]
    Bootstrap(#[source] Box<LoadError>),
}

impl LoadError {
    pub(crate) fn from_search(class: &Arc<str>, err: SearchError) -> Self {
        match err {
            SearchError::NotFound(_) => LoadError::NotFound(Arc::clone(class)),
            err => LoadError::Io {
                class: Arc::clone(class),
                source: err,
            },
        }
    }

    pub(crate) fn parse(class: &Arc<str>, err: ParseError) -> Self {
        match err {
            ParseError::BadConstant(source) => LoadError::BadConstant {
                class: Arc::clone(class),
                source,
            },
            source => LoadError::Parse {
                class: Arc::clone(class),
                source,
            },
        }
    }

    pub(crate) fn bad_constant(class: &Arc<str>, source: ConstantPoolError) -> Self {
        LoadError::BadConstant {
            class: Arc::clone(class),
            source,
        }
    }

    pub(crate) fn descriptor(class: &Arc<str>, source: DescriptorError) -> Self {
        LoadError::InvalidDescriptor {
            class: Arc::clone(class),
            source,
        }
    }

    /// Name of the class the error is about. `None` for bootstrap failures.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            LoadError::NotFound(class)
            | LoadError::Parse { class, .. }
            | LoadError::FormatMismatch { class, .. }
            | LoadError::CircularDependency { class }
            | LoadError::Io { class, .. }
            | LoadError::InvalidDescriptor { class, .. }
            | LoadError::BadConstant { class, .. }
            | LoadError::InitializationFailed { class, .. } => Some(&**class),
            LoadError::NameMismatch { requested, .. } => Some(&**requested),
            LoadError::Bootstrap(_) => None,
        }
    }
}
