use std::{error::Error, ffi::OsString, process, sync::Arc};

use clap::Parser;
use jvm::{
    ClassLoader, LoadError, LoaderConfig, RuntimeClass,
    search::{ClassPath, RootKind},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "java", about = "Load and link classes from a class path")]
struct Cli {
    /// Bootstrap class path, searched first (defaults to $JVM_BOOTCLASSPATH)
    #[arg(long, value_name = "PATHS")]
    bootclasspath: Option<OsString>,
    /// Extension directories (defaults to $JVM_EXTDIRS)
    #[arg(long, value_name = "PATHS")]
    extdirs: Option<OsString>,
    /// User class path (defaults to $CLASSPATH)
    #[arg(short = 'c', long, value_name = "PATHS")]
    classpath: Option<OsString>,
    /// Run static initializers of the named classes
    #[arg(long)]
    init: bool,
    /// Classes to load, as internal (`java/lang/String`) or binary (`java.lang.String`) names
    #[arg(value_name = "CLASS", required = true)]
    classes: Vec<String>,
}

impl Cli {
    fn class_path(&self) -> ClassPath {
        let from_env = ClassPath::from_env();
        let mut class_path = ClassPath::new();
        for (kind, paths) in [
            (RootKind::Bootstrap, &self.bootclasspath),
            (RootKind::Extension, &self.extdirs),
            (RootKind::User, &self.classpath),
        ] {
            match paths {
                Some(paths) => class_path.push_search_path(kind, paths),
                None => {
                    for root in from_env.roots().iter().filter(|root| root.kind == kind) {
                        class_path.push(kind, root.path.clone());
                    }
                }
            }
        }
        class_path
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = LoaderConfig::default().with_class_path(cli.class_path());

    let loader = match ClassLoader::new(config) {
        Ok(loader) => loader,
        Err(err) => {
            eprintln!("Error: {}", error_chain(&err));
            process::exit(1);
        }
    };

    let mut failed = false;
    for name in &cli.classes {
        match load(&loader, name, cli.init) {
            Ok(class) => print_summary(&class),
            Err(err) => {
                eprintln!("Error: {}", error_chain(&err));
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

fn load(loader: &ClassLoader, name: &str, init: bool) -> Result<Arc<RuntimeClass>, LoadError> {
    let class_object = loader.for_name(&name.replace('/', "."), init)?;
    Ok(Arc::clone(class_object.entity()))
}

fn print_summary(class: &RuntimeClass) {
    println!("{} ({:?})", class.binary_name(), class.access_flags());
    if let Some(super_class) = class.super_class() {
        println!("  extends {}", super_class.binary_name());
    }
    for interface in class.interfaces() {
        println!("  implements {}", interface.binary_name());
    }
    println!(
        "  version {}.{}, state {:?}",
        class.major_version(),
        class.minor_version(),
        class.state()
    );
    println!(
        "  {} instance slots, {} static fields",
        class.instance_slot_count(),
        class.static_field_count()
    );
    for field in class.fields() {
        let storage = if field.is_static() { "static" } else { "instance" };
        println!(
            "  field {} {} ({storage} slot {})",
            field.name(),
            field.descriptor().0,
            field.slot()
        );
    }
    for method in class.methods() {
        let code_length = method.code().map_or(0, |code| code.code.len());
        println!(
            "  method {}{} ({code_length} bytes of code)",
            method.name(),
            method.descriptor()
        );
    }
}

fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
