use classverify::jvm;
use classverify::jvm::class_file::ClassFile;
use classverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use classverify::jvm::code::decode_method_body;
use classverify::jvm::verifier::{verify_method, MethodSignature, Settings, Verdict};
use classverify::jvm::Name;

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use std::process;

/// Worst outcome seen so far (also the exit status)
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Status {
    Verified = 0,
    Rejected = 1,
    Internal = 2,
}

fn main() {
    env_logger::init();

    let matches = Command::new("JVM method verifier")
        .version(clap::crate_version!())
        .about("Run data-flow verification on the methods of JVM class files")
        .arg(
            Arg::new("classpath")
                .long("classpath")
                .value_name("DIR")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Directory to search for referenced classes (may be repeated)"),
        )
        .arg(
            Arg::new("method")
                .long("method")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Only verify methods with this name (may be repeated)"),
        )
        .arg(
            Arg::new("lenient")
                .long("lenient")
                .action(ArgAction::SetTrue)
                .help("Treat classes missing from the class path as direct subclasses of Object"),
        )
        .arg(
            Arg::new("allow-protected-subroutines")
                .long("allow-protected-subroutines")
                .action(ArgAction::SetTrue)
                .help("Accept subroutines covered by exception handlers"),
        )
        .arg(
            Arg::new("no-return-warnings")
                .long("no-return-warnings")
                .action(ArgAction::SetTrue)
                .help("Don't warn about uninitialized objects left behind at returns"),
        )
        .arg(
            Arg::new("CLASS_FILE")
                .help("Class files to verify")
                .required(true)
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let settings = Settings {
        forbid_protected_subroutines: !matches.get_flag("allow-protected-subroutines"),
        warn_uninitialized_at_return: !matches.get_flag("no-return-warnings"),
        ..Settings::default()
    };
    let methods: Vec<String> = matches
        .get_many::<String>("method")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();

    let class_graph_arenas = ClassGraphArenas::new();
    let mut class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.assume_missing_classes = matches.get_flag("lenient");
    if let Some(directories) = matches.get_many::<PathBuf>("classpath") {
        for directory in directories {
            class_graph.class_path.push(directory);
        }
    }
    class_graph.insert_java_library_types();

    let mut status = Status::Verified;
    for path in matches.get_many::<PathBuf>("CLASS_FILE").into_iter().flatten() {
        log::info!("Verifying '{}'", path.display());
        let file_status = match verify_class_file(path, &class_graph, &settings, &methods) {
            Ok(file_status) => file_status,
            Err(err) => {
                println!("{}: INTERNAL ERROR: {}", path.display(), err);
                Status::Internal
            }
        };
        status = status.max(file_status);
    }

    process::exit(status as i32);
}

/// Verify the selected methods of one class file, printing a verdict for each
fn verify_class_file(
    path: &Path,
    class_graph: &ClassGraph,
    settings: &Settings,
    methods: &[String],
) -> Result<Status, jvm::Error> {
    let class_file = ClassFile::read_from_path(path)?;
    let class_name = class_file.this_class_name()?;
    class_graph.add_class_file(&class_file)?;

    let mut status = Status::Verified;
    for method in &class_file.methods {
        let name = method.name(&class_file.constants)?;
        if !methods.is_empty() && !methods.iter().any(|selected| selected == name.as_str()) {
            continue;
        }
        let signature = MethodSignature {
            class: class_name.clone(),
            name,
            descriptor: method.descriptor(&class_file.constants)?,
            is_static: method.is_static(),
        };

        let code = match method.code(&class_file.constants)? {
            Some(code) => code,
            None => {
                log::info!("Skipping {}, which has no code", signature);
                continue;
            }
        };
        let verdict = match decode_method_body(&code, &class_file.constants) {
            Ok(body) => verify_method(&signature, &body, class_graph, settings),
            Err(err) => Verdict::Rejected(err.to_string()),
        };

        println!("{}: {}", signature, verdict);
        let method_status = match &verdict {
            Verdict::Verified(verified) => {
                for advisory in verified.advisories() {
                    println!("  warning: {}", advisory);
                }
                Status::Verified
            }
            Verdict::Rejected(_) => Status::Rejected,
            Verdict::InternalError(_) => Status::Internal,
        };
        status = status.max(method_status);
    }
    Ok(status)
}
