use nanamilang::builtinops::Kind;
use nanamilang::loader::PathLoader;
use nanamilang::spec::{Rule, Spec};
use nanamilang::{Descriptor, Error, Evaluator, ParseErrorKind, Registry, Value, reader};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Input ended inside an open form: keep reading lines
fn is_incomplete(source: &str) -> bool {
    matches!(
        reader::read_all(source),
        Err(Error::Parse(ref err)) if err.kind == ParseErrorKind::Incomplete
    )
}

fn run_repl() {
    println!("nanamilang");
    println!("Enter forms like: (+ 1 2) or (map :name [{{:name \"a\"}}])");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");

    // Register a custom function that can be called from user code for demonstration purposes
    let mut registry = Registry::standard();
    registry.install(
        Descriptor::function("exit")
            .form("(exit)")
            .doc("Leave the REPL")
            .spec(Spec::new().rule(Rule::ArityIs(0))),
        |_, _| {
            println!("Goodbye!");
            process::exit(0)
        },
    );
    let evaluator = Evaluator::new(registry).with_loader(PathLoader::from_env());

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { "nml> " } else { "...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match line {
                        ":help" => {
                            print_help(&evaluator);
                            continue;
                        }
                        ":env" => {
                            print_environment(&evaluator);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');
                if is_incomplete(&pending) {
                    continue;
                }
                let source = std::mem::take(&mut pending);
                let _ = rl.add_history_entry(source.trim());

                match evaluator.eval_each(&source) {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            match outcome {
                                Ok(result) => println!("{}", evaluator.report(&result)),
                                Err(e) => println!("Error: {e}"),
                            }
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                pending.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help(evaluator: &Evaluator) {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current module bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Cancel a pending form, or exit");
    println!();
    println!("Modules are searched for in $NANAMILANG_PATH (default: the working directory).");
    println!();

    for kind in [Kind::Macro, Kind::Function] {
        match kind {
            Kind::Macro => println!("Special forms:"),
            Kind::Function => println!("Functions:"),
        }
        for descriptor in evaluator.registry().descriptors() {
            if descriptor.kind != kind {
                continue;
            }
            let form = descriptor.forms.first().map_or(descriptor.name.as_str(), String::as_str);
            match &descriptor.docstring {
                Some(doc) => println!("  {form:<32} {doc}"),
                None => println!("  {form}"),
            }
        }
        println!();
    }
}

fn print_environment(evaluator: &Evaluator) {
    let bindings = evaluator.bindings();

    if bindings.is_empty() {
        println!("Module {} has no bindings.", evaluator.config().module_name);
        return;
    }

    println!(
        "Bindings of {} ({} total):",
        evaluator.config().module_name,
        bindings.len()
    );

    // Functions by name, other values with their contents
    let (functions, values): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Function(_)));

    if !functions.is_empty() {
        println!("Functions ({}):", functions.len());
        let mut col = 0;
        for (name, _) in functions {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {}", value.format());
        }
    }
}
