use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use javelin_core::{
    CompileOptions, Executable, RunOutcome, Scheduler, SchedulerConfig, SourceFile, StdoutSink, compile,
    compile_workspace, modules_from_sources,
};
use tracing_subscriber::EnvFilter;

/// Command-line driver for the Javelin toolchain.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file or workspace directory; standard input when omitted.
    #[arg(short, long)]
    input: Option<String>,

    /// Where to write the emitted text; standard output when omitted.
    #[arg(short, long)]
    output: Option<String>,

    #[arg(long, value_enum, value_name = "FORMAT", help = "Dump an intermediate form")]
    emit: Option<Emit>,

    #[arg(long, help = "Run the selected main program to completion")]
    run: bool,

    #[arg(long, value_name = "RATE", help = "Throttle every thread to this many steps per second")]
    steps_per_second: Option<f64>,

    #[arg(long, value_name = "N", default_value_t = 50_000_000, help = "Stop a run after this many steps")]
    max_steps: u64,

    #[arg(long, help = "Log pipeline and scheduler events to stderr")]
    trace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Steps,
    Diagnostics,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.trace);
    execute(cli)
}

fn init_tracing(trace: bool) {
    let default = if trace { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let exe = load(cli.input.as_deref())?;
    tracing::debug!(
        modules = exe.modules.len(),
        programs = exe.programs.len(),
        main = ?exe.main.map(|m| m.module),
        "compiled input"
    );

    if let Some(emit) = cli.emit {
        let text = render(&exe, emit);
        write_output(cli.output.as_deref(), &text)?;
    }

    let errors: Vec<String> = exe
        .all_diagnostics()
        .into_iter()
        .filter(|(_, d)| d.is_error())
        .map(|(module, d)| format!("{}{d}", location(&exe, module)))
        .collect();
    if !errors.is_empty() && cli.emit != Some(Emit::Diagnostics) {
        for error in &errors {
            eprintln!("{error}");
        }
    }

    if cli.run {
        if !errors.is_empty() {
            bail!("compilation failed with {} error(s)", errors.len());
        }
        run(exe, &cli)?;
    }
    Ok(())
}

fn load(input: Option<&str>) -> Result<Executable> {
    let options = CompileOptions::default();
    match input {
        Some(path) if Path::new(path).is_dir() => {
            compile_workspace(path, &options).with_context(|| format!("failed to load workspace {path}"))
        }
        Some(path) => {
            let source = fs::read_to_string(path).with_context(|| format!("failed to read input file {path}"))?;
            let name = Path::new(path)
                .file_name()
                .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned());
            Ok(compile(modules_from_sources(vec![SourceFile::new(name, source)]), &options))
        }
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("failed to read standard input")?;
            Ok(compile(modules_from_sources(vec![SourceFile::new("Main.java", source)]), &options))
        }
    }
}

fn location(exe: &Executable, module: Option<javelin_core::ModuleId>) -> String {
    module
        .and_then(|m| exe.module(m))
        .map_or_else(String::new, |m| format!("{}: ", m.path))
}

fn render(exe: &Executable, emit: Emit) -> String {
    let mut out = String::new();
    match emit {
        Emit::Tokens => {
            for module in &exe.modules {
                out.push_str(&format!("== {}\n", module.path));
                for token in &module.tokens {
                    out.push_str(&format!("{} {:?} {:?}\n", token.range, token.kind, token.text));
                }
            }
        }
        Emit::Ast => {
            for module in &exe.modules {
                out.push_str(&format!("== {}\n", module.path));
                if let Some(root) = module.ast.root() {
                    out.push_str(&module.ast.dump(root));
                }
            }
        }
        Emit::Steps => {
            for (_, program) in exe.programs.iter() {
                out.push_str(&program.dump());
            }
        }
        Emit::Diagnostics => {
            for (module, diagnostic) in exe.all_diagnostics() {
                out.push_str(&format!("{}{diagnostic}\n", location(exe, module)));
            }
        }
    }
    out
}

fn run(exe: Executable, cli: &Cli) -> Result<()> {
    let config = SchedulerConfig {
        default_max_steps_per_second: cli.steps_per_second,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(exe, Box::new(StdoutSink), config);
    scheduler.start_main().context("nothing to run")?;

    let mut stdin = io::stdin().lock();
    let mut used = 0;
    loop {
        let summary = scheduler.run_to_completion(cli.max_steps.saturating_sub(used))?;
        used += summary.steps;
        match summary.outcome {
            RunOutcome::Finished => break,
            RunOutcome::StepCapReached => bail!("program did not finish within {} steps", cli.max_steps),
            RunOutcome::Paused(at) => bail!("program paused unexpectedly at {}", at.range),
            RunOutcome::WaitingForInput => {
                let mut line = String::new();
                let read = stdin.read_line(&mut line).context("failed to read program input")?;
                if read == 0 {
                    bail!("program is waiting for input but standard input is closed");
                }
                scheduler.provide_input(line.trim_end_matches(['\r', '\n']))?;
            }
        }
    }
    io::stdout().flush().ok();

    if let Some(exception) = scheduler.main_exception() {
        bail!("main thread terminated with {}", exception.class_name);
    }
    Ok(())
}

fn write_output(path: Option<&str>, text: &str) -> Result<()> {
    let Some(path) = path else {
        print!("{text}");
        return Ok(());
    };
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, text).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    const HELLO: &str = "public class Main {\n  public static void main(String[] args) {\n    System.out.println(\"hello \" + (40 + 2));\n  }\n}\n";

    fn cli() -> Command {
        Command::cargo_bin("javelin-cli").expect("binary exists")
    }

    #[test]
    fn runs_a_file() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(&input, HELLO).expect("write input");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--run")
            .assert()
            .success()
            .stdout(predicate::eq("hello 42\n"));
    }

    #[test]
    fn runs_a_workspace_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("Main.java"),
            "public class Main { public static void main(String[] args) { System.out.println(Util.twice(4)); } }",
        )
        .expect("write main");
        fs::create_dir(dir.path().join("lib")).expect("mkdir");
        fs::write(
            dir.path().join("lib/Util.java"),
            "class Util { static int twice(int x) { return 2 * x; } }",
        )
        .expect("write util");

        cli()
            .arg("--input")
            .arg(dir.path())
            .arg("--run")
            .assert()
            .success()
            .stdout(predicate::eq("8\n"));
    }

    #[test]
    fn feeds_standard_input_to_the_program() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main { public static void main(String[] args) { String name = Input.readLine(); System.out.println(\"hi \" + name); } }",
        )
        .expect("write input");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--run")
            .write_stdin("ada\n")
            .assert()
            .success()
            .stdout(predicate::eq("hi ada\n"));
    }

    #[test]
    fn emits_steps_to_a_file() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(&input, HELLO).expect("write input");
        let output = dir.path().join("out/steps.txt");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--emit")
            .arg("steps")
            .assert()
            .success();

        let steps = fs::read_to_string(&output).expect("read steps");
        assert!(steps.contains("program "));
    }

    #[test]
    fn emits_tokens_from_standard_input() {
        cli()
            .arg("--emit")
            .arg("tokens")
            .write_stdin("int x = 1;")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"int\"").and(predicate::str::contains("\"x\"")));
    }

    #[test]
    fn reports_compile_errors() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main { public static void main(String[] args) { int x = \"text\"; } }",
        )
        .expect("write input");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Main.java: error").and(predicate::str::contains("compilation failed")));
    }

    #[test]
    fn uncaught_exception_fails_the_run() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main { public static void main(String[] args) { int z = 0; System.out.println(1 / z); } }",
        )
        .expect("write input");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--run")
            .assert()
            .failure()
            .stdout(predicate::str::contains("ArithmeticException: / by zero"))
            .stderr(predicate::str::contains("main thread terminated with ArithmeticException"));
    }

    #[test]
    fn execute_writes_diagnostics_without_spawning_the_binary() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main {\n  static int f(int x) { if (x > 0) return 1; }\n  public static void main(String[] args) { }\n}\n",
        )
        .expect("write input");
        let output = dir.path().join("diagnostics.txt");

        let cli = Cli::try_parse_from([
            "javelin-cli",
            "--input",
            input.to_str().expect("utf-8 path"),
            "--emit",
            "diagnostics",
            "--output",
            output.to_str().expect("utf-8 path"),
        ])
        .expect("arguments parse");
        execute(cli).expect("emitting succeeds");

        let text = fs::read_to_string(&output).expect("read diagnostics");
        assert!(text.contains("Main.java: "), "{text}");
        assert!(text.contains("missing return statement"), "{text}");
    }

    #[test]
    fn execute_refuses_to_run_with_errors() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main { public static void main(String[] args) { int x = \"text\"; } }",
        )
        .expect("write input");

        let cli = Cli::try_parse_from(["javelin-cli", "--input", input.to_str().expect("utf-8 path"), "--run"])
        .expect("arguments parse");
        let err = execute(cli).expect_err("compile errors stop the run");
        assert!(err.to_string().contains("compilation failed"), "{err}");
    }

    #[test]
    fn step_cap_stops_runaway_programs() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("Main.java");
        fs::write(
            &input,
            "public class Main { public static void main(String[] args) { while (true) { } } }",
        )
        .expect("write input");

        cli()
            .arg("--input")
            .arg(&input)
            .arg("--run")
            .arg("--max-steps")
            .arg("1000")
            .assert()
            .failure()
            .stderr(predicate::str::contains("did not finish within 1000 steps"));
    }
}
