#![forbid(unsafe_code)]

mod config;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, NamedSource};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use vigil_analyze::FeatureProfile;
use vigil_backend_c::{TranslateError, TranslationArtifact, Translator};
use vigil_bmc::{BmcDriver, CheckConfiguration, CheckFlags};

use crate::config::{load_config, ResolvedConfig, ESBMC_PATH_ENV};
use crate::report::{render_translation, render_verification, to_json, TranslateReport, VerifyReport};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Python analysis, bounded model checking and deadlock detection")]
struct Cli {
    /// Log at debug level (overridden by VIGIL_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Use this config file instead of searching for vigil.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Report the structural features of a Python file and the checks they call for
    Analyze {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Translate a Python file to C (writes converted_code.c)
    Translate {
        file: PathBuf,

        /// Directory for the generated artifact
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Run the model checker over a Python file (translated first) or a C file
    Verify {
        file: PathBuf,

        #[arg(long)]
        overflow: bool,
        #[arg(long)]
        bounds: bool,
        #[arg(long)]
        div_by_zero: bool,
        #[arg(long)]
        deadlock: bool,
        #[arg(long)]
        pointer: bool,
        #[arg(long)]
        memory_leak: bool,

        /// Also enable the checks the analyzer recommends (Python input only)
        #[arg(long)]
        recommended: bool,

        /// Initial loop unwinding bound
        #[arg(long)]
        unwind: Option<u32>,

        /// Checker timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to the esbmc binary (overrides ESBMC_PATH and vigil.toml)
        #[arg(long)]
        esbmc_path: Option<String>,

        /// Directory for the generated artifacts
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Run a program under a hard timeout and report a hang as a deadlock.
    /// A `.py` script also gets its threading locks instrumented.
    Monitor {
        program: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Seconds before the run is treated as deadlocked
        #[arg(long)]
        timeout: Option<f64>,

        /// Interpreter for `.py` scripts (overrides vigil.toml)
        #[arg(long)]
        python: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("VIGIL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Cmd::Analyze { file, json } => {
            let src = read_source(&file)?;
            let profile = analyze_with_source(&file, &src)?;
            if json {
                println!("{}", to_json(&profile)?);
            } else {
                print!("{profile}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Cmd::Translate { file, out_dir, json } => {
            let cfg = resolve_config(&file, cli.config.as_deref(), out_dir, None)?;
            let src = read_source(&file)?;
            let profile = analyze_with_source(&file, &src)?;
            let artifact = translate_with_source(&file, &src, &profile, &cfg)?;
            if json {
                let report = TranslateReport {
                    source: file.display().to_string(),
                    analysis: &profile,
                    translation: &artifact,
                };
                println!("{}", to_json(&report)?);
            } else {
                print!("{}", render_translation(&artifact));
            }
            Ok(ExitCode::SUCCESS)
        }

        Cmd::Verify {
            file,
            overflow,
            bounds,
            div_by_zero,
            deadlock,
            pointer,
            memory_leak,
            recommended,
            unwind,
            timeout,
            esbmc_path,
            out_dir,
            json,
        } => {
            let cfg = resolve_config(&file, cli.config.as_deref(), out_dir, esbmc_path)?;
            let src = read_source(&file)?;

            let requested = CheckFlags {
                overflow,
                bounds,
                div_by_zero,
                deadlock,
                pointer,
                memory_leak,
            };

            let is_c = file.extension().is_some_and(|e| e.eq_ignore_ascii_case("c"));
            let artifact = if is_c {
                if recommended {
                    warn!("--recommended needs Python input; using the requested checks only");
                }
                None
            } else {
                let profile = analyze_with_source(&file, &src)?;
                Some(translate_with_source(&file, &src, &profile, &cfg)?)
            };

            let flags = match (&artifact, recommended) {
                (Some(a), true) => merge_flags(requested, CheckFlags::from_recommended(&a.checks)),
                _ => requested,
            };
            let mut configuration = CheckConfiguration::new(flags);
            if let Some(n) = unwind {
                configuration = configuration.with_unwind(n);
            }
            if let Some(s) = timeout {
                configuration = configuration.with_timeout_secs(s);
            }
            debug!(%configuration, binary = %cfg.checker.binary, "verification requested");

            let mut driver = BmcDriver::esbmc(cfg.checker.clone());
            let outcome = match &artifact {
                Some(a) => driver.verify(a, configuration)?,
                None => driver.verify_c(&src, configuration)?,
            };

            if json {
                let report = VerifyReport {
                    source: file.display().to_string(),
                    translation: artifact.as_ref(),
                    verification: &outcome,
                };
                println!("{}", to_json(&report)?);
            } else {
                print!("{}", render_verification(&outcome));
            }
            Ok(if outcome.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Cmd::Monitor {
            program,
            args,
            timeout,
            python,
            json,
        } => {
            let cfg = resolve_config(Path::new("."), cli.config.as_deref(), None, None)?;
            let mut detector = cfg.detector;
            if let Some(secs) = timeout {
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(miette::miette!("--timeout must be a positive number of seconds"));
                }
                detector = detector.with_timeout(Duration::from_secs_f64(secs));
            }

            if let Some(interpreter) = python {
                detector = detector.with_python(interpreter);
            }

            let script = Path::new(&program);
            let report = if is_python_script(script) {
                debug!(script = %script.display(), python = %detector.python, "monitoring with instrumented locks");
                detector.monitor_python(script, &args)?
            } else {
                detector.monitor_process(&program, &args)?
            };
            if json {
                println!("{}", to_json(&report)?);
            } else {
                print!("{report}");
            }
            Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

/// Config file, then `ESBMC_PATH`, then command-line flags.
fn resolve_config(
    start: &Path,
    explicit: Option<&Path>,
    out_dir: Option<PathBuf>,
    esbmc_path: Option<String>,
) -> miette::Result<ResolvedConfig> {
    let mut cfg = load_config(start, explicit)?.with_esbmc_path(std::env::var(ESBMC_PATH_ENV).ok());
    if let Some(path) = &cfg.config_path {
        debug!(config = %path.display(), "loaded config");
    }
    cfg = cfg.with_esbmc_path(esbmc_path);
    if let Some(dir) = out_dir {
        cfg = cfg.with_output_dir(dir);
    }
    Ok(cfg)
}

fn read_source(path: &Path) -> miette::Result<String> {
    fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))
}

fn analyze_with_source(path: &Path, src: &str) -> miette::Result<FeatureProfile> {
    vigil_analyze::analyze(src).map_err(|e| {
        miette::Report::new(e).with_source_code(NamedSource::new(path.display().to_string(), src.to_string()))
    })
}

fn translate_with_source(
    path: &Path,
    src: &str,
    profile: &FeatureProfile,
    cfg: &ResolvedConfig,
) -> miette::Result<TranslationArtifact> {
    Translator::new(cfg.translator.clone())
        .translate(src, Some(profile))
        .map_err(|e| match e {
            TranslateError::Parse(p) => miette::Report::new(p)
                .with_source_code(NamedSource::new(path.display().to_string(), src.to_string())),
            other => miette::Report::new(other),
        })
}

fn is_python_script(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("py"))
}

fn merge_flags(a: CheckFlags, b: CheckFlags) -> CheckFlags {
    CheckFlags {
        overflow: a.overflow || b.overflow,
        bounds: a.bounds || b.bounds,
        div_by_zero: a.div_by_zero || b.div_by_zero,
        deadlock: a.deadlock || b.deadlock,
        pointer: a.pointer || b.pointer,
        memory_leak: a.memory_leak || b.memory_leak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn monitor_keeps_hyphenated_program_arguments() {
        let cli = Cli::try_parse_from(["vigil", "monitor", "--timeout", "2", "python3", "-c", "print(1)"]).unwrap();
        match cli.cmd {
            Cmd::Monitor { program, args, timeout, .. } => {
                assert_eq!(program, "python3");
                assert_eq!(args, vec!["-c", "print(1)"]);
                assert_eq!(timeout, Some(2.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn python_scripts_are_recognised_by_extension() {
        assert!(is_python_script(Path::new("workers.py")));
        assert!(is_python_script(Path::new("dir/Workers.PY")));
        assert!(!is_python_script(Path::new("python3")));
        assert!(!is_python_script(Path::new("sh")));
    }

    #[test]
    fn verify_flags_parse() {
        let cli = Cli::try_parse_from([
            "vigil", "verify", "prog.py", "--overflow", "--div-by-zero", "--unwind", "7", "--recommended",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Verify { overflow, div_by_zero, memory_leak, unwind, recommended, .. } => {
                assert!(overflow && div_by_zero && recommended);
                assert!(!memory_leak);
                assert_eq!(unwind, Some(7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn recommended_checks_merge_with_requested_ones() {
        let requested = CheckFlags {
            deadlock: true,
            ..CheckFlags::default()
        };
        let recommended = CheckFlags {
            overflow: true,
            ..CheckFlags::default()
        };
        let merged = merge_flags(requested, recommended);
        assert!(merged.deadlock && merged.overflow);
        assert!(!merged.memory_leak);
    }
}
