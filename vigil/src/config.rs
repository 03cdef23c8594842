#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use vigil_backend_c::TranslatorConfig;
use vigil_bmc::{CheckerConfig, DEFAULT_MAX_OUTPUT_LEN};
use vigil_deadlock::{DetectorConfig, DEFAULT_INTERPRETER};

pub const CONFIG_FILE_NAME: &str = "vigil.toml";
pub const ESBMC_PATH_ENV: &str = "ESBMC_PATH";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(vigil::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    checker: CheckerSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    detector: DetectorSection,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CheckerSection {
    binary: String,
    grace_secs: u64,
    max_output_len: usize,
}

impl Default for CheckerSection {
    fn default() -> Self {
        Self {
            binary: "esbmc".to_string(),
            grace_secs: 10,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputSection {
    dir: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self { dir: ".".to_string() }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DetectorSection {
    timeout_secs: f64,
    python: String,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            python: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

/// Settings after merging `vigil.toml` (if any) over the defaults.
#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub checker: CheckerConfig,
    pub translator: TranslatorConfig,
    pub detector: DetectorConfig,
}

impl ResolvedConfig {
    /// `ESBMC_PATH` replaces the configured checker binary when set and non-empty.
    pub fn with_esbmc_path(mut self, esbmc_path: Option<String>) -> Self {
        if let Some(path) = esbmc_path.filter(|p| !p.trim().is_empty()) {
            self.checker.binary = path;
        }
        self
    }

    /// Point both fixed-name artifacts at `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.translator = self.translator.with_output_dir(dir.clone());
        self.checker = self.checker.with_output_dir(dir);
        self
    }
}

/// Walk up from `start` looking for `vigil.toml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    // Relative inputs would otherwise stop the walk at the working directory.
    let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) if !p.as_os_str().is_empty() => cur = p.to_path_buf(),
            _ => return None,
        }
    }
}

/// Load `explicit` if given, otherwise the nearest `vigil.toml` above `start`.
/// Missing config is not an error; defaults apply.
pub fn load_config(start: &Path, explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(start),
    };
    let Some(path) = path else {
        return Ok(ResolvedConfig::default());
    };

    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let parsed: ConfigFile = toml::from_str(&raw).map_err(|e| ConfigError {
        message: format!("failed to parse {}: {e}", path.display()),
    })?;

    if !parsed.detector.timeout_secs.is_finite() || parsed.detector.timeout_secs <= 0.0 {
        return Err(ConfigError {
            message: format!(
                "{}: detector.timeout_secs must be a positive number",
                path.display()
            ),
        });
    }
    if parsed.detector.python.trim().is_empty() {
        return Err(ConfigError {
            message: format!("{}: detector.python must not be empty", path.display()),
        });
    }
    if parsed.checker.binary.trim().is_empty() {
        return Err(ConfigError {
            message: format!("{}: checker.binary must not be empty", path.display()),
        });
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let output_dir = resolve_path(base, &parsed.output.dir);

    let checker = CheckerConfig::default()
        .with_binary(parsed.checker.binary)
        .with_grace(Duration::from_secs(parsed.checker.grace_secs))
        .with_max_output_len(parsed.checker.max_output_len);
    let detector = DetectorConfig::default()
        .with_timeout(Duration::from_secs_f64(parsed.detector.timeout_secs))
        .with_python(parsed.detector.python);

    Ok(ResolvedConfig {
        config_path: Some(path),
        checker,
        translator: TranslatorConfig::default(),
        detector,
    }
    .with_output_dir(output_dir))
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() { pb } else { base.join(pb) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path(), None).unwrap();
        assert!(cfg.config_path.is_none());
        assert_eq!(cfg.checker.binary, "esbmc");
        assert_eq!(cfg.checker.max_output_len, DEFAULT_MAX_OUTPUT_LEN);
        assert_eq!(cfg.detector.timeout, Duration::from_secs(5));
        assert_eq!(cfg.translator.output_dir, PathBuf::from("."));
        assert_eq!(cfg.detector.python, "python3");
    }

    #[test]
    fn config_is_found_from_a_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[checker]\nbinary = \"/opt/esbmc/bin/esbmc\"\ngrace_secs = 3\n\n[output]\ndir = \"out\"\n\n[detector]\ntimeout_secs = 0.5\npython = \"python3.12\"\n",
        )
        .unwrap();
        let nested = dir.path().join("src").join("pkg");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("prog.py");
        fs::write(&file, "x = 1\n").unwrap();

        let cfg = load_config(&file, None).unwrap();
        assert_eq!(cfg.config_path, Some(dir.path().join(CONFIG_FILE_NAME)));
        assert_eq!(cfg.checker.binary, "/opt/esbmc/bin/esbmc");
        assert_eq!(cfg.checker.grace, Duration::from_secs(3));
        assert_eq!(cfg.checker.output_dir, dir.path().join("out"));
        assert_eq!(cfg.translator.output_dir, dir.path().join("out"));
        assert_eq!(cfg.detector.timeout, Duration::from_millis(500));
        assert_eq!(cfg.detector.python, "python3.12");
    }

    #[test]
    fn environment_overrides_file_and_flags_override_both() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[checker]\nbinary = \"from-file\"\n").unwrap();

        let cfg = load_config(dir.path(), Some(&path)).unwrap();
        assert_eq!(cfg.checker.binary, "from-file");
        let cfg = cfg.with_esbmc_path(Some("from-env".to_string()));
        assert_eq!(cfg.checker.binary, "from-env");
        let cfg = cfg.with_esbmc_path(Some("  ".to_string()));
        assert_eq!(cfg.checker.binary, "from-env");
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&path, "[checker]\nbinnary = \"esbmc\"\n").unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert!(err.message.contains("failed to parse"));

        fs::write(&path, "[detector]\ntimeout_secs = -1.0\n").unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert!(err.message.contains("timeout_secs"));
    }
}
