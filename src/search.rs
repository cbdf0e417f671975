use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::SearchParams;
use crate::error::KiraError;

pub const DEFAULT_SEARCHER: &str = "searcher";

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub queries: Utf8PathBuf,
    pub catalog: Utf8PathBuf,
    pub cache_catalog: Option<Utf8PathBuf>,
    pub params: SearchParams,
    pub output: Utf8PathBuf,
}

/// What the external searcher did. Exit status is advisory: a non-zero
/// code may mean "nothing matched" as well as a crash.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub program: String,
    pub launched: bool,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub output: Option<Utf8PathBuf>,
    pub stderr: String,
    pub elapsed_ms: u64,
}

pub trait SearchTool: Send + Sync {
    fn run(&self, request: &SearchRequest) -> Result<SearchReport, KiraError>;
    fn version(&self) -> Option<String>;
}

#[derive(Clone)]
pub struct SystemSearcher {
    program: Option<PathBuf>,
    name: String,
}

impl SystemSearcher {
    /// Uses `program` as given when it contains a path separator, otherwise
    /// looks it up on `PATH`.
    pub fn new(program: &str) -> Self {
        let candidate = Path::new(program);
        let resolved = if candidate.components().count() > 1 {
            candidate.exists().then(|| candidate.to_path_buf())
        } else {
            find_in_path(program)
        };
        Self {
            program: resolved,
            name: program.to_string(),
        }
    }

    pub fn args(request: &SearchRequest) -> Vec<String> {
        let mut args = vec![
            "--ksize".to_string(),
            request.params.ksize.to_string(),
            "--threshold".to_string(),
            request.params.threshold.to_string(),
            "--scaled".to_string(),
            request.params.scaled.to_string(),
            "--output".to_string(),
            request.output.to_string(),
        ];
        if let Some(cache) = &request.cache_catalog {
            args.push("--cache".to_string());
            args.push(cache.to_string());
        }
        args.push(request.queries.to_string());
        args.push(request.catalog.to_string());
        args
    }
}

impl SearchTool for SystemSearcher {
    fn run(&self, request: &SearchRequest) -> Result<SearchReport, KiraError> {
        let start = Instant::now();
        let Some(program) = &self.program else {
            warn!(program = %self.name, "searcher executable not found");
            let cause = KiraError::MissingTool(self.name.clone());
            return Ok(not_launched(self.name.clone(), &cause, start));
        };
        if let Err(err) = reset_output(&request.output) {
            warn!(output = %request.output, error = %err, "search output not usable");
            return Ok(not_launched(program.display().to_string(), &err, start));
        }

        let mut cmd = Command::new(program);
        cmd.args(Self::args(request));
        if let Some(threads) = request.params.threads {
            cmd.env("RAYON_NUM_THREADS", threads.to_string());
        }
        info!(program = %program.display(), catalog = %request.catalog, "dispatching search");

        let report = match cmd.output() {
            Ok(output) => SearchReport {
                program: program.display().to_string(),
                launched: true,
                exit_code: output.status.code(),
                success: output.status.success(),
                output: request
                    .output
                    .as_std_path()
                    .is_file()
                    .then(|| request.output.clone()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
            Err(err) => SearchReport {
                program: program.display().to_string(),
                launched: false,
                exit_code: None,
                success: false,
                output: None,
                stderr: err.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
        };
        if !report.success {
            warn!(exit_code = ?report.exit_code, "searcher did not exit cleanly");
        }
        Ok(report)
    }

    fn version(&self) -> Option<String> {
        self.program
            .as_ref()
            .and_then(|path| tool_version(path, &["--version"]))
    }
}

/// Ensures the output directory exists and no earlier results sit at `output`.
fn reset_output(output: &Utf8Path) -> Result<(), KiraError> {
    if let Some(parent) = output.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("create {parent}: {err}")))?;
        }
    }
    match fs::remove_file(output.as_std_path()) {
        Ok(()) => {
            debug!(output = %output, "removed previous search results");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(KiraError::Filesystem(format!("remove {output}: {err}"))),
    }
}

fn not_launched(program: String, cause: &KiraError, start: Instant) -> SearchReport {
    SearchReport {
        program,
        launched: false,
        exit_code: None,
        success: false,
        output: None,
        stderr: cause.to_string(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}
