//! Status command resolution and execution.
//!
//! Resolution and execution are separate steps: a [`CommandSpec`] is
//! resolved once against a search path into a [`ResolvedCommand`], which
//! can then be run any number of times.

use super::PfError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Arguments that make pfctl print its info/counters report.
pub const INFO_ARGS: &[&str] = &["-s", "info"];

/// What to run, before any path lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path of the status command.
    pub program: String,
    pub args: Vec<String>,
    /// Wrap the command in a privilege-elevation program.
    pub elevate: bool,
    /// Program name or path of the elevation wrapper.
    pub elevate_with: String,
}

/// Fully resolved invocation: absolute executable plus final argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Short name used in error messages.
    pub name: String,
}

impl CommandSpec {
    /// Resolve against `$PATH`.
    pub fn resolve(&self) -> Result<ResolvedCommand, PfError> {
        let path = std::env::var_os("PATH").unwrap_or_default();
        self.resolve_in(&path)
    }

    /// Resolve against an explicit search path (same syntax as `$PATH`).
    ///
    /// With `elevate`, the result is `<wrapper> <command> <args...>`, both
    /// programs looked up the same way.
    pub fn resolve_in(&self, search_path: &OsStr) -> Result<ResolvedCommand, PfError> {
        let command = look_path(&self.program, search_path).ok_or_else(|| PfError::NotFound {
            program: self.program.clone(),
        })?;

        if !self.elevate {
            return Ok(ResolvedCommand {
                executable: command,
                args: self.args.clone(),
                name: self.program.clone(),
            });
        }

        let wrapper =
            look_path(&self.elevate_with, search_path).ok_or_else(|| PfError::NotFound {
                program: self.elevate_with.clone(),
            })?;
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(command.to_string_lossy().into_owned());
        args.extend(self.args.iter().cloned());
        Ok(ResolvedCommand {
            executable: wrapper,
            args,
            name: self.program.clone(),
        })
    }
}

impl ResolvedCommand {
    /// Run the command to completion and return its stdout.
    ///
    /// Blocks until the process exits. A non-zero exit is an error carrying
    /// the exit status and whatever the process wrote to stderr.
    pub fn run(&self) -> Result<String, PfError> {
        tracing::debug!(
            executable = %self.executable.display(),
            args = ?self.args,
            "running status command"
        );
        let output = Command::new(&self.executable)
            .args(&self.args)
            .output()
            .map_err(|e| PfError::Spawn {
                command: self.name.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PfError::Failed {
                command: self.name.clone(),
                status: output.status,
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Find `program` the way a shell would: names containing a path separator
/// are used as-is, bare names are searched in each directory of `search_path`.
fn look_path(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    std::env::split_paths(search_path)
        .map(|dir| {
            if dir.as_os_str().is_empty() {
                PathBuf::from(".").join(program)
            } else {
                dir.join(program)
            }
        })
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}


#[cfg(all(test, unix))]
mod tests {
    use super::testutil::{search_path_of, write_script};
    use super::*;
    use tempfile::TempDir;

    fn spec(elevate: bool) -> CommandSpec {
        CommandSpec {
            program: "pfctl".to_string(),
            args: INFO_ARGS.iter().map(|s| s.to_string()).collect(),
            elevate,
            elevate_with: "sudo".to_string(),
        }
    }

    #[test]
    fn resolve_finds_program_on_search_path() {
        let dir = TempDir::new().unwrap();
        let pfctl = write_script(dir.path(), "pfctl", "exit 0");
        let resolved = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        assert_eq!(resolved.executable, pfctl);
        assert_eq!(resolved.args, vec!["-s", "info"]);
        assert_eq!(resolved.name, "pfctl");
    }

    #[test]
    fn resolve_prefers_earlier_directory() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let expected = write_script(first.path(), "pfctl", "exit 0");
        write_script(second.path(), "pfctl", "exit 0");
        let resolved = spec(false)
            .resolve_in(&search_path_of([first.path(), second.path()]))
            .unwrap();
        assert_eq!(resolved.executable, expected);
    }

    #[test]
    fn resolve_missing_program_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap_err();
        assert!(matches!(err, PfError::NotFound { ref program } if program == "pfctl"));
    }

    #[test]
    fn resolve_skips_non_executable_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pfctl"), "not a program").unwrap();
        let err = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap_err();
        assert!(matches!(err, PfError::NotFound { .. }));
    }

    #[test]
    fn resolve_with_elevation_prepends_wrapper() {
        let dir = TempDir::new().unwrap();
        let pfctl = write_script(dir.path(), "pfctl", "exit 0");
        let sudo = write_script(dir.path(), "sudo", "exec \"$@\"");
        let resolved = spec(true)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        assert_eq!(resolved.executable, sudo);
        assert_eq!(
            resolved.args,
            vec![pfctl.to_string_lossy().into_owned(), "-s".into(), "info".into()]
        );
    }

    #[test]
    fn resolve_with_elevation_missing_wrapper_is_not_found() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "pfctl", "exit 0");
        let err = spec(true)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap_err();
        assert!(matches!(err, PfError::NotFound { ref program } if program == "sudo"));
    }

    #[test]
    fn resolve_accepts_explicit_path() {
        let dir = TempDir::new().unwrap();
        let pfctl = write_script(dir.path(), "pfctl", "exit 0");
        let mut s = spec(false);
        s.program = pfctl.to_string_lossy().into_owned();
        let resolved = s.resolve_in(OsStr::new("")).unwrap();
        assert_eq!(resolved.executable, pfctl);
    }

    #[test]
    fn run_captures_stdout() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "pfctl", "echo \"args: $*\"");
        let resolved = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        assert_eq!(resolved.run().unwrap(), "args: -s info\n");
    }

    #[test]
    fn run_through_wrapper_passes_command_and_args() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "pfctl", "echo \"pfctl $*\"");
        write_script(dir.path(), "sudo", "exec \"$@\"");
        let resolved = spec(true)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        assert_eq!(resolved.run().unwrap(), "pfctl -s info\n");
    }

    #[test]
    fn run_nonzero_exit_reports_status_and_stderr() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "pfctl",
            "echo 'pfctl: /dev/pf: Permission denied' >&2\nexit 1",
        );
        let resolved = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        let err = resolved.run().unwrap_err();
        match &err {
            PfError::Failed {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "pfctl");
                assert_eq!(status.code(), Some(1));
                assert_eq!(stderr, "pfctl: /dev/pf: Permission denied");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("pfctl"));
        assert!(msg.contains("Permission denied"));
    }

    #[test]
    fn run_nonzero_exit_without_stderr_says_so() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "pfctl", "exit 3");
        let resolved = spec(false)
            .resolve_in(&search_path_of([dir.path()]))
            .unwrap();
        let msg = resolved.run().unwrap_err().to_string();
        assert!(msg.contains("no stderr output"), "{msg}");
    }
}
