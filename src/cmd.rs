use std::{
    io::{self, Read},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
};

use crate::{
    error::InstallerError,
    report::{Level, Reporter},
};

/// Forces package managers (apt/debconf) to never prompt.
const NONINTERACTIVE_ENV: [(&str, &str); 2] = [
    ("DEBIAN_FRONTEND", "noninteractive"),
    ("DEBCONF_NONINTERACTIVE_SEEN", "true"),
];

/// One side of a two-process pipe: program plus arguments.
pub type Cmd<'a> = (&'a str, &'a [&'a str]);

/// The subprocess surface every step goes through.
pub trait Exec {
    /// Runs `program` and returns its trimmed combined output.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, InstallerError>;

    /// Same as [`Exec::run`] with `dir` as working directory.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, InstallerError>;

    /// Runs `first | second`. Succeeds only if both exit zero.
    fn pipe(&self, first: Cmd<'_>, second: Cmd<'_>) -> Result<(), InstallerError>;
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn base_command(program: &str, args: &[&str]) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(NONINTERACTIVE_ENV.iter().copied())
        .stdin(Stdio::null());
    command
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Spawns `command` with stdout and stderr sharing one pipe and reads it to
/// EOF, so the output keeps the order in which the child wrote it.
fn combined_output(mut command: Command) -> io::Result<(Vec<u8>, ExitStatus)> {
    let (reader, writer) = io::pipe()?;
    command.stdout(writer.try_clone()?).stderr(writer);
    let child = command.spawn()?;
    // The builder still owns the parent's write ends; EOF never arrives
    // while they are open.
    drop(command);
    wait_combined(child, reader)
}

fn wait_combined(mut child: Child, mut reader: io::PipeReader) -> io::Result<(Vec<u8>, ExitStatus)> {
    let mut buf = Vec::new();
    let read = reader.read_to_end(&mut buf);
    let status = child.wait()?;
    read?;
    Ok((buf, status))
}

fn join_stage<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe stage thread panicked")))
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// Runs real subprocesses and mirrors each one into the run log.
pub struct CommandExecutor<'r> {
    report: &'r Reporter,
}

impl<'r> CommandExecutor<'r> {
    pub fn new(report: &'r Reporter) -> Self {
        CommandExecutor { report }
    }

    fn execute(
        &self,
        dir: Option<&Path>,
        program: &str,
        args: &[&str],
    ) -> Result<String, InstallerError> {
        let line = command_line(program, args);
        let (announce, located) = match dir {
            Some(d) => (
                format!("Running in {}: {}", d.display(), line),
                format!("{} (in {})", line, d.display()),
            ),
            None => (format!("Running: {}", line), line.clone()),
        };
        self.report.update_status(&announce);
        self.report.record(Level::Cmd, &announce);

        let mut command = base_command(program, args);
        if let Some(d) = dir {
            command.current_dir(d);
        }

        let (raw, status) = match combined_output(command) {
            Ok(done) => done,
            Err(e) => {
                let err = not_found_or_io(program, e);
                self.report.record(Level::CmdError, &format!("Command could not start: {}", err));
                self.report.record(Level::CmdError, &format!("Command: {}", located));
                return Err(err);
            }
        };

        let output = trimmed(&raw);
        if !output.is_empty() {
            self.report.record(Level::CmdOutput, &output);
        }

        if !status.success() {
            self.report.record(
                Level::CmdError,
                &format!("Command failed with exit code: {}", status),
            );
            self.report.record(Level::CmdError, &format!("Command: {}", located));
            if !output.is_empty() {
                self.report
                    .record(Level::CmdError, &format!("Full error output: {}", output));
            }
            return Err(InstallerError::CommandFailed {
                command: line,
                status: status.to_string(),
                output,
            });
        }

        self.report
            .record(Level::CmdSuccess, "Command completed successfully");
        Ok(output)
    }

    /// Both children are always waited on, whatever happens to the other.
    fn execute_pipe(&self, first: Cmd<'_>, second: Cmd<'_>) -> Result<String, InstallerError> {
        let (reader, writer) = io::pipe()?;
        let writer_err = writer.try_clone()?;

        let mut upstream = base_command(first.0, first.1)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found_or_io(first.0, e))?;

        let Some(feed) = upstream.stdout.take() else {
            let _ = upstream.kill();
            let _ = upstream.wait();
            return Err(io::Error::other("upstream stdout was not captured").into());
        };

        let mut downstream_cmd = base_command(second.0, second.1);
        downstream_cmd
            .stdin(Stdio::from(feed))
            .stdout(writer)
            .stderr(writer_err);
        let spawned = downstream_cmd.spawn();
        // Drops our copy of the upstream read end and of the output writers.
        drop(downstream_cmd);

        let downstream = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = upstream.wait_with_output();
                return Err(not_found_or_io(second.0, e));
            }
        };

        let (up, down) = thread::scope(|s| {
            let up = s.spawn(move || upstream.wait_with_output());
            let down = s.spawn(move || wait_combined(downstream, reader));
            (join_stage(up), join_stage(down))
        });

        let up = up?;
        let (down_raw, down_status) = down?;

        let up_stderr = trimmed(&up.stderr);
        let down_output = trimmed(&down_raw);

        if !up.status.success() {
            return Err(InstallerError::PipeFailed {
                stage: "first",
                command: command_line(first.0, first.1),
                status: up.status.to_string(),
                output: up_stderr,
            });
        }
        if !down_status.success() {
            return Err(InstallerError::PipeFailed {
                stage: "second",
                command: command_line(second.0, second.1),
                status: down_status.to_string(),
                output: down_output,
            });
        }

        Ok([up_stderr, down_output]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl Exec for CommandExecutor<'_> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, InstallerError> {
        self.execute(None, program, args)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, InstallerError> {
        self.execute(Some(dir), program, args)
    }

    fn pipe(&self, first: Cmd<'_>, second: Cmd<'_>) -> Result<(), InstallerError> {
        let line = format!(
            "{} | {}",
            command_line(first.0, first.1),
            command_line(second.0, second.1)
        );
        let announce = format!("Running: {}", line);
        self.report.update_status(&announce);
        self.report.record(Level::Cmd, &announce);

        match self.execute_pipe(first, second) {
            Ok(output) => {
                if !output.is_empty() {
                    self.report.record(Level::CmdOutput, &output);
                }
                self.report
                    .record(Level::CmdSuccess, "Command completed successfully");
                Ok(())
            }
            Err(e) => {
                self.report.record(Level::CmdError, &format!("Pipe failed: {}", e));
                self.report.record(Level::CmdError, &format!("Command: {}", line));
                Err(e)
            }
        }
    }
}

// ── Test double ───────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Records every command line instead of running it.
    ///
    /// `run_in` lines are prefixed with `[<dir>] `; pipes are recorded as
    /// `a | b`. A rule matches when the recorded line starts with its prefix.
    #[derive(Default)]
    pub(crate) struct RecordingExec {
        pub calls: RefCell<Vec<String>>,
        failures: Vec<(String, String)>,
        replies: Vec<(String, String)>,
    }

    impl RecordingExec {
        pub fn fail_on(mut self, prefix: &str, output: &str) -> Self {
            self.failures.push((prefix.to_string(), output.to_string()));
            self
        }

        pub fn reply(mut self, prefix: &str, output: &str) -> Self {
            self.replies.push((prefix.to_string(), output.to_string()));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, line: String) -> Result<String, InstallerError> {
            self.calls.borrow_mut().push(line.clone());
            if let Some((_, output)) = self.failures.iter().find(|(p, _)| line.starts_with(p)) {
                return Err(InstallerError::CommandFailed {
                    command: line,
                    status: "exit status: 100".to_string(),
                    output: output.clone(),
                });
            }
            Ok(self
                .replies
                .iter()
                .find(|(p, _)| line.starts_with(p))
                .map(|(_, out)| out.clone())
                .unwrap_or_default())
        }
    }

    impl Exec for RecordingExec {
        fn run(&self, program: &str, args: &[&str]) -> Result<String, InstallerError> {
            self.record(command_line(program, args))
        }

        fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, InstallerError> {
            self.record(format!("[{}] {}", dir.display(), command_line(program, args)))
        }

        fn pipe(&self, first: Cmd<'_>, second: Cmd<'_>) -> Result<(), InstallerError> {
            self.record(format!(
                "{} | {}",
                command_line(first.0, first.1),
                command_line(second.0, second.1)
            ))
            .map(|_| ())
        }
    }
}
