// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! Executes a `Submission` inside a hardened, single-use Docker container (spec.md §4.1).
//!
//! One container per phase: an optional compile phase, then a run phase. Every container is
//! created, attached, started, waited on (racing a wall-clock timeout), and removed — there is
//! no container cache or reuse here, unlike the teacher's `docker.rs`, because a sandbox is
//! one-shot and untrusted by construction: reusing a container across submissions would leak
//! state between them.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, LogOutput, RemoveContainerOptions, StatsOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::ContainerWaitResponse;
use bollard::service::HostConfig;
use bollard::Docker;
use domain::{ExecutionResult, ExecutionStatus, Submission};
use futures::StreamExt;
use runtime_config::CompiledProfile;

mod sanitize;

pub use sanitize::sanitize_output;

const SANDBOX_MOUNT_POINT: &str = "/sandbox";
const SANDBOX_STDIN_FILE: &str = "stdin.txt";
/// Docker reserves exit code 137 (128 + SIGKILL) for OOM kills and manual `kill -9`, but we
/// confirm via `inspect_container`'s `oom_killed` flag rather than trust the bare exit code.
const SANDBOX_PIDS_LIMIT: i64 = 64;
/// One vCPU. The spec doesn't expose a per-language CPU knob, so every sandbox gets the same
/// share; the wall-clock cap is what actually bounds a runaway submission.
const SANDBOX_NANO_CPUS: i64 = 1_000_000_000;

pub struct SandboxExecutor {
    docker: Docker,
    work_dir_base: PathBuf,
}

struct PhaseOutcome {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    timed_out: bool,
    oom_killed: bool,
    /// Only ever populated when `oom_killed` — the docker stats snapshot's `max_usage`, read
    /// before the container is removed. `None` when the daemon didn't return one (e.g. cgroup v2
    /// hosts that don't report it); `resolve_peak_memory_bytes` floors it at the language's cap
    /// either way so the memory_limit invariant always holds.
    peak_memory_bytes: Option<u64>,
    wall_millis: u64,
}

impl SandboxExecutor {
    pub fn connect(work_dir_base: PathBuf) -> Result<Self, String> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| format!("failed to connect to the Docker daemon: {e:?}"))?;
        Ok(Self {
            docker,
            work_dir_base,
        })
    }

    pub async fn execute(
        &self,
        submission: &Submission,
        profile: &CompiledProfile,
    ) -> Result<ExecutionResult, String> {
        let language = &profile.profile;
        let workdir = tempfile::Builder::new()
            .prefix("sandbox-")
            .tempdir_in(&self.work_dir_base)
            .map_err(|e| format!("failed to create sandbox workdir: {e}"))?;

        tokio::fs::write(
            workdir.path().join(&language.source_file_name),
            &submission.source_text,
        )
        .await
        .map_err(|e| format!("failed to write source file: {e}"))?;

        if let Some(stdin_text) = &submission.stdin_text {
            tokio::fs::write(workdir.path().join(SANDBOX_STDIN_FILE), stdin_text)
                .await
                .map_err(|e| format!("failed to write stdin file: {e}"))?;
        }

        let mut compile_millis = None;

        if let Some(compile_command) = &language.compile_command {
            let outcome = self
                .run_phase(
                    workdir.path(),
                    &language.container_image,
                    compile_command,
                    false,
                    language.memory_cap_bytes,
                    language.wall_time_cap_ms,
                )
                .await?;

            if outcome.timed_out {
                return Ok(timeout_result(submission, outcome.wall_millis));
            }
            compile_millis = Some(outcome.wall_millis);
            if outcome.oom_killed {
                return Ok(ExecutionResult {
                    submission_id: submission.submission_id,
                    status: ExecutionStatus::MemoryLimit,
                    stdout: sanitize_output(&outcome.stdout),
                    stderr: sanitize_output(&outcome.stderr),
                    exit_code: outcome.exit_code,
                    wall_millis: outcome.wall_millis,
                    compile_millis,
                    peak_memory_bytes: Some(resolve_peak_memory_bytes(&outcome, language.memory_cap_bytes)),
                });
            }
            if outcome.exit_code != Some(0) {
                return Ok(ExecutionResult {
                    submission_id: submission.submission_id,
                    status: ExecutionStatus::CompilationError,
                    stdout: sanitize_output(&outcome.stdout),
                    stderr: sanitize_output(&outcome.stderr),
                    exit_code: outcome.exit_code,
                    wall_millis: outcome.wall_millis,
                    compile_millis,
                    peak_memory_bytes: None,
                });
            }
        }

        let outcome = self
            .run_phase(
                workdir.path(),
                &language.container_image,
                &language.run_command,
                submission.stdin_text.is_some(),
                language.memory_cap_bytes,
                language.wall_time_cap_ms,
            )
            .await?;

        if outcome.timed_out {
            return Ok(timeout_result(submission, outcome.wall_millis));
        }

        let status = classify(&outcome, &profile.compile_error_stderr);
        let peak_memory_bytes = (status == ExecutionStatus::MemoryLimit)
            .then(|| resolve_peak_memory_bytes(&outcome, language.memory_cap_bytes));

        Ok(ExecutionResult {
            submission_id: submission.submission_id,
            status,
            stdout: sanitize_output(&outcome.stdout),
            stderr: sanitize_output(&outcome.stderr),
            exit_code: outcome.exit_code,
            wall_millis: outcome.wall_millis,
            compile_millis,
            peak_memory_bytes,
        })
    }

    async fn run_phase(
        &self,
        workdir: &Path,
        image: &str,
        argv: &[String],
        pipe_stdin: bool,
        memory_cap_bytes: u64,
        wall_time_cap_ms: u64,
    ) -> Result<PhaseOutcome, String> {
        let cmd = if pipe_stdin {
            shell_wrap_with_stdin(argv)
        } else {
            argv.to_vec()
        };

        let bind = format!("{}:{SANDBOX_MOUNT_POINT}", workdir.display());
        let memory = i64::try_from(memory_cap_bytes).unwrap_or(i64::MAX);

        let config = Config {
            image: Some(image.to_owned()),
            cmd: Some(cmd),
            working_dir: Some(SANDBOX_MOUNT_POINT.to_owned()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![bind]),
                network_mode: Some("none".to_owned()),
                readonly_rootfs: Some(true),
                cap_drop: Some(vec!["ALL".to_owned()]),
                security_opt: Some(vec!["no-new-privileges:true".to_owned()]),
                pids_limit: Some(SANDBOX_PIDS_LIMIT),
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some(SANDBOX_NANO_CPUS),
                init: Some(true),
                ..HostConfig::default()
            }),
            ..Config::default()
        };

        let container = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| format!("failed to create sandbox container: {e:?}"))?;
        let container_id = container.id;

        let outcome = self
            .drive_phase(&container_id, wall_time_cap_ms)
            .await;

        let remove_options = RemoveContainerOptions {
            force: true,
            ..RemoveContainerOptions::default()
        };
        if let Err(e) = self
            .docker
            .remove_container(&container_id, Some(remove_options))
            .await
        {
            log::warn!("failed to remove sandbox container {container_id}: {e:?}");
        }

        outcome
    }

    async fn drive_phase(
        &self,
        container_id: &str,
        wall_time_cap_ms: u64,
    ) -> Result<PhaseOutcome, String> {
        let AttachContainerResults { mut output, .. } = self
            .docker
            .attach_container(
                container_id,
                Some(AttachContainerOptions::<String> {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(true),
                    ..AttachContainerOptions::default()
                }),
            )
            .await
            .map_err(|e| format!("failed to attach to sandbox container: {e:?}"))?;

        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| format!("failed to start sandbox container: {e:?}"))?;

        let start = Instant::now();
        let budget = Duration::from_millis(wall_time_cap_ms);

        let collect = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                    Ok(_) => (),
                    Err(e) => log::trace!("error reading sandbox output stream: {e:?}"),
                }
            }
            let exit_code = wait_for_exit(&self.docker, container_id).await;
            (stdout, stderr, exit_code)
        };

        match tokio::time::timeout(budget, collect).await {
            Ok((stdout, stderr, exit_code)) => {
                let oom_killed = self.was_oom_killed(container_id).await;
                let peak_memory_bytes = if oom_killed {
                    self.read_peak_memory_bytes(container_id).await
                } else {
                    None
                };
                Ok(PhaseOutcome {
                    stdout,
                    stderr,
                    exit_code,
                    timed_out: false,
                    oom_killed,
                    peak_memory_bytes,
                    wall_millis: elapsed_millis(start),
                })
            }
            Err(_) => {
                self.kill_container_best_effort(container_id).await;
                Ok(PhaseOutcome {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: None,
                    timed_out: true,
                    oom_killed: false,
                    peak_memory_bytes: None,
                    wall_millis: elapsed_millis(start),
                })
            }
        }
    }

    async fn kill_container_best_effort(&self, container_id: &str) {
        let options = KillContainerOptions {
            signal: "SIGKILL".to_owned(),
        };
        if let Err(e) = self.docker.kill_container(container_id, Some(options)).await {
            log::trace!("sandbox container {container_id} already exited: {e:?}");
        }
    }

    async fn was_oom_killed(&self, container_id: &str) -> bool {
        match self.docker.inspect_container(container_id, None).await {
            Ok(inspect) => inspect
                .state
                .and_then(|s| s.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                log::trace!("failed to inspect sandbox container {container_id}: {e:?}");
                false
            }
        }
    }

    /// One-shot stats snapshot of an already-exited container, read before it's removed.
    /// `max_usage` is the daemon's own high-water mark for the cgroup's memory usage.
    async fn read_peak_memory_bytes(&self, container_id: &str) -> Option<u64> {
        let mut stream = self.docker.stats(
            container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );
        match stream.next().await {
            Some(Ok(stats)) => stats.memory_stats.max_usage,
            Some(Err(e)) => {
                log::trace!("failed to read sandbox container {container_id} stats: {e:?}");
                None
            }
            None => None,
        }
    }
}

async fn wait_for_exit(docker: &Docker, container_id: &str) -> Option<i32> {
    loop {
        match docker.wait_container::<&str>(container_id, None).next().await {
            Some(Ok(ContainerWaitResponse { status_code, .. })) => {
                return Some(status_code as i32)
            }
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => return Some(code as i32),
            Some(Err(e)) => {
                log::warn!("failed to wait for sandbox container exit: {e:?}");
                return None;
            }
            None => continue,
        }
    }
}

fn elapsed_millis(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn timeout_result(submission: &Submission, wall_millis: u64) -> ExecutionResult {
    ExecutionResult {
        submission_id: submission.submission_id,
        status: ExecutionStatus::Timeout,
        stdout: String::new(),
        stderr: "execution exceeded the configured wall-clock limit".to_owned(),
        exit_code: None,
        wall_millis,
        compile_millis: None,
        peak_memory_bytes: None,
    }
}

/// Floors the daemon-reported peak at the language's own cap so the memory_limit invariant
/// (peakMemoryBytes >= cap) holds even when the daemon didn't report a usable `max_usage`.
fn resolve_peak_memory_bytes(outcome: &PhaseOutcome, memory_cap_bytes: u64) -> u64 {
    outcome.peak_memory_bytes.unwrap_or(memory_cap_bytes).max(memory_cap_bytes)
}

fn classify(outcome: &PhaseOutcome, compile_error_stderr: &regex::RegexSet) -> ExecutionStatus {
    if outcome.oom_killed {
        return ExecutionStatus::MemoryLimit;
    }
    match outcome.exit_code {
        Some(0) => ExecutionStatus::Success,
        _ => {
            let stderr_text = String::from_utf8_lossy(&outcome.stderr);
            if compile_error_stderr.is_match(&stderr_text) {
                ExecutionStatus::CompilationError
            } else {
                ExecutionStatus::RuntimeError
            }
        }
    }
}

/// Languages without a compile step run the interpreter directly as `run_command`, so there is
/// no shell to redirect stdin through. Wrap in `sh -c` only when a submission actually supplied
/// stdin; this keeps the common case a plain exec with no shell in the loop.
fn shell_wrap_with_stdin(argv: &[String]) -> Vec<String> {
    let joined = argv
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        "sh".to_owned(),
        "-c".to_owned(),
        format!("{joined} < {SANDBOX_STDIN_FILE}"),
    ]
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn shell_wrap_redirects_from_the_stdin_file() {
        let wrapped = shell_wrap_with_stdin(&["python3".to_owned(), "main.py".to_owned()]);
        assert_eq!(wrapped[0], "sh");
        assert_eq!(wrapped[1], "-c");
        assert!(wrapped[2].ends_with("< stdin.txt"));
    }

    #[test]
    fn classify_maps_oom_kill_over_exit_code() {
        let outcome = PhaseOutcome {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(137),
            timed_out: false,
            oom_killed: true,
            peak_memory_bytes: None,
            wall_millis: 10,
        };
        let empty = regex::RegexSet::new::<_, &str>([]).unwrap();
        assert_eq!(classify(&outcome, &empty), ExecutionStatus::MemoryLimit);
    }

    #[test]
    fn classify_promotes_syntax_error_to_compilation_error() {
        let outcome = PhaseOutcome {
            stdout: Vec::new(),
            stderr: b"  File \"main.py\", line 1\nSyntaxError: invalid syntax".to_vec(),
            exit_code: Some(1),
            timed_out: false,
            oom_killed: false,
            peak_memory_bytes: None,
            wall_millis: 10,
        };
        let patterns = regex::RegexSet::new(["SyntaxError"]).unwrap();
        assert_eq!(
            classify(&outcome, &patterns),
            ExecutionStatus::CompilationError
        );
    }

    #[test]
    fn classify_falls_back_to_runtime_error() {
        let outcome = PhaseOutcome {
            stdout: Vec::new(),
            stderr: b"Traceback: ZeroDivisionError".to_vec(),
            exit_code: Some(1),
            timed_out: false,
            oom_killed: false,
            peak_memory_bytes: None,
            wall_millis: 10,
        };
        let patterns = regex::RegexSet::new(["SyntaxError"]).unwrap();
        assert_eq!(classify(&outcome, &patterns), ExecutionStatus::RuntimeError);
    }

    #[test]
    fn resolve_peak_memory_bytes_floors_at_the_cap_when_daemon_reports_nothing() {
        let outcome = PhaseOutcome {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(137),
            timed_out: false,
            oom_killed: true,
            peak_memory_bytes: None,
            wall_millis: 10,
        };
        assert_eq!(resolve_peak_memory_bytes(&outcome, 256 * 1024 * 1024), 256 * 1024 * 1024);
    }

    #[test]
    fn resolve_peak_memory_bytes_prefers_the_daemon_reading_when_above_the_cap() {
        let outcome = PhaseOutcome {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(137),
            timed_out: false,
            oom_killed: true,
            peak_memory_bytes: Some(300 * 1024 * 1024),
            wall_millis: 10,
        };
        assert_eq!(resolve_peak_memory_bytes(&outcome, 256 * 1024 * 1024), 300 * 1024 * 1024);
    }
}
