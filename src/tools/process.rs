use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::ToolError;

/// Lines of captured output kept in error messages.
const ERROR_TAIL_LINES: usize = 20;

/// Builds a command whose child is killed when the handle is dropped.
pub fn command(program: &Path) -> Command {
    let mut command = Command::new(program);
    command.kill_on_drop(true);
    command
}

pub fn program_name(program: &Path) -> String {
    program.display().to_string()
}

/// Runs to completion and returns the raw output whatever the exit status.
pub async fn run_captured(command: &mut Command, program: &str) -> Result<Output, ToolError> {
    debug!(program, "Running command");
    command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Runs to completion and returns stdout; a non-zero exit is an error carrying stderr.
pub async fn run_checked(command: &mut Command, program: &str) -> Result<String, ToolError> {
    let output = run_captured(command, program).await?;

    if !output.status.success() {
        return Err(ToolError::Exit {
            program: program.to_string(),
            status: describe_status(output.status),
            output: tail(&String::from_utf8_lossy(&output.stderr)),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs to completion while echoing stdout and stderr to the terminal line by
/// line. Returns the combined output; a non-zero exit is an error carrying its tail.
pub async fn run_streaming(
    command: &mut Command,
    program: &str,
    indent: &str,
) -> Result<String, ToolError> {
    debug!(program, "Running command with streamed output");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (mut lines, err_lines) = tokio::join!(pump(stdout, indent), pump(stderr, indent));
    lines.extend(err_lines);

    let status = child.wait().await.map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output = lines.join("\n");
    if !status.success() {
        return Err(ToolError::Exit {
            program: program.to_string(),
            status: describe_status(status),
            output: tail(&output),
        });
    }

    Ok(output)
}

/// Runs attached to the terminal (for interactive tools) and checks the exit status.
pub async fn run_interactive(command: &mut Command, program: &str) -> Result<(), ToolError> {
    let status = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ToolError::Exit {
            program: program.to_string(),
            status: describe_status(status),
            output: String::new(),
        })
    }
}

/// Checks that `program` can be spawned at all.
pub async fn probe(program: &Path, arg: &str) -> Result<(), ToolError> {
    let name = program_name(program);
    let mut cmd = command(program);
    cmd.arg(arg);
    run_captured(&mut cmd, &name).await.map(|_| ())
}

/// Echoes and collects lines until EOF. Invalid UTF-8 is replaced, never fatal.
async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, indent: &str) -> Vec<String> {
    let mut collected = Vec::new();
    let Some(reader) = reader else {
        return collected;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Output pipe read failed");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        if !line.trim().is_empty() {
            println!("{}{}", indent, line);
        }
        collected.push(line);
    }
    collected
}

fn describe_status(status: std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
