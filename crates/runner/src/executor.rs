//! Phase execution
//!
//! A phase is an ordered list of command strings. Each command runs as its
//! own subprocess with the context environment merged over the inherited
//! one and the working directory pinned to the build root. The first
//! non-zero exit stops the phase.

use crate::context::BuildContext;
use kiln_errors::{Error, RunError};
use kiln_events::{AppEvent, EventEmitter, EventSender, PhaseEvent};
use kiln_types::{PhaseKind, PhaseResult};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Run one phase to completion or first failure
///
/// Returns `Ok` with the captured result even when a sub-step exits
/// non-zero; the caller decides how a failed result propagates. `Err` is
/// reserved for commands that cannot be parsed or spawned at all.
///
/// # Errors
///
/// Returns an error if a command string is malformed or its program
/// cannot be started.
pub async fn run_phase(
    ctx: &BuildContext,
    kind: PhaseKind,
    commands: &[String],
    tx: &EventSender,
) -> Result<PhaseResult, Error> {
    let phase = kind.to_string();
    let started = Instant::now();

    tx.emit(AppEvent::Phase(PhaseEvent::Started {
        phase: phase.clone(),
        steps: commands.len(),
    }));

    let mut stdout = String::new();
    let mut stderr = String::new();

    for (index, raw) in commands.iter().enumerate() {
        let expanded = expand_placeholders(raw, &ctx.env);
        let argv = split_command(&expanded)?;

        tx.emit(AppEvent::Phase(PhaseEvent::StepStarted {
            phase: phase.clone(),
            index,
            command: expanded.clone(),
        }));

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .envs(&ctx.env)
            .current_dir(&ctx.build_root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RunError::SpawnFailed {
                command: argv[0].clone(),
                message: e.to_string(),
            })?;

        stdout.push_str(&String::from_utf8_lossy(&output.stdout));
        stderr.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            // -1 when terminated by a signal
            let exit_code = output.status.code().unwrap_or(-1);

            tx.emit(AppEvent::Phase(PhaseEvent::Failed {
                phase: phase.clone(),
                exit_code,
                command: expanded,
            }));

            return Ok(PhaseResult {
                phase: kind,
                exit_code,
                stdout,
                stderr,
                duration: started.elapsed(),
            });
        }
    }

    let duration = started.elapsed();
    tx.emit(AppEvent::Phase(PhaseEvent::Completed {
        phase,
        duration,
    }));

    Ok(PhaseResult {
        phase: kind,
        exit_code: 0,
        stdout,
        stderr,
        duration,
    })
}

/// Expand `${VAR}` placeholders from the context environment.
/// Unknown placeholders are left intact.
#[must_use]
pub fn expand_placeholders(input: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        if let Some(end) = rest[start + 2..].find('}') {
            let key = &rest[start + 2..start + 2 + end];
            match env.get(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..=start + 2 + end]),
            }
            rest = &rest[start + 3 + end..];
        } else {
            out.push_str(&rest[start..]);
            rest = "";
        }
    }

    out.push_str(rest);
    out
}

/// Split a command string into program and arguments, honoring single and
/// double quotes.
///
/// # Errors
///
/// Returns `CommandParse` for empty commands or unbalanced quotes.
pub fn split_command(line: &str) -> Result<Vec<String>, Error> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;

    for c in line.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    parts.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_single || in_double {
        return Err(RunError::CommandParse {
            command: line.to_string(),
            reason: "unbalanced quote".to_string(),
        }
        .into());
    }
    if has_token {
        parts.push(current);
    }
    if parts.is_empty() {
        return Err(RunError::CommandParse {
            command: line.to_string(),
            reason: "empty command".to_string(),
        }
        .into());
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_arguments() {
        let argv = split_command("make install DESTDIR=/tmp/stage").unwrap();
        assert_eq!(argv, ["make", "install", "DESTDIR=/tmp/stage"]);
    }

    #[test]
    fn quotes_protect_whitespace() {
        let argv = split_command(r#"./configure --with-opt-dir="/opt/my libs" -q"#).unwrap();
        assert_eq!(argv, ["./configure", "--with-opt-dir=/opt/my libs", "-q"]);

        let argv = split_command("sh -c 'echo hi there'").unwrap();
        assert_eq!(argv, ["sh", "-c", "echo hi there"]);
    }

    #[test]
    fn empty_quotes_form_an_argument() {
        let argv = split_command("prog '' tail").unwrap();
        assert_eq!(argv, ["prog", "", "tail"]);
    }

    #[test]
    fn rejects_unbalanced_quote() {
        assert!(split_command("echo 'oops").is_err());
    }

    #[test]
    fn rejects_empty_command() {
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn expands_known_placeholders() {
        let mut env = HashMap::new();
        env.insert("DESTDIR".to_string(), "/tmp/stage".to_string());
        env.insert("JOBS".to_string(), "8".to_string());

        assert_eq!(
            expand_placeholders("make install DESTDIR=${DESTDIR} -j${JOBS}", &env),
            "make install DESTDIR=/tmp/stage -j8"
        );
    }

    #[test]
    fn unknown_placeholders_are_left_intact() {
        let env = HashMap::new();
        assert_eq!(
            expand_placeholders("echo ${NOPE} and ${ALSO", &env),
            "echo ${NOPE} and ${ALSO"
        );
    }
}
