//! Event handling and status display
//!
//! Every library-side event lands here: it is re-emitted into tracing at
//! the event's level and, outside JSON mode, rendered as a status line.

use console::style;
use kiln_events::{AppEvent, FetchEvent, GeneralEvent, PhaseEvent, RunEvent};

/// Event handler for status display and user feedback
pub struct EventHandler {
    /// Print human-readable status lines (off in JSON mode)
    print: bool,
    /// Show debug-level events
    debug: bool,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(print: bool, debug: bool) -> Self {
        Self { print, debug }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        trace_event(&event);

        if !self.print {
            return;
        }

        match event {
            AppEvent::Fetch(fetch) => self.handle_fetch(fetch),
            AppEvent::Phase(phase) => self.handle_phase(phase),
            AppEvent::Run(run) => self.handle_run(run),
            AppEvent::General(general) => self.handle_general(general),
        }
    }

    fn handle_fetch(&self, event: FetchEvent) {
        match event {
            FetchEvent::Started { url, total_size } => match total_size {
                Some(size) => self.status(&format!("Fetching {url} ({size} bytes)")),
                None => self.status(&format!("Fetching {url}")),
            },
            FetchEvent::Verifying { url, algorithm } => {
                if self.debug {
                    self.status(&format!("Verifying {algorithm} checksum of {url}"));
                }
            }
            FetchEvent::Completed { url, size, .. } => {
                self.status(&format!(
                    "{} fetched {url} ({size} bytes)",
                    style("✓").green()
                ));
            }
            FetchEvent::Failed { url, error } => {
                self.error(&format!("fetch of {url} failed: {error}"));
            }
            FetchEvent::Progress { .. } => {}
        }
    }

    fn handle_phase(&self, event: PhaseEvent) {
        match event {
            PhaseEvent::Started { phase, steps } => {
                self.status(&format!("Running {phase} phase ({steps} steps)"));
            }
            PhaseEvent::StepStarted { command, .. } => {
                self.status(&format!("  {} {command}", style("$").dim()));
            }
            PhaseEvent::Completed { phase, duration } => {
                self.status(&format!(
                    "{} {phase} phase finished in {duration:.2?}",
                    style("✓").green()
                ));
            }
            PhaseEvent::Failed {
                phase,
                exit_code,
                command,
            } => {
                self.error(&format!("{phase} phase failed (exit {exit_code}): {command}"));
            }
        }
    }

    fn handle_run(&self, event: RunEvent) {
        match event {
            RunEvent::StateChanged { name, from, to } => {
                if self.debug {
                    self.status(&format!("{name}: {from} -> {to}"));
                }
            }
            RunEvent::Staged {
                name,
                build_root,
                destdir,
            } => {
                if self.debug {
                    self.status(&format!(
                        "{name}: build root {} destdir {}",
                        build_root.display(),
                        destdir.display()
                    ));
                }
            }
            RunEvent::BuildRootRetained { name, path } => {
                self.status(&format!("{name}: build directory kept at {}", path.display()));
            }
            RunEvent::Completed {
                name,
                version,
                duration,
            } => {
                self.status(&format!(
                    "{} {name} {version} done in {duration:.2?}",
                    style("✓").green()
                ));
            }
            RunEvent::Failed { name, error } => {
                self.error(&format!("{name}: {error}"));
            }
        }
    }

    fn handle_general(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => match context {
                Some(context) => self.status(&format!(
                    "{} {message} ({context})",
                    style("warning:").yellow()
                )),
                None => self.status(&format!("{} {message}", style("warning:").yellow())),
            },
            GeneralEvent::Error { message, details } => match details {
                Some(details) => self.error(&format!("{message}: {details}")),
                None => self.error(&message),
            },
            GeneralEvent::DebugLog { message } => {
                if self.debug {
                    self.status(&format!("{} {message}", style("debug:").dim()));
                }
            }
            GeneralEvent::OperationStarted { operation } => self.status(&operation),
            GeneralEvent::OperationCompleted { operation, success } => {
                if success {
                    self.status(&format!("{} {operation}", style("✓").green()));
                } else {
                    self.error(&operation);
                }
            }
            GeneralEvent::OperationFailed { operation, error } => {
                self.error(&format!("{operation}: {error}"));
            }
        }
    }

    fn status(&self, message: &str) {
        eprintln!("{message}");
    }

    fn error(&self, message: &str) {
        eprintln!("{} {message}", style("✗").red());
    }
}

/// Forward an event into tracing at its mapped level
fn trace_event(event: &AppEvent) {
    let domain = event.log_target();
    match event.log_level() {
        tracing::Level::ERROR => tracing::error!(domain, event = ?event),
        tracing::Level::WARN => tracing::warn!(domain, event = ?event),
        tracing::Level::INFO => tracing::info!(domain, event = ?event),
        tracing::Level::DEBUG => tracing::debug!(domain, event = ?event),
        tracing::Level::TRACE => tracing::trace!(domain, event = ?event),
    }
}
