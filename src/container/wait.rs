//! Readiness conditions.
//!
//! A started container is usable only once its readiness condition holds.
//! Conditions are probes polled against the runtime, never fixed sleeps, and
//! compose with [`WaitFor::all`] under one shared deadline.

use crate::container::{Container, ContainerError, ContainerPort, Result};
use crate::context::RunContext;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Startup timeout applied to a single condition unless overridden.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between two probes of the same condition.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pattern searched for in container logs.
#[derive(Debug, Clone)]
pub enum LogPattern {
    /// Plain substring
    Literal(String),
    /// Regular expression
    Regex(Regex),
}

impl LogPattern {
    /// Number of non-overlapping matches in `logs`.
    pub fn count_matches(&self, logs: &str) -> usize {
        match self {
            LogPattern::Literal(text) if text.is_empty() => 0,
            LogPattern::Literal(text) => logs.matches(text.as_str()).count(),
            LogPattern::Regex(regex) => regex.find_iter(logs).count(),
        }
    }
}

impl fmt::Display for LogPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPattern::Literal(text) => write!(f, "\"{}\"", text),
            LogPattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// A readiness condition.
#[derive(Debug, Clone, Default)]
pub enum WaitFor {
    /// Ready as soon as the container is started
    #[default]
    Nothing,
    /// Ready once `pattern` has appeared `occurrences` times in the logs
    Log {
        /// Pattern to look for
        pattern: LogPattern,
        /// Required number of matches
        occurrences: usize,
        /// Bound for this condition alone
        startup_timeout: Duration,
        /// Delay between probes
        poll_interval: Duration,
    },
    /// Ready once `port` accepts connections
    ListeningPort {
        /// Container-internal port
        port: ContainerPort,
        /// Bound for this condition alone
        startup_timeout: Duration,
        /// Delay between probes
        poll_interval: Duration,
    },
    /// Ready once every condition holds, checked in order
    All {
        /// Conditions to satisfy
        conditions: Vec<WaitFor>,
        /// Shared bound for the whole sequence
        deadline: Option<Duration>,
    },
}

impl WaitFor {
    /// Wait for a log line containing `text`.
    pub fn log(text: impl Into<String>) -> Self {
        Self::Log {
            pattern: LogPattern::Literal(text.into()),
            occurrences: 1,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Wait for a log line matching `regex`.
    pub fn log_regex(regex: Regex) -> Self {
        Self::Log {
            pattern: LogPattern::Regex(regex),
            occurrences: 1,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Wait for `port` to accept connections.
    pub fn listening_port(port: ContainerPort) -> Self {
        Self::ListeningPort {
            port,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Wait for every condition in order.
    pub fn all(conditions: impl IntoIterator<Item = WaitFor>) -> Self {
        Self::All {
            conditions: conditions.into_iter().collect(),
            deadline: None,
        }
    }

    /// Bound this condition. On [`WaitFor::All`] this sets the shared
    /// deadline of the whole sequence.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        match &mut self {
            WaitFor::Log {
                startup_timeout, ..
            }
            | WaitFor::ListeningPort {
                startup_timeout, ..
            } => *startup_timeout = timeout,
            WaitFor::All { deadline, .. } => *deadline = Some(timeout),
            WaitFor::Nothing => {}
        }
        self
    }

    /// Require `count` matches of a log pattern. Ignored by other conditions.
    pub fn with_occurrences(mut self, count: usize) -> Self {
        if let WaitFor::Log { occurrences, .. } = &mut self {
            *occurrences = count.max(1);
        }
        self
    }

    /// Change the delay between probes.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        match &mut self {
            WaitFor::Log { poll_interval, .. } | WaitFor::ListeningPort { poll_interval, .. } => {
                *poll_interval = interval
            }
            WaitFor::All { conditions, .. } => {
                for condition in conditions.iter_mut() {
                    *condition = std::mem::take(condition).with_poll_interval(interval);
                }
            }
            WaitFor::Nothing => {}
        }
        self
    }

    /// Block until the condition holds for `container`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ReadinessTimeout`] when the condition's own
    /// timeout expires, [`ContainerError::Interrupted`] when `ctx` is
    /// cancelled or past its deadline, [`ContainerError::ContainerExited`] if
    /// the container stops while waiting, or the runtime's error.
    pub async fn wait_until_ready(&self, ctx: &RunContext, container: &Container) -> Result<()> {
        match self {
            WaitFor::Nothing => ctx.check().map_err(ContainerError::from),
            WaitFor::Log {
                pattern,
                occurrences,
                startup_timeout,
                poll_interval,
            } => {
                let scoped = ctx.child_with_timeout(*startup_timeout);
                let outcome = wait_for_log(&scoped, container, pattern, *occurrences, *poll_interval).await;
                settle(outcome, ctx, *startup_timeout, || self.to_string())
            }
            WaitFor::ListeningPort {
                port,
                startup_timeout,
                poll_interval,
            } => {
                let scoped = ctx.child_with_timeout(*startup_timeout);
                let outcome = wait_for_port(&scoped, container, *port, *poll_interval).await;
                settle(outcome, ctx, *startup_timeout, || self.to_string())
            }
            WaitFor::All {
                conditions,
                deadline,
            } => {
                let shared = match deadline {
                    Some(timeout) => ctx.child_with_timeout(*timeout),
                    None => ctx.child(),
                };
                for condition in conditions {
                    let outcome = Box::pin(condition.wait_until_ready(&shared, container)).await;
                    match (outcome, deadline) {
                        (Ok(()), _) => {}
                        (Err(ContainerError::Interrupted(_)), Some(timeout)) if ctx.check().is_ok() => {
                            return Err(ContainerError::ReadinessTimeout {
                                condition: self.to_string(),
                                timeout: *timeout,
                            });
                        }
                        (Err(e), _) => return Err(e),
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitFor::Nothing => write!(f, "nothing"),
            WaitFor::Log {
                pattern,
                occurrences,
                ..
            } => write!(f, "log {} x{}", pattern, occurrences),
            WaitFor::ListeningPort { port, .. } => write!(f, "listening port {}", port),
            WaitFor::All { conditions, .. } => {
                let parts: Vec<String> = conditions.iter().map(ToString::to_string).collect();
                write!(f, "all({})", parts.join(", "))
            }
        }
    }
}

/// Map an interruption of a scoped child context to a timeout unless the
/// parent context itself is done.
fn settle(
    outcome: Result<()>,
    parent: &RunContext,
    timeout: Duration,
    describe: impl FnOnce() -> String,
) -> Result<()> {
    match outcome {
        Err(ContainerError::Interrupted(_)) => match parent.check() {
            Err(reason) => Err(ContainerError::Interrupted(reason)),
            Ok(()) => Err(ContainerError::ReadinessTimeout {
                condition: describe(),
                timeout,
            }),
        },
        other => other,
    }
}

async fn wait_for_log(
    ctx: &RunContext,
    container: &Container,
    pattern: &LogPattern,
    occurrences: usize,
    poll_interval: Duration,
) -> Result<()> {
    loop {
        let logs = ctx.run(container.logs()).await??;
        let found = pattern.count_matches(&logs);
        if found >= occurrences {
            debug!(
                "Container {} logged {} {} time(s)",
                container.short_id(),
                pattern,
                found
            );
            return Ok(());
        }

        if !ctx.run(container.is_running()).await?? {
            return Err(ContainerError::ContainerExited(container.id().to_string()));
        }

        ctx.sleep(poll_interval).await?;
    }
}

async fn wait_for_port(
    ctx: &RunContext,
    container: &Container,
    port: ContainerPort,
    poll_interval: Duration,
) -> Result<()> {
    loop {
        if ctx.run(container.is_port_listening(port)).await?? {
            debug!("Container {} is listening on {}", container.short_id(), port);
            return Ok(());
        }

        if !ctx.run(container.is_running()).await?? {
            return Err(ContainerError::ContainerExited(container.id().to_string()));
        }

        ctx.sleep(poll_interval).await?;
    }
}
