// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scenario Runner
//!
//! Executes command scripts line by line, each script against its own fresh
//! [`Scenario`]. A failing command aborts the script unless the next line is
//! an `expect` assertion on that failure. A conformance check that does not
//! hold marks the script failed and execution continues.
//!
//! Independent scripts can run concurrently: the engine is shared behind an
//! `Arc` and holds only stateless service clients.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::application::engine::{FlowEngine, StepOutput};
use crate::application::error::{FlowError, FlowStep};
use crate::domain::command::{Command, Expectation};
use crate::domain::conformance::CheckOutcome;
use crate::domain::session::Scenario;

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Passed(String),
    /// Conformance check evaluated to `success: false`.
    CheckFailed(CheckOutcome),
    /// Command failed and the following `expect` accepted the failure.
    ExpectedFailure(String),
    Failed(String),
}

impl StepResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepResult::CheckFailed(_) | StepResult::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based line number in the script.
    pub line_no: usize,
    pub line: String,
    pub result: StepResult,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            StepResult::Passed(output) => write!(f, "{:>4}  {} => {}", self.line_no, self.line, output),
            StepResult::CheckFailed(outcome) => write!(
                f,
                "{:>4}  {} => {}: {{success: false}} ({})",
                self.line_no,
                self.line,
                outcome.name,
                outcome.detail.as_deref().unwrap_or("")
            ),
            StepResult::ExpectedFailure(error) => {
                write!(f, "{:>4}  {} => failed as expected: {}", self.line_no, self.line, error)
            }
            StepResult::Failed(error) => write!(f, "{:>4}  {} => FAILED: {}", self.line_no, self.line, error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: Vec<StepReport>,
    pub passed: bool,
}

impl ScenarioReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.result.is_failure())
    }
}

fn expectation_met(expectation: &Expectation, error: &FlowError) -> bool {
    match expectation {
        Expectation::Status(code) => error.status() == Some(*code),
        Expectation::Error(phrase) => error.matches(phrase),
    }
}

fn script_lines(text: &str) -> Vec<(usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

#[derive(Clone)]
pub struct ScenarioRunner {
    engine: Arc<FlowEngine>,
}

impl ScenarioRunner {
    pub fn new(engine: Arc<FlowEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    pub async fn run_script(&self, name: &str, text: &str) -> ScenarioReport {
        let lines = script_lines(text);
        let commands: Vec<Result<Command, FlowError>> = lines
            .iter()
            .map(|(_, line)| Command::parse(line).map_err(|e| FlowError::new(FlowStep::Parse, e)))
            .collect();
        let is_expect: Vec<bool> = commands
            .iter()
            .map(|c| matches!(c, Ok(Command::Expect(_))))
            .collect();

        let mut scenario = Scenario::new();
        let mut steps = Vec::with_capacity(lines.len());
        let mut passed = true;
        // Failure held back for the `expect` on the next line.
        let mut pending: Option<(usize, FlowError)> = None;

        for (i, ((line_no, line), command)) in lines.iter().zip(commands).enumerate() {
            let step = |result| StepReport {
                line_no: *line_no,
                line: line.to_string(),
                result,
            };

            if let Ok(Command::Expect(expectation)) = &command {
                let Some((failed_at, failure)) = pending.take() else {
                    steps.push(step(StepResult::Failed("no preceding failure to assert on".into())));
                    passed = false;
                    break;
                };
                let (failed_no, failed_line) = lines[failed_at];
                let met = expectation_met(expectation, &failure);
                steps.push(StepReport {
                    line_no: failed_no,
                    line: failed_line.to_string(),
                    result: if met {
                        StepResult::ExpectedFailure(failure.to_string())
                    } else {
                        StepResult::Failed(failure.to_string())
                    },
                });
                if met {
                    steps.push(step(StepResult::Passed("expectation met".into())));
                    continue;
                }
                warn!(scenario = name, line = *line_no, error = %failure, "Expectation not met");
                steps.push(step(StepResult::Failed(format!("expectation not met by: {}", failure))));
                passed = false;
                break;
            }

            let outcome = match command {
                Ok(command) => self.engine.execute(&mut scenario, command).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(StepOutput::Check(check)) if !check.success => {
                    warn!(scenario = name, check = %check.name, "Conformance check failed");
                    steps.push(step(StepResult::CheckFailed(check)));
                    passed = false;
                }
                Ok(output) => steps.push(step(StepResult::Passed(output.to_string()))),
                Err(failure) => {
                    if is_expect.get(i + 1).copied().unwrap_or(false) {
                        pending = Some((i, failure));
                        continue;
                    }
                    error!(scenario = name, line = *line_no, error = %failure, "Scenario aborted");
                    steps.push(step(StepResult::Failed(failure.to_string())));
                    passed = false;
                    break;
                }
            }
        }

        info!(scenario = name, passed, steps = steps.len(), "Scenario finished");
        ScenarioReport {
            name: name.to_string(),
            steps,
            passed,
        }
    }

    /// Run independent scripts concurrently, one task each. Reports are
    /// returned in input order.
    pub async fn run_parallel(&self, scripts: Vec<(String, String)>) -> Vec<ScenarioReport> {
        let names: Vec<String> = scripts.iter().map(|(name, _)| name.clone()).collect();
        let handles = scripts.into_iter().map(|(name, text)| {
            let runner = self.clone();
            tokio::spawn(async move { runner.run_script(&name, &text).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| match joined {
                Ok(report) => report,
                Err(e) => {
                    error!(scenario = %name, error = %e, "Scenario task panicked");
                    ScenarioReport {
                        name,
                        steps: Vec::new(),
                        passed: false,
                    }
                }
            })
            .collect()
    }
}
