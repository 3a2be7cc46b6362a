// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scenario execution commands
//!
//! Commands: run, exec

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use didflow_core::application::scenario::{StepReport, StepResult};
use didflow_core::{FlowEngine, HarnessConfig, ScenarioReport, ScenarioRunner};

fn load_runner(config_path: Option<PathBuf>) -> Result<ScenarioRunner> {
    let config = HarnessConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    info!(config = %config.metadata.name, "Configuration loaded");
    Ok(ScenarioRunner::new(Arc::new(FlowEngine::new(config))))
}

/// Scenario name shown in reports: the script's file stem.
pub fn scenario_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn render_step(step: &StepReport) -> String {
    let text = step.to_string();
    match step.result {
        StepResult::Passed(_) => text,
        StepResult::ExpectedFailure(_) => text.dimmed().to_string(),
        StepResult::CheckFailed(_) => text.yellow().to_string(),
        StepResult::Failed(_) => text.red().to_string(),
    }
}

pub fn render_report(report: &ScenarioReport) -> String {
    let verdict = if report.passed {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    let mut out = format!("{} {}\n", verdict, report.name.bold());
    for step in &report.steps {
        out.push_str(&render_step(step));
        out.push('\n');
    }
    out
}

fn print_summary(reports: &[ScenarioReport]) -> bool {
    for report in reports {
        println!("{}", render_report(report));
    }
    let failed = reports.iter().filter(|r| !r.passed).count();
    let summary = format!("{} scenario(s), {} passed, {} failed", reports.len(), reports.len() - failed, failed);
    if failed == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
    failed == 0
}

/// Returns `true` when every scenario passed.
pub async fn run_files(files: Vec<PathBuf>, parallel: bool, config_path: Option<PathBuf>) -> Result<bool> {
    let runner = load_runner(config_path)?;

    let mut scripts = Vec::with_capacity(files.len());
    for file in &files {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read script {:?}", file))?;
        scripts.push((scenario_name(file), text));
    }

    let reports = if parallel {
        runner.run_parallel(scripts).await
    } else {
        let mut reports = Vec::with_capacity(scripts.len());
        for (name, text) in &scripts {
            reports.push(runner.run_script(name, text).await);
        }
        reports
    };

    Ok(print_summary(&reports))
}

pub async fn exec_lines(lines: Vec<String>, config_path: Option<PathBuf>) -> Result<bool> {
    let runner = load_runner(config_path)?;
    let report = runner.run_script("exec", &lines.join("\n")).await;
    Ok(print_summary(std::slice::from_ref(&report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("didflow-config.yaml");
        HarnessConfig::default().to_yaml_file(&path).unwrap();
        path
    }

    #[test]
    fn test_scenario_name_is_file_stem() {
        assert_eq!(scenario_name(Path::new("/tmp/ake-es256k.flow")), "ake-es256k");
    }

    #[tokio::test]
    async fn test_offline_script_passes() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("vars.flow");
        std::fs::write(&script, "# local only\nset answer 42\nview answer\n").unwrap();

        let passed = run_files(vec![script], false, Some(config_file(&dir))).await.unwrap();
        assert!(passed);
    }

    #[tokio::test]
    async fn test_failing_exec_reports_failure() {
        let dir = TempDir::new().unwrap();
        let passed = exec_lines(vec!["view missing".to_string()], Some(config_file(&dir)))
            .await
            .unwrap();
        assert!(!passed);
    }

    #[tokio::test]
    async fn test_missing_script_is_error() {
        let dir = TempDir::new().unwrap();
        let result = run_files(vec![dir.path().join("absent.flow")], true, Some(config_file(&dir))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_report_rendering() {
        let dir = TempDir::new().unwrap();
        let runner = load_runner(Some(config_file(&dir))).unwrap();
        let report = runner.run_script("render", "set x 1\nview y").await;

        let text = render_report(&report);
        assert!(text.contains("FAIL"));
        assert!(text.contains("render"));
        assert!(text.contains("x = 1"));
        assert!(text.contains("view y"));
    }
}
