//! Terminal rendering of stage views

use std::fmt::Write;

use colored::{ColoredString, Colorize};
use openapi_client::RunPhase;

use crate::lifecycle::{GateDecision, Route, Stage};
use crate::stages::{DeployView, MonitorView, PrepareView, UploadView};

/// Colored phase label; `waiting` until a status arrived
pub fn phase_badge(phase: Option<RunPhase>) -> ColoredString {
    match phase {
        None => "waiting".dimmed(),
        Some(RunPhase::Pending) => "pending".yellow(),
        Some(RunPhase::Running) => "running".cyan(),
        Some(RunPhase::Succeeded) => "succeeded".green().bold(),
        Some(RunPhase::Failed) => "failed".red().bold(),
    }
}

/// `upload > prepare > deploy > monitor` with the current stage highlighted
pub fn breadcrumb(current: Stage) -> String {
    Stage::ALL
        .iter()
        .map(|stage| {
            if *stage == current {
                format!("[{}]", stage).bold().to_string()
            } else if stage.index() < current.index() {
                stage.as_str().green().to_string()
            } else {
                stage.as_str().dimmed().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

pub fn upload(view: &UploadView, next: Option<&Route>) -> String {
    let mut out = header(Stage::Upload);
    if let Some(run_id) = &view.run_id {
        let _ = writeln!(out, "run      {}", run_id);
    }
    push_error(&mut out, view.error.as_deref());
    if let Some(route) = next {
        let _ = writeln!(out, "next     {}", route.to_string().underline());
    }
    out
}

pub fn prepare(view: &PrepareView) -> String {
    let mut out = header(Stage::Prepare);
    push_run(&mut out, view.run_id.as_ref().map(|id| id.as_str()));

    if view.gpu_loading {
        let _ = writeln!(out, "gpus     {}", "loading".dimmed());
    } else if view.gpu_options.is_empty() && view.gpu_error.is_none() {
        let _ = writeln!(out, "gpus     {}", "none available".yellow());
    }
    for gpu in &view.gpu_options {
        let marker = if view.selected_gpu.as_deref() == Some(gpu.id.as_str()) {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        let memory = gpu
            .memory_gb
            .map(|gb| format!(" {}GB", gb))
            .unwrap_or_default();
        let _ = writeln!(out, "  {} {} ({}{})", marker, gpu.name, gpu.id, memory);
    }
    if let Some(error) = &view.gpu_error {
        let _ = writeln!(out, "gpus     {}", error.red());
    }

    let _ = writeln!(out, "phase    {}", phase_badge(view.phase()));
    if let Some(status) = &view.status.status {
        for step in &status.steps {
            let message = step.message.as_deref().unwrap_or("");
            let _ = writeln!(
                out,
                "  {:<10} {:<24} {}",
                phase_badge(Some(step.status)),
                step.name,
                message
            );
        }
    }
    push_error(&mut out, view.status.error.as_deref());
    push_gate(&mut out, &view.gate());
    out
}

pub fn deploy(view: &DeployView) -> String {
    let mut out = header(Stage::Deploy);
    push_run(&mut out, view.run_id.as_ref().map(|id| id.as_str()));
    let _ = writeln!(out, "env      {}", view.environment);
    let _ = writeln!(out, "phase    {}", phase_badge(view.phase()));
    if let Some(status) = &view.status.status {
        if let Some(version) = &status.version {
            let _ = writeln!(out, "version  {}", version);
        }
        if let Some(message) = &status.message {
            let _ = writeln!(out, "message  {}", message);
        }
    }
    if let Some(info) = &view.info {
        let _ = writeln!(out, "{}", info.blue());
    }
    push_error(&mut out, view.status.error.as_deref());
    push_gate(&mut out, &view.gate());
    out
}

pub fn monitor(view: &MonitorView) -> String {
    let mut out = header(Stage::Monitor);
    push_run(&mut out, view.run_id.as_ref().map(|id| id.as_str()));
    if view.is_loading {
        let _ = writeln!(out, "{}", "loading metrics".dimmed());
    }
    if let Some(summary) = &view.summary.status {
        let _ = writeln!(
            out,
            "RED      {:.2} req/s  {:.2}% errors  p95 {:.0} ms",
            summary.red.requests_per_second,
            summary.red.error_rate_percent,
            summary.red.p95_duration_ms
        );
        let _ = writeln!(
            out,
            "SLO      {:.3}% available  p95 {:.0} ms",
            summary.slo.availability_percent, summary.slo.latency_p95_ms
        );
        if let Some(updated_at) = summary.updated_at {
            let _ = writeln!(out, "updated  {}", updated_at.to_rfc3339());
        }
    }
    push_error(&mut out, view.summary.error.as_deref());
    out
}

fn header(stage: Stage) -> String {
    format!("{}\n", breadcrumb(stage))
}

fn push_run(out: &mut String, run_id: Option<&str>) {
    let _ = writeln!(out, "run      {}", run_id.unwrap_or("-"));
}

fn push_error(out: &mut String, error: Option<&str>) {
    if let Some(error) = error {
        let _ = writeln!(out, "{} {}", "error".red().bold(), error);
    }
}

fn push_gate(out: &mut String, decision: &GateDecision) {
    if let Some(target) = &decision.advance_target {
        let _ = writeln!(out, "next     {}", target.to_string().underline());
    }
}
