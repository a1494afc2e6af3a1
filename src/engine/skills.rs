//! Compound skills (C6) — in-process, multi-step tool recipes for small
//! models.
//!
//! Each skill is a plain `async fn(Value, SkillContext) -> ToolResult`,
//! registered by name into the [`crate::engine::dispatcher::Dispatcher`]'s
//! skill table rather than one large match statement, so every skill stays
//! independently testable.

use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::engine::dispatcher::ToolResult;

/// Shared collaborators every skill needs: an HTTP client plus the two
/// external service base URLs, and local shell execution. Self-contained so
/// skills never need a reference back to the `Dispatcher` that hosts them.
#[derive(Clone)]
pub struct SkillContext {
    pub http: reqwest::Client,
    pub tool_service_url: String,
    pub browser_service_url: String,
}

impl SkillContext {
    async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        self.post(&format!("{}/{}", self.tool_service_url, name), args).await
    }

    async fn call_browser(&self, path: &str, args: Value) -> ToolResult {
        self.post(&format!("{}{}", self.browser_service_url, path), args).await
    }

    async fn post(&self, url: &str, args: Value) -> ToolResult {
        match self.http.post(url).json(&args).send().await {
            Ok(response) => {
                let status = response.status();
                let bytes = response.bytes().await.unwrap_or_default();
                if status.is_success() {
                    crate::engine::dispatcher::coerce_response_body(&bytes)
                } else {
                    let body = String::from_utf8_lossy(&bytes).to_string();
                    ToolResult::failure(crate::engine::errors::translate_error(&body))
                        .with_metadata("status_code", json!(status.as_u16()))
                }
            }
            Err(e) => ToolResult::failure(format!("tool service unreachable: {}", e)),
        }
    }

    /// Run a shell command via `/bin/bash -c`, capturing stdout/stderr.
    async fn shell(&self, command: &str) -> ToolResult {
        let started = Instant::now();
        let child = Command::new("/bin/bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(c) => c,
            Err(e) => return ToolResult::failure(format!("could not spawn command: {}", e)),
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }

        match child.wait().await {
            Ok(status) => {
                let elapsed = started.elapsed().as_millis() as u64;
                if status.success() {
                    ToolResult::success(json!({"stdout": stdout, "stderr": stderr}))
                        .with_metadata("duration_ms", json!(elapsed))
                } else {
                    ToolResult::failure(format!(
                        "command exited with status {}: {}",
                        status.code().unwrap_or(-1),
                        stderr.trim()
                    ))
                    .with_metadata("stdout", json!(stdout))
                }
            }
            Err(e) => ToolResult::failure(format!("command failed: {}", e)),
        }
    }
}

fn step(name: &str, result: ToolResult) -> Value {
    json!({ "step": name, "result": result })
}

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn arg_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

/// Aggregate a sequence of steps into the `{success, message, steps}` shape
/// every compound skill returns. `success` is true only if every step
/// succeeded; a partial failure never aborts the remaining steps.
fn aggregate(message: &str, steps: Vec<Value>) -> ToolResult {
    let all_ok = steps.iter().all(|s| {
        s.get("result")
            .and_then(|r| r.get("success"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    });
    ToolResult::success(json!({
        "success": all_ok,
        "message": message,
        "steps": steps,
    }))
}

pub async fn full_system_report(_args: Value, ctx: SkillContext) -> ToolResult {
    let mut steps = Vec::new();
    steps.push(step("sysinfo", ctx.call_tool("sysinfo", json!({})).await));
    steps.push(step("sysload", ctx.call_tool("sysload", json!({})).await));
    steps.push(step("cputemp", ctx.call_tool("cputemp", json!({})).await));
    steps.push(step("df", ctx.shell("df -h").await));
    steps.push(step("free", ctx.shell("free -h").await));
    steps.push(step("uname", ctx.shell("uname -a").await));
    aggregate("full system report collected", steps)
}

/// Version probes for common package managers/runtimes; anything not listed
/// falls back to `NAME --version`.
fn version_flag(program: &str) -> &'static str {
    match program {
        "node" | "npm" | "python" | "python3" | "git" | "docker" | "cargo" | "rustc" => "--version",
        "java" => "-version",
        _ => "--version",
    }
}

pub async fn check_stack(args: Value, ctx: SkillContext) -> ToolResult {
    let programs = args
        .get("programs")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut steps = Vec::new();
    for program in programs {
        let Some(name) = program.as_str() else { continue };
        let flag = version_flag(name);
        let result = ctx.shell(&format!("{} {}", name, flag)).await;
        let classification = if result.success { "installed" } else { "missing" };
        steps.push(json!({ "step": name, "classification": classification, "result": result }));
    }
    aggregate("stack check complete", steps)
}

pub async fn diagnose_service(args: Value, ctx: SkillContext) -> ToolResult {
    let service_name = arg_str(&args, "service_name").unwrap_or_else(|| "unknown".to_string());
    let port = args.get("port").and_then(|v| v.as_u64());
    let health_url = arg_str(&args, "health_url");

    let mut steps = Vec::new();
    if let Some(port) = port {
        steps.push(step(
            "port_listener",
            ctx.shell(&format!("ss -ltn | grep -q ':{}' ", port)).await,
        ));
    }
    steps.push(step(
        "process",
        ctx.shell(&format!("pgrep -f '{}'", service_name)).await,
    ));
    if let Some(url) = health_url {
        let result = match ctx.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => ToolResult::success(json!({"status": resp.status().as_u16()})),
            Ok(resp) => ToolResult::failure(format!("health endpoint returned {}", resp.status())),
            Err(e) => ToolResult::failure(format!("health endpoint unreachable: {}", e)),
        };
        steps.push(step("health_http", result));
    }
    steps.push(step(
        "journal",
        ctx.shell(&format!("journalctl -u {} -n 50 --no-pager", service_name)).await,
    ));
    aggregate(&format!("diagnosis for {} complete", service_name), steps)
}

pub async fn web_research(args: Value, ctx: SkillContext) -> ToolResult {
    let topic = arg_str(&args, "topic").unwrap_or_default();
    let max_sources = arg_u64(&args, "max_sources", 3) as usize;

    let search_result = ctx
        .call_browser("/search", json!({ "query": topic }))
        .await;
    let urls: Vec<String> = search_result
        .output
        .get("result")
        .or(Some(&search_result.output))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|e| e.get("url").and_then(|u| u.as_str()).map(str::to_string))
                .take(max_sources)
                .collect()
        })
        .unwrap_or_default();

    let mut steps = vec![step("internet_search", search_result)];
    for url in urls {
        let text_result = ctx
            .call_browser("/browser/text", json!({ "url": url.clone() }))
            .await;
        steps.push(json!({ "step": "browser_get_text", "url": url, "result": text_result }));
    }
    aggregate(&format!("research on '{}' complete", topic), steps)
}

pub async fn check_resources_batch(args: Value, ctx: SkillContext) -> ToolResult {
    let urls = args
        .get("urls")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut steps = Vec::new();
    for url in urls {
        let Some(url) = url.as_str() else { continue };
        let result = ctx
            .call_browser("/access/check", json!({ "url": url }))
            .await;
        let classification = if result.success { "reachable" } else { "failed" };
        steps.push(json!({ "step": url, "classification": classification, "result": result }));
    }
    aggregate("resource batch check complete", steps)
}

pub async fn generate_report(args: Value, ctx: SkillContext) -> ToolResult {
    let path = arg_str(&args, "path").unwrap_or_default();
    let content = arg_str(&args, "content").unwrap_or_default();
    let title = arg_str(&args, "title").unwrap_or_default();

    let dir = std::path::Path::new(&path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut steps = Vec::new();
    if !dir.is_empty() {
        steps.push(step("mkdir", ctx.shell(&format!("mkdir -p '{}'", dir)).await));
    }
    let full_content = format!("# {}\n\n{}", title, content);
    let write_cmd = format!("cat > '{}' << 'TURNHUB_EOF'\n{}\nTURNHUB_EOF", path, full_content);
    steps.push(step("write", ctx.shell(&write_cmd).await));
    steps.push(step("read_back", ctx.shell(&format!("cat '{}'", path)).await));
    steps.push(step("stat", ctx.shell(&format!("stat -c%s '{}'", path)).await));
    aggregate(&format!("report written to {}", path), steps)
}

pub async fn create_script(args: Value, ctx: SkillContext) -> ToolResult {
    let path = arg_str(&args, "path").unwrap_or_default();
    let content = arg_str(&args, "content").unwrap_or_default();

    let write_cmd = format!("cat > '{}' << 'TURNHUB_EOF'\n{}\nTURNHUB_EOF", path, content);
    let mut steps = vec![step("write", ctx.shell(&write_cmd).await)];
    steps.push(step("chmod", ctx.shell(&format!("chmod +x '{}'", path)).await));
    aggregate(&format!("script {} created", path), steps)
}

pub async fn setup_cron_job(args: Value, ctx: SkillContext) -> ToolResult {
    let schedule = arg_str(&args, "schedule").unwrap_or_default();
    let command = arg_str(&args, "command").unwrap_or_default();
    let line = format!("{} {}", schedule, command);

    let dedupe_cmd = format!(
        "(crontab -l 2>/dev/null | grep -vF '{line}'; echo '{line}') | crontab -",
        line = line
    );
    let mut steps = vec![step("insert", ctx.shell(&dedupe_cmd).await)];
    steps.push(step(
        "verify",
        ctx.shell(&format!("crontab -l | grep -F '{}'", line)).await,
    ));
    aggregate("cron job configured", steps)
}

pub async fn setup_git_automation(args: Value, ctx: SkillContext) -> ToolResult {
    let project_path = arg_str(&args, "project_path").unwrap_or_default();
    let backup_path = arg_str(&args, "backup_path").unwrap_or_default();
    let minutes = arg_u64(&args, "minutes", 30);
    let schedule = format!("*/{} * * * *", minutes);

    let autocommit_script = format!("{}/autocommit.sh", project_path);
    let backup_script = format!("{}/backup.sh", project_path);

    let mut steps = Vec::new();
    steps.push(step("mkdir", ctx.shell(&format!("mkdir -p '{}'", project_path)).await));
    steps.push(step(
        "git_init",
        ctx.shell(&format!("git -C '{}' init", project_path)).await,
    ));
    steps.push(step(
        "write_autocommit",
        ctx.shell(&format!(
            "cat > '{}' << 'TURNHUB_EOF'\n#!/bin/bash\ncd '{}' && git add -A && git commit -m 'auto-commit' --allow-empty-message -q\nTURNHUB_EOF",
            autocommit_script, project_path
        ))
        .await,
    ));
    steps.push(step(
        "chmod_autocommit",
        ctx.shell(&format!("chmod +x '{}'", autocommit_script)).await,
    ));
    steps.push(step(
        "write_backup",
        ctx.shell(&format!(
            "cat > '{}' << 'TURNHUB_EOF'\n#!/bin/bash\nrsync -a '{}/' '{}/'\nTURNHUB_EOF",
            backup_script, project_path, backup_path
        ))
        .await,
    ));
    steps.push(step(
        "chmod_backup",
        ctx.shell(&format!("chmod +x '{}'", backup_script)).await,
    ));
    let cron_line = format!("{} {} && {}", schedule, autocommit_script, backup_script);
    steps.push(step(
        "cron_upsert",
        ctx.shell(&format!(
            "(crontab -l 2>/dev/null | grep -vF '{line}'; echo '{line}') | crontab -",
            line = cron_line
        ))
        .await,
    ));
    steps.push(step(
        "initial_commit",
        ctx.shell(&format!("git -C '{}' add -A && git -C '{}' commit -m 'initial' --allow-empty -q", project_path, project_path)).await,
    ));
    steps.push(step(
        "verify",
        ctx.shell(&format!("crontab -l | grep -F '{}'", cron_line)).await,
    ));
    aggregate("git automation configured", steps)
}

pub async fn install_packages(args: Value, ctx: SkillContext) -> ToolResult {
    let packages = args
        .get("packages")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let manager = arg_str(&args, "manager").unwrap_or_else(|| "apt".to_string());

    let mut steps = Vec::new();
    let update_cmd = match manager.as_str() {
        "apt" => Some("apt-get update -y"),
        _ => None,
    };
    if let Some(cmd) = update_cmd {
        steps.push(step("update_index", ctx.shell(cmd).await));
    }

    let names: Vec<&str> = packages.iter().filter_map(|p| p.as_str()).collect();
    let install_cmd = match manager.as_str() {
        "apt" => format!("apt-get install -y {}", names.join(" ")),
        "npm" => format!("npm install -g {}", names.join(" ")),
        "pip" => format!("pip install {}", names.join(" ")),
        other => return ToolResult::failure(format!("unknown package manager: {}", other)),
    };
    steps.push(step("install", ctx.shell(&install_cmd).await));

    for name in names {
        let verify_cmd = match manager.as_str() {
            "apt" => format!("dpkg -s {} | grep -i version", name),
            "npm" => format!("npm list -g {}", name),
            "pip" => format!("pip show {}", name),
            _ => unreachable!(),
        };
        steps.push(json!({ "step": format!("verify:{}", name), "result": ctx.shell(&verify_cmd).await }));
    }
    aggregate("package installation complete", steps)
}

pub async fn run_commands(args: Value, ctx: SkillContext) -> ToolResult {
    let commands = args
        .get("commands")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut steps = Vec::new();
    for command in commands {
        let Some(command) = command.as_str() else { continue };
        steps.push(step(command, ctx.shell(command).await));
    }
    aggregate("commands executed", steps)
}

/// A registered skill: owns the context it needs by value, so no lifetime
/// threads back into the `Dispatcher` that calls it.
pub type SkillFn = fn(Value, SkillContext) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Every compound skill, keyed by the name the model invokes it under.
pub fn registry() -> std::collections::HashMap<&'static str, SkillFn> {
    let mut map: std::collections::HashMap<&'static str, SkillFn> = std::collections::HashMap::new();
    map.insert("full_system_report", |a, c| Box::pin(full_system_report(a, c)));
    map.insert("check_stack", |a, c| Box::pin(check_stack(a, c)));
    map.insert("diagnose_service", |a, c| Box::pin(diagnose_service(a, c)));
    map.insert("web_research", |a, c| Box::pin(web_research(a, c)));
    map.insert("check_resources_batch", |a, c| Box::pin(check_resources_batch(a, c)));
    map.insert("generate_report", |a, c| Box::pin(generate_report(a, c)));
    map.insert("create_script", |a, c| Box::pin(create_script(a, c)));
    map.insert("setup_cron_job", |a, c| Box::pin(setup_cron_job(a, c)));
    map.insert("setup_git_automation", |a, c| Box::pin(setup_git_automation(a, c)));
    map.insert("install_packages", |a, c| Box::pin(install_packages(a, c)));
    map.insert("run_commands", |a, c| Box::pin(run_commands(a, c)));
    map
}

/// A model is *small* when its name carries a size suffix ≤3B (`:3b`,
/// `:1.5b`, `:2b`, ...); any name containing `/` (aggregator-hosted) is never
/// small, regardless of an embedded size token.
pub fn is_small_model(model_name: &str) -> bool {
    if model_name.contains('/') {
        return false;
    }
    let Some(suffix) = model_name.rsplit(':').next() else {
        return false;
    };
    let digits: String = suffix
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() || !suffix.to_lowercase().ends_with('b') {
        return false;
    }
    digits.parse::<f64>().map(|n| n <= 3.0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_small_model_suffixes() {
        assert!(is_small_model("llama3:3b"));
        assert!(is_small_model("qwen2.5:1.5b"));
        assert!(!is_small_model("llama3:70b"));
        assert!(!is_small_model("meta-llama/llama-3-8b"));
        assert!(!is_small_model("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn run_commands_never_aborts_on_partial_failure() {
        let ctx = SkillContext {
            http: reqwest::Client::new(),
            tool_service_url: "http://localhost:1".to_string(),
            browser_service_url: "http://localhost:2".to_string(),
        };
        let result = run_commands(json!({"commands": ["true", "false", "echo ok"]}), ctx).await;
        assert!(result.success);
        let steps = result.output.get("steps").and_then(|v| v.as_array()).unwrap();
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn registry_contains_every_representative_skill() {
        let reg = registry();
        for name in [
            "full_system_report",
            "check_stack",
            "diagnose_service",
            "web_research",
            "check_resources_batch",
            "generate_report",
            "create_script",
            "setup_cron_job",
            "setup_git_automation",
            "install_packages",
            "run_commands",
        ] {
            assert!(reg.contains_key(name), "missing skill: {}", name);
        }
    }
}
