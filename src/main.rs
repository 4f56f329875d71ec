// hostsync - SSH known_hosts 调和与安装工具
// 应用入口

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::error;

mod config;
mod error;
mod install;
mod pipeline;
mod report;
mod scan;
mod store;

use config::{parse_precedence, ReconcileConfig};
use error::ReconcileError;

#[derive(Parser)]
#[command(
    name = "hostsync",
    version,
    about = "Collect, verify, merge and atomically install SSH known_hosts entries"
)]
struct Cli {
    /// 配置文件路径（JSON），缺省时尝试默认位置
    #[arg(long)]
    config: Option<PathBuf>,

    /// 静态 known_hosts 源文件（可多次指定）
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// 内联 secret 覆盖文本（可多次指定）
    #[arg(long = "secret", value_name = "TEXT")]
    secrets: Vec<String>,

    /// 扫描目标 `host[:port]`（可多次指定）
    #[arg(long = "scan", value_name = "TARGET")]
    scan_targets: Vec<String>,

    /// 单主机扫描超时（秒）
    #[arg(long, value_name = "SECS")]
    scan_timeout: Option<u64>,

    /// 扫描并发上限
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// 扫描阶段运行级超时（秒）
    #[arg(long, value_name = "SECS")]
    run_timeout: Option<u64>,

    /// 扫描失败时的回退密钥，`host=<key_type> <base64>` 形式（可多次指定）
    #[arg(long = "fallback", value_name = "SPEC")]
    fallbacks: Vec<String>,

    /// 来源优先级，逗号分隔、从低到高（默认 scan,file,secret）
    #[arg(long, value_name = "LIST")]
    precedence: Option<String>,

    /// 允许安装空的 known_hosts 文件
    #[arg(long)]
    allow_empty: bool,

    /// 目标 known_hosts 路径
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// 解析 `host=<key_type> <base64>` 形式的回退密钥声明
fn parse_fallback(spec: &str) -> Result<(String, String), String> {
    match spec.split_once('=') {
        Some((host, keyspec)) if !host.is_empty() && !keyspec.is_empty() => {
            Ok((host.to_string(), keyspec.to_string()))
        }
        _ => Err(format!(
            "fallback must be host=<key_type> <base64>, got {:?}",
            spec
        )),
    }
}

/// 配置文件打底，CLI 标志覆盖
fn build_config(cli: Cli) -> Result<ReconcileConfig> {
    let mut config = match &cli.config {
        Some(path) => ReconcileConfig::load_from(path)
            .with_context(|| format!("配置文件加载失败: {}", path.display()))?,
        None => ReconcileConfig::load_default()?,
    };

    if let Some(output) = cli.output {
        config.destination = output;
    }
    config.files.extend(cli.files);
    config.secrets.extend(cli.secrets);
    config.scan.targets.extend(cli.scan_targets);

    if let Some(secs) = cli.scan_timeout {
        config.scan.timeout_secs = secs;
    }
    if let Some(n) = cli.concurrency {
        config.scan.concurrency = n;
    }
    if let Some(secs) = cli.run_timeout {
        config.scan.run_timeout_secs = secs;
    }
    for spec in &cli.fallbacks {
        let (host, keyspec) = parse_fallback(spec).map_err(anyhow::Error::msg)?;
        config.scan.fallback_keys.insert(host, keyspec);
    }
    if let Some(spec) = &cli.precedence {
        config.precedence = parse_precedence(spec).map_err(anyhow::Error::msg)?;
    }
    if cli.allow_empty {
        config.allow_empty = true;
    }

    if config.destination.as_os_str().is_empty() {
        bail!("destination path is required (--output or config file)");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug hostsync ...
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("[Config] {:#}", e);
            return ExitCode::from(1);
        }
    };

    match pipeline::run(&config).await {
        Ok(summary) => {
            summary.log_outcome();
            ExitCode::SUCCESS
        }
        Err(failure) => {
            // 失败时也要完整汇报：尝试了什么、成功了什么、跳过了什么
            failure.summary.log_outcome();
            match &failure.error {
                ReconcileError::Validation(violations) => {
                    for violation in violations {
                        error!("[Validate] {}", violation);
                    }
                    error!("[Reconcile] {}", failure.error);
                    ExitCode::from(2)
                }
                ReconcileError::Install(_) => {
                    error!("[Reconcile] {}", failure.error);
                    ExitCode::from(3)
                }
                other => {
                    error!("[Reconcile] {}", other);
                    ExitCode::from(1)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fallback() {
        let (host, keyspec) = parse_fallback("host2=ssh-ed25519 AAAA").unwrap();
        assert_eq!(host, "host2");
        assert_eq!(keyspec, "ssh-ed25519 AAAA");

        assert!(parse_fallback("host2").is_err());
        assert!(parse_fallback("=ssh-ed25519 AAAA").is_err());
        assert!(parse_fallback("host2=").is_err());
    }
}
