// 主机密钥在线扫描器
//
// 每个目标一次握手，采集服务器出示的主机密钥；
// 并发由信号量限制，单主机超时与运行级超时分别生效。
// 扫描失败（超时/不可达/协议错误）对整次运行非致命：
// 配置了回退密钥则代入回退条目，否则该主机缺席输出并记录告警

use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::PublicKey;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, warn};

use crate::config::{ScanConfig, SourceKind};
use crate::report::{RunSummary, RunWarning};
use crate::store::entry::HostKeyEntry;
use crate::store::parser::parse_line;
use crate::store::source::SourceStore;

/// 单个扫描目标
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub port: u16,
}

impl ScanTarget {
    /// 从 `host[:port]` 形式解析目标，端口缺省为 22
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err("empty scan target".to_string());
        }
        if let Some((host, port)) = spec.rsplit_once(':') {
            if !host.is_empty() && !host.contains(':') {
                let port: u16 = port
                    .parse()
                    .map_err(|_| format!("invalid port in scan target {:?}", spec))?;
                return Ok(Self {
                    host: host.to_string(),
                    port,
                });
            }
        }
        Ok(Self {
            host: spec.to_string(),
            port: 22,
        })
    }

    /// 目标在 known_hosts 中的主机名模式
    /// 非默认端口采用 OpenSSH 的 `[host]:port` 约定
    pub fn pattern(&self) -> String {
        if self.port == 22 {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }
}

/// 单个目标的扫描结果
#[derive(Debug)]
pub enum ScanResult {
    /// 采集到服务器主机密钥
    Success(PublicKey),
    /// 单主机超时
    Timeout,
    /// TCP 层不可达（含解析失败）
    Unreachable(String),
    /// SSH 层畸形响应
    ProtocolError(String),
}

/// 扫描单个目标
async fn scan_target(target: &ScanTarget, per_host_timeout: Duration) -> ScanResult {
    let addr = format!("{}:{}", target.host, target.port);
    let socket_addr = match addr.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(a) => a,
            None => return ScanResult::Unreachable("no valid address found".to_string()),
        },
        Err(e) => return ScanResult::Unreachable(format!("failed to resolve address: {}", e)),
    };

    debug!("[Scan] connecting to {}...", socket_addr);
    let tcp_stream = match timeout(per_host_timeout, TcpStream::connect(socket_addr)).await {
        Err(_) => return ScanResult::Timeout,
        Ok(Err(e)) => return ScanResult::Unreachable(e.to_string()),
        Ok(Ok(stream)) => stream,
    };

    let (key_tx, mut key_rx) = oneshot::channel();
    let handler = super::handler::ScanHandler::new(key_tx, target.host.clone());
    let config = Arc::new(russh::client::Config::default());

    let handshake = timeout(
        per_host_timeout,
        russh::client::connect_stream(config, tcp_stream, handler),
    )
    .await;

    // Handler 拒绝继续握手，连接必然以错误收场；密钥在回调里已经送出
    match key_rx.try_recv() {
        Ok(key) => ScanResult::Success(key),
        Err(_) => match handshake {
            Err(_) => ScanResult::Timeout,
            Ok(Err(e)) => ScanResult::ProtocolError(e.to_string()),
            Ok(Ok(_)) => {
                ScanResult::ProtocolError("handshake completed without a host key".to_string())
            }
        },
    }
}

/// 并发扫描全部目标
/// 结果按 (主机名, 端口) 排序，与完成顺序无关，保证输出可复现；
/// 运行级超时到达后中止剩余扫描，未完成目标记为超时
pub async fn scan_all(
    targets: Vec<ScanTarget>,
    settings: &ScanConfig,
) -> Vec<(ScanTarget, ScanResult)> {
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let per_host_timeout = Duration::from_secs(settings.timeout_secs);
    let deadline = Instant::now() + Duration::from_secs(settings.run_timeout_secs);

    let mut join_set = JoinSet::new();
    for target in targets.iter().cloned() {
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("scan semaphore closed");
            let result = scan_target(&target, per_host_timeout).await;
            (target, result)
        });
    }

    let mut results: Vec<(ScanTarget, ScanResult)> = Vec::new();
    loop {
        match timeout_at(deadline, join_set.join_next()).await {
            Ok(Some(Ok(pair))) => results.push(pair),
            Ok(Some(Err(e))) => error!("[Scan] scan task failed: {}", e),
            Ok(None) => break,
            Err(_) => {
                warn!("[Scan] run timeout reached, aborting pending scans");
                join_set.abort_all();
                break;
            }
        }
    }

    // 被中止的目标按超时结果处理
    for target in targets {
        if !results.iter().any(|(done, _)| *done == target) {
            results.push((target, ScanResult::Timeout));
        }
    }

    results.sort_by(|a, b| a.0.host.cmp(&b.0.host).then_with(|| a.0.port.cmp(&b.0.port)));
    results
}

/// 把扫描结果汇成一个来源存储
/// 失败主机若配置了回退密钥则代入，否则缺席并告警
pub fn collect_into_source(
    results: Vec<(ScanTarget, ScanResult)>,
    fallback_keys: &HashMap<String, String>,
    summary: &mut RunSummary,
) -> SourceStore {
    let mut source = SourceStore::empty(SourceKind::Scan, "scan");

    for (target, result) in results {
        match result {
            ScanResult::Success(key) => {
                match HostKeyEntry::from_public_key(target.pattern(), &key) {
                    Ok(entry) => source.add_entry(entry, summary),
                    Err(reason) => {
                        apply_fallback(&mut source, &target, &reason, fallback_keys, summary)
                    }
                }
            }
            ScanResult::Timeout => {
                apply_fallback(&mut source, &target, "timeout", fallback_keys, summary)
            }
            ScanResult::Unreachable(e) => apply_fallback(
                &mut source,
                &target,
                &format!("unreachable: {}", e),
                fallback_keys,
                summary,
            ),
            ScanResult::ProtocolError(e) => apply_fallback(
                &mut source,
                &target,
                &format!("protocol error: {}", e),
                fallback_keys,
                summary,
            ),
        }
    }

    source
}

fn apply_fallback(
    source: &mut SourceStore,
    target: &ScanTarget,
    reason: &str,
    fallback_keys: &HashMap<String, String>,
    summary: &mut RunSummary,
) {
    let Some(keyspec) = fallback_keys.get(&target.host) else {
        summary.record(RunWarning::ScanMissing {
            host: target.host.clone(),
            reason: reason.to_string(),
        });
        return;
    };

    // 回退密钥声明为 `<key_type> <base64>`，补上主机名模式后按普通行解析
    let line = format!("{} {}", target.pattern(), keyspec);
    match parse_line(&line) {
        Ok(entry) => {
            source.add_entry(entry, summary);
            summary.record(RunWarning::ScanFallback {
                host: target.host.clone(),
                reason: reason.to_string(),
            });
        }
        Err(failure) => {
            summary.record(RunWarning::ParseFailure {
                source: format!("fallback:{}", target.host),
                reason: failure.reason,
                raw_line: failure.raw_line,
            });
            summary.record(RunWarning::ScanMissing {
                host: target.host.clone(),
                reason: reason.to_string(),
            });
        }
    }
}
