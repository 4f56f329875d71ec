// 来源加载器
//
// 每个加载器把一个来源（静态文件 / 内联 secret 文本 / 扫描结果）
// 变成一个 SourceStore；坏行记录为告警，不中断运行；
// 加载器不触碰任何全局状态

use tracing::debug;

use crate::config::SourceKind;
use crate::error::ReconcileError;
use crate::report::{RunSummary, RunWarning};

use super::entry::{HostKeyEntry, Marker};
use super::parser::{is_skippable, parse_line};
use super::{HostKeyStore, InsertOutcome};

/// 单个来源解析出的存储
#[derive(Debug)]
pub struct SourceStore {
    /// 来源类别（决定合并优先级）
    pub kind: SourceKind,
    /// 来源标签（用于日志与告警）
    pub label: String,
    /// 可连接条目
    pub store: HostKeyStore,
    /// 本来源中出现的 @revoked 条目，合并时用于全局抑制
    pub revoked: Vec<HostKeyEntry>,
}

impl SourceStore {
    pub fn empty(kind: SourceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            store: HostKeyStore::new(),
            revoked: Vec::new(),
        }
    }

    /// 将一条已解析的条目并入本来源
    /// 同身份不同材料视为轮换冲突：告警并保留后出现者
    pub fn add_entry(&mut self, entry: HostKeyEntry, summary: &mut RunSummary) {
        if entry.marker == Some(Marker::Revoked) {
            self.revoked.push(entry);
            return;
        }

        let hosts = entry.hosts.clone();
        let key_type = entry.key_type;
        let kept_fingerprint = entry.fingerprint.clone();
        match self.store.insert(entry) {
            InsertOutcome::Added => {}
            InsertOutcome::Duplicate => {
                debug!("[{}] exact duplicate entry for {} ignored", self.label, hosts);
            }
            InsertOutcome::Replaced {
                previous_fingerprint,
            } => {
                summary.record(RunWarning::RotationConflict {
                    source: self.label.clone(),
                    hosts,
                    key_type,
                    previous_fingerprint,
                    kept_fingerprint,
                });
            }
        }
    }
}

/// 从文本块收集候选行
fn collect_lines(
    kind: SourceKind,
    label: String,
    text: &str,
    summary: &mut RunSummary,
) -> SourceStore {
    let mut source = SourceStore::empty(kind, label);

    for line in text.lines() {
        if is_skippable(line) {
            continue;
        }
        match parse_line(line) {
            Ok(entry) => source.add_entry(entry, summary),
            Err(failure) => {
                summary.record(RunWarning::ParseFailure {
                    source: source.label.clone(),
                    reason: failure.reason,
                    raw_line: failure.raw_line,
                });
            }
        }
    }

    debug!(
        "[{}] loaded {} entries, {} revoked",
        source.label,
        source.store.len(),
        source.revoked.len()
    );
    source
}

/// 加载静态文件来源
/// 文件不可读是配置层面的硬错误，而不是坏行
pub async fn load_file_source(
    path: &std::path::Path,
    summary: &mut RunSummary,
) -> Result<SourceStore, ReconcileError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ReconcileError::Source(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(collect_lines(
        SourceKind::File,
        format!("file:{}", path.display()),
        &text,
        summary,
    ))
}

/// 加载内联 secret 文本来源
pub fn load_inline_source(index: usize, text: &str, summary: &mut RunSummary) -> SourceStore {
    collect_lines(
        SourceKind::Secret,
        format!("secret:{}", index),
        text,
        summary,
    )
}
