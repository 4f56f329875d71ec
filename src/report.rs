// 调和运行报告
//
// 可恢复问题（解析失败、轮换冲突、扫描失败、吊销抑制）逐条记录，
// 运行无论成败都能汇报尝试了什么、成功了什么、跳过了什么

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::store::entry::KeyType;

/// 运行期间记录的可恢复告警
#[derive(Clone, Debug)]
pub enum RunWarning {
    /// 某来源中的一行无法解析
    ParseFailure {
        source: String,
        reason: String,
        raw_line: String,
    },
    /// 同一来源内同身份出现不同密钥材料，保留后出现者
    RotationConflict {
        source: String,
        hosts: String,
        key_type: KeyType,
        previous_fingerprint: String,
        kept_fingerprint: String,
    },
    /// 扫描失败但配置了回退密钥，已代入回退条目
    ScanFallback { host: String, reason: String },
    /// 扫描失败且无回退密钥，该主机缺席输出
    ScanMissing { host: String, reason: String },
    /// 身份被 @revoked 标记抑制，不出现在输出中
    RevokedSuppressed { hosts: String, key_type: KeyType },
}

impl std::fmt::Display for RunWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailure {
                source,
                reason,
                raw_line,
            } => write!(f, "[{}] unparsable line ({}): {:?}", source, reason, raw_line),
            Self::RotationConflict {
                source,
                hosts,
                key_type,
                previous_fingerprint,
                kept_fingerprint,
            } => write!(
                f,
                "[{}] rotation conflict for {} ({}): {} replaced by {}",
                source, hosts, key_type, previous_fingerprint, kept_fingerprint
            ),
            Self::ScanFallback { host, reason } => {
                write!(f, "scan of {} failed ({}), fallback key substituted", host, reason)
            }
            Self::ScanMissing { host, reason } => {
                write!(f, "scan of {} failed ({}), no fallback configured", host, reason)
            }
            Self::RevokedSuppressed { hosts, key_type } => {
                write!(f, "{} ({}) suppressed by @revoked marker", hosts, key_type)
            }
        }
    }
}

/// 单次调和运行的汇总
#[derive(Debug)]
pub struct RunSummary {
    /// 运行开始时间
    pub started_at: DateTime<Local>,
    /// 写入目标文件的条目数
    pub entries_written: usize,
    /// 解析失败的行数
    pub parse_failures: usize,
    /// 轮换冲突次数
    pub rotation_conflicts: usize,
    /// 有回退密钥的扫描失败数
    pub scan_failed_with_fallback: usize,
    /// 无回退密钥的扫描失败数
    pub scan_failed_without_fallback: usize,
    /// 被吊销标记抑制的身份数
    pub revoked_suppressed: usize,
    /// 全部告警明细
    pub warnings: Vec<RunWarning>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            entries_written: 0,
            parse_failures: 0,
            rotation_conflicts: 0,
            scan_failed_with_fallback: 0,
            scan_failed_without_fallback: 0,
            revoked_suppressed: 0,
            warnings: Vec::new(),
        }
    }

    /// 记录一条告警并更新对应计数
    pub fn record(&mut self, warning: RunWarning) {
        match &warning {
            RunWarning::ParseFailure { .. } => self.parse_failures += 1,
            RunWarning::RotationConflict { .. } => self.rotation_conflicts += 1,
            RunWarning::ScanFallback { .. } => self.scan_failed_with_fallback += 1,
            RunWarning::ScanMissing { .. } => self.scan_failed_without_fallback += 1,
            RunWarning::RevokedSuppressed { .. } => self.revoked_suppressed += 1,
        }
        warn!("[Reconcile] {}", warning);
        self.warnings.push(warning);
    }

    /// 输出运行汇总日志
    pub fn log_outcome(&self) {
        info!(
            "[Reconcile] Run started {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        info!(
            "[Reconcile] Summary: {} entries written, {} parse failures, {} rotation conflicts",
            self.entries_written, self.parse_failures, self.rotation_conflicts
        );
        info!(
            "[Reconcile] Scan failures: {} with fallback, {} without fallback; {} revoked suppressions",
            self.scan_failed_with_fallback,
            self.scan_failed_without_fallback,
            self.revoked_suppressed
        );
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
