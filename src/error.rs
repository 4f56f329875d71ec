// 调和运行错误类型定义

use thiserror::Error;

/// 调和运行的致命错误
/// 逐行/逐主机的可恢复问题不走这里，而是记录到 RunSummary
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 源读取错误（静态文件不可读等）
    #[error("Source error: {0}")]
    Source(String),

    /// 校验失败：合并结果违反不变量，拒绝安装
    #[error("Validation failed with {} violation(s)", .0.len())]
    Validation(Vec<String>),

    /// 安装失败：目标文件保持原样
    #[error("Install failed: {0}")]
    Install(String),
}
