// 调和运行配置
//
// 配置可来自 JSON 配置文件（默认位置或 --config 指定），CLI 标志覆盖文件值

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// 来源类别，决定合并时的优先级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// 在线扫描结果
    Scan,
    /// 静态 known_hosts 文件
    File,
    /// 内联 secret 覆盖文本
    Secret,
}

impl SourceKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "scan" => Some(Self::Scan),
            "file" => Some(Self::File),
            "secret" => Some(Self::Secret),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::File => "file",
            Self::Secret => "secret",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 默认优先级：扫描 < 静态文件 < secret 覆盖
pub fn default_precedence() -> Vec<SourceKind> {
    vec![SourceKind::Scan, SourceKind::File, SourceKind::Secret]
}

fn default_scan_timeout() -> u64 {
    10
}

fn default_concurrency() -> usize {
    8
}

fn default_run_timeout() -> u64 {
    60
}

/// 在线扫描配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 扫描目标，`host[:port]` 形式
    #[serde(default)]
    pub targets: Vec<String>,
    /// 单主机超时（秒）
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    /// 并发上限
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 扫描阶段运行级超时（秒），到点后未完成的目标按超时处理
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// 主机名 -> `<key_type> <base64>` 回退密钥
    #[serde(default)]
    pub fallback_keys: HashMap<String, String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            timeout_secs: default_scan_timeout(),
            concurrency: default_concurrency(),
            run_timeout_secs: default_run_timeout(),
            fallback_keys: HashMap::new(),
        }
    }
}

/// 一次调和运行的完整配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// 目标 known_hosts 路径（显式参数，不隐式指向 ~/.ssh/known_hosts）
    #[serde(default)]
    pub destination: PathBuf,
    /// 静态文件来源
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// 内联 secret 文本来源
    #[serde(default)]
    pub secrets: Vec<String>,
    /// 扫描配置
    #[serde(default)]
    pub scan: ScanConfig,
    /// 来源优先级，从低到高
    #[serde(default = "default_precedence")]
    pub precedence: Vec<SourceKind>,
    /// 允许安装空文件
    #[serde(default)]
    pub allow_empty: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::new(),
            files: Vec::new(),
            secrets: Vec::new(),
            scan: ScanConfig::default(),
            precedence: default_precedence(),
            allow_empty: false,
        }
    }
}

impl ReconcileConfig {
    /// 从指定路径加载配置文件
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path).context("无法读取配置文件")?;
        let config: Self = serde_json::from_str(&content).context("无法解析配置文件")?;
        Ok(config)
    }

    /// 默认配置文件路径
    /// macOS: ~/Library/Application Support/hostsync/config.json
    /// Linux: ~/.config/hostsync/config.json
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("hostsync").join("config.json"))
    }

    /// 若默认位置存在配置文件则加载，否则返回默认配置
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// 解析 `scan,file,secret` 形式的优先级声明（从低到高）
/// 未提及的类别按默认相对顺序排在最低优先级
pub fn parse_precedence(spec: &str) -> Result<Vec<SourceKind>, String> {
    let mut listed = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let kind = SourceKind::from_token(token)
            .ok_or_else(|| format!("unknown source kind {:?}", token))?;
        if listed.contains(&kind) {
            return Err(format!("source kind {} listed twice", kind));
        }
        listed.push(kind);
    }
    if listed.is_empty() {
        return Err("empty precedence list".to_string());
    }

    let mut precedence: Vec<SourceKind> = default_precedence()
        .into_iter()
        .filter(|k| !listed.contains(k))
        .collect();
    precedence.extend(listed);
    Ok(precedence)
}
