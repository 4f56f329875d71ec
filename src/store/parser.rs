// known_hosts 行解析器
//
// 文法: [marker] hostname_patterns key_type base64_key [comment]
// hostname_patterns 为逗号分隔的主机名/IP/哈希 token 列表，
// 哈希形式 (`|1|salt|hash`) 作为不透明模式接受，从不反解

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use thiserror::Error;

use super::entry::{HostKeyEntry, KeyType, Marker};

/// 单行解析失败
/// 可恢复：记录原因和原始行后继续处理其余行
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}: {raw_line:?}")]
pub struct ParseFailure {
    /// 失败原因
    pub reason: String,
    /// 原始行内容
    pub raw_line: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>, raw_line: &str) -> Self {
        Self {
            reason: reason.into(),
            raw_line: raw_line.to_string(),
        }
    }
}

/// 该行是否应当跳过（空行或 `#` 注释行）
pub fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// 解析单条 known_hosts 行
pub fn parse_line(line: &str) -> Result<HostKeyEntry, ParseFailure> {
    let mut fields = line.split_whitespace();

    let first = fields
        .next()
        .ok_or_else(|| ParseFailure::new("empty line", line))?;

    // 可选 marker 字段以 @ 开头
    let (marker, hosts) = if let Some(stripped) = first.strip_prefix('@') {
        let marker = Marker::from_token(first)
            .ok_or_else(|| ParseFailure::new(format!("unknown marker @{}", stripped), line))?;
        let hosts = fields
            .next()
            .ok_or_else(|| ParseFailure::new("missing hostname field", line))?;
        (Some(marker), hosts)
    } else {
        (None, first)
    };

    let type_token = fields
        .next()
        .ok_or_else(|| ParseFailure::new("missing key type field", line))?;
    let key_type = KeyType::from_token(type_token)
        .ok_or_else(|| ParseFailure::new(format!("unsupported key type {}", type_token), line))?;

    let encoded = fields
        .next()
        .ok_or_else(|| ParseFailure::new("missing key material field", line))?;

    // 剩余字段整体作为注释
    let rest: Vec<&str> = fields.collect();
    let comment = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    let key_material = B64
        .decode(encoded)
        .map_err(|e| ParseFailure::new(format!("invalid base64 key: {}", e), line))?;

    // 结构化解码同时校验算法一致性与密钥长度
    let key = PublicKey::from_bytes(&key_material)
        .map_err(|e| ParseFailure::new(format!("invalid key material: {}", e), line))?;
    if key.algorithm().as_str() != type_token {
        return Err(ParseFailure::new(
            format!(
                "key material is {} but line declares {}",
                key.algorithm().as_str(),
                type_token
            ),
            line,
        ));
    }

    Ok(HostKeyEntry {
        hosts: hosts.to_string(),
        key_type,
        algorithm: type_token.to_string(),
        key_material,
        fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        marker,
        comment,
    })
}
