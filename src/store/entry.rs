// 主机密钥条目数据模型

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;

/// 支持的密钥类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyType {
    Rsa,
    Ed25519,
    Ecdsa,
}

impl KeyType {
    /// 从 known_hosts 行的算法 token 解析密钥类型
    /// ecdsa 的三种曲线归并为同一类型，token 原文保留在条目里用于序列化
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ssh-rsa" => Some(Self::Rsa),
            "ssh-ed25519" => Some(Self::Ed25519),
            "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384" | "ecdsa-sha2-nistp521" => {
                Some(Self::Ecdsa)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
            Self::Ecdsa => "ecdsa",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// known_hosts 行首的标记
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// `@revoked`：该密钥永久不可信任
    Revoked,
    /// `@cert-authority`：CA 公钥
    CertAuthority,
}

impl Marker {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "@revoked" => Some(Self::Revoked),
            "@cert-authority" => Some(Self::CertAuthority),
            _ => None,
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Revoked => "@revoked",
            Self::CertAuthority => "@cert-authority",
        }
    }
}

/// 条目身份键：(主机名模式, 密钥类型)
/// 同一身份下替换密钥材料视为轮换，不是修改
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    pub hosts: String,
    pub key_type: KeyType,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.hosts, self.key_type)
    }
}

/// 一条主机密钥记录
/// key_material 是解码后的 OpenSSH wire 格式公钥，指纹生成后不再变化
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostKeyEntry {
    /// 主机名模式（逗号分隔列表或 `|1|...` 哈希形式，哈希形式视为不透明）
    pub hosts: String,
    /// 密钥类型
    pub key_type: KeyType,
    /// 原始算法 token（如 `ecdsa-sha2-nistp256`），序列化时使用
    pub algorithm: String,
    /// 解码后的公钥字节
    pub key_material: Vec<u8>,
    /// SHA-256 指纹（`SHA256:...` 形式）
    pub fingerprint: String,
    /// 可选标记
    pub marker: Option<Marker>,
    /// 行尾注释
    pub comment: Option<String>,
}

impl HostKeyEntry {
    /// 从扫描得到的服务器公钥构建条目
    pub fn from_public_key(hosts: String, key: &PublicKey) -> Result<Self, String> {
        let algorithm = key.algorithm();
        let key_type = KeyType::from_token(algorithm.as_str())
            .ok_or_else(|| format!("unsupported key algorithm: {}", algorithm.as_str()))?;
        let key_material = key
            .to_bytes()
            .map_err(|e| format!("failed to encode server key: {}", e))?;
        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();

        Ok(Self {
            hosts,
            key_type,
            algorithm: algorithm.as_str().to_string(),
            key_material,
            fingerprint,
            marker: None,
            comment: None,
        })
    }

    /// 条目身份键
    pub fn identity(&self) -> Identity {
        Identity {
            hosts: self.hosts.clone(),
            key_type: self.key_type,
        }
    }

    /// 序列化为规范 known_hosts 行（不含换行符）
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        if let Some(marker) = self.marker {
            line.push_str(marker.as_token());
            line.push(' ');
        }
        line.push_str(&self.hosts);
        line.push(' ');
        line.push_str(&self.algorithm);
        line.push(' ');
        line.push_str(&B64.encode(&self.key_material));
        if let Some(comment) = &self.comment {
            line.push(' ');
            line.push_str(comment);
        }
        line
    }
}
