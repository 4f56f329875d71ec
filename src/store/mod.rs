// 主机密钥存储模块
//
// 模块结构:
// - entry: 数据模型 (HostKeyEntry, KeyType, Marker, Identity)
// - parser: known_hosts 行解析 (parse_line, ParseFailure)
// - source: 各来源加载器 (SourceStore, 静态文件 / 内联文本 / 扫描结果)
// - merge: 按优先级合并与去重、轮换冲突、吊销抑制
// - validate: 安装前的不变量校验

pub mod entry;
pub mod merge;
pub mod parser;
pub mod source;
pub mod validate;

// 公开导出
pub use entry::{HostKeyEntry, Identity, KeyType, Marker};
pub use merge::merge_sources;
pub use parser::{is_skippable, parse_line, ParseFailure};
pub use source::{load_file_source, load_inline_source, SourceStore};
pub use validate::validate_store;

/// 条目插入结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 新身份，直接加入
    Added,
    /// 同身份不同密钥材料，旧条目被替换
    Replaced {
        /// 被替换条目的指纹
        previous_fingerprint: String,
    },
    /// 同身份同材料的完全重复，忽略
    Duplicate,
}

/// 按身份键去重的主机密钥集合
/// 插入顺序保留以便 diff，序列化时按主机名模式排序保证确定性
#[derive(Clone, Debug, Default)]
pub struct HostKeyStore {
    entries: Vec<HostKeyEntry>,
}

impl HostKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HostKeyEntry] {
        &self.entries
    }

    /// 按身份键查找
    #[allow(dead_code)]
    pub fn get(&self, identity: &Identity) -> Option<&HostKeyEntry> {
        self.entries.iter().find(|e| e.identity() == *identity)
    }

    /// 插入条目；同身份已存在时后插入者生效
    pub fn insert(&mut self, entry: HostKeyEntry) -> InsertOutcome {
        let identity = entry.identity();
        if let Some(pos) = self.entries.iter().position(|e| e.identity() == identity) {
            if self.entries[pos].key_material == entry.key_material {
                return InsertOutcome::Duplicate;
            }
            let previous_fingerprint = self.entries[pos].fingerprint.clone();
            self.entries[pos] = entry;
            InsertOutcome::Replaced {
                previous_fingerprint,
            }
        } else {
            self.entries.push(entry);
            InsertOutcome::Added
        }
    }

    /// 移除指定身份的条目
    pub fn remove(&mut self, identity: &Identity) -> Option<HostKeyEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.identity() == *identity)?;
        Some(self.entries.remove(pos))
    }

    /// 序列化为规范文件内容
    /// 按 (主机名模式, 算法) 排序，每行以 LF 结尾
    pub fn to_file_contents(&self) -> String {
        let mut sorted: Vec<&HostKeyEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            a.hosts
                .cmp(&b.hosts)
                .then_with(|| a.algorithm.cmp(&b.algorithm))
        });

        let mut contents = String::new();
        for entry in sorted {
            contents.push_str(&entry.to_line());
            contents.push('\n');
        }
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const ED25519_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAfuCHKVTjquxvt6CM6tdG4SLp1Btn/nOeHHE5UOzRdf";

    fn entry(hosts: &str, b64: &str) -> HostKeyEntry {
        parse_line(&format!("{} ssh-ed25519 {}", hosts, b64)).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = HostKeyStore::new();
        assert_eq!(store.insert(entry("host1", ED25519_A)), InsertOutcome::Added);
        assert_eq!(store.len(), 1);

        let identity = Identity {
            hosts: "host1".to_string(),
            key_type: KeyType::Ed25519,
        };
        assert!(store.get(&identity).is_some());
    }

    #[test]
    fn test_insert_duplicate_is_ignored() {
        let mut store = HostKeyStore::new();
        store.insert(entry("host1", ED25519_A));
        assert_eq!(
            store.insert(entry("host1", ED25519_A)),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_rotation_keeps_later_entry() {
        let mut store = HostKeyStore::new();
        let first = entry("host1", ED25519_A);
        let first_fingerprint = first.fingerprint.clone();
        store.insert(first);

        let outcome = store.insert(entry("host1", ED25519_B));
        assert_eq!(
            outcome,
            InsertOutcome::Replaced {
                previous_fingerprint: first_fingerprint,
            }
        );
        assert_eq!(store.len(), 1);

        let identity = Identity {
            hosts: "host1".to_string(),
            key_type: KeyType::Ed25519,
        };
        let kept = store.get(&identity).unwrap();
        assert_eq!(kept.to_line(), format!("host1 ssh-ed25519 {}", ED25519_B));
    }

    #[test]
    fn test_serialization_is_sorted() {
        let mut store = HostKeyStore::new();
        store.insert(entry("zulu.example.com", ED25519_A));
        store.insert(entry("alpha.example.com", ED25519_B));

        let contents = store.to_file_contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("alpha.example.com "));
        assert!(lines[1].starts_with("zulu.example.com "));
        assert!(contents.ends_with('\n'));
    }
}
