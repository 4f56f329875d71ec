// 多来源合并与去重
//
// 来源按已声明的优先级从低到高传入；每个身份键保留最高优先级来源的条目。
// 任何来源中的 @revoked 标记无条件胜出：该身份被整体从输出中抑制，
// 吊销行自身也不会作为可连接密钥出现

use std::collections::HashSet;

use tracing::debug;

use crate::report::{RunSummary, RunWarning};

use super::entry::Identity;
use super::source::SourceStore;
use super::{HostKeyStore, InsertOutcome};

/// 合并 N 个来源存储为一个
/// `sources` 必须已按优先级从低到高排列
pub fn merge_sources(sources: &[SourceStore], summary: &mut RunSummary) -> HostKeyStore {
    let mut merged = HostKeyStore::new();

    // 先收集所有来源的吊销身份
    let mut revoked: HashSet<Identity> = HashSet::new();
    for source in sources {
        for entry in &source.revoked {
            revoked.insert(entry.identity());
        }
    }

    for source in sources {
        for entry in source.store.entries() {
            match merged.insert(entry.clone()) {
                InsertOutcome::Replaced { .. } => {
                    // 跨来源替换是正常的优先级覆盖，不算轮换冲突
                    debug!(
                        "[Merge] {} overrides lower-precedence entry for {}",
                        source.label, entry.hosts
                    );
                }
                InsertOutcome::Added | InsertOutcome::Duplicate => {}
            }
        }
    }

    // 吊销身份整体抑制
    let mut suppressed: Vec<&Identity> = revoked.iter().collect();
    suppressed.sort_by(|a, b| a.hosts.cmp(&b.hosts).then_with(|| a.key_type.cmp(&b.key_type)));
    for identity in suppressed {
        merged.remove(identity);
        summary.record(RunWarning::RevokedSuppressed {
            hosts: identity.hosts.clone(),
            key_type: identity.key_type,
        });
    }

    merged
}
