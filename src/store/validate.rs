// 合并结果的安装前校验
//
// 任一不变量被违反都是运行级硬错误：损坏的 known_hosts 永远不会被安装

use std::collections::HashSet;

use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;

use super::entry::Identity;
use super::HostKeyStore;

/// 校验合并后的存储
/// 返回全部违反项，调用方据此拒绝安装
pub fn validate_store(store: &HostKeyStore, allow_empty: bool) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    if store.is_empty() && !allow_empty {
        violations.push("merged store is empty and --allow-empty was not set".to_string());
    }

    let mut seen: HashSet<Identity> = HashSet::new();
    for entry in store.entries() {
        let identity = entry.identity();

        if entry.hosts.is_empty() {
            violations.push(format!(
                "entry with fingerprint {} has an empty hostname pattern",
                entry.fingerprint
            ));
        }

        if !seen.insert(identity.clone()) {
            violations.push(format!("duplicate identity {} in merged store", identity));
        }

        // 重新解码并重算指纹，确认密钥材料未被破坏
        match PublicKey::from_bytes(&entry.key_material) {
            Ok(key) => {
                if key.algorithm().as_str() != entry.algorithm {
                    violations.push(format!(
                        "entry {} declares {} but key material is {}",
                        identity,
                        entry.algorithm,
                        key.algorithm().as_str()
                    ));
                }
                let derived = key.fingerprint(HashAlg::Sha256).to_string();
                if derived != entry.fingerprint {
                    violations.push(format!(
                        "entry {} fingerprint mismatch: stored {}, derived {}",
                        identity, entry.fingerprint, derived
                    ));
                }
            }
            Err(e) => {
                violations.push(format!("entry {} has undecodable key material: {}", identity, e));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::parse_line;

    const ED25519_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const ED25519_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAfuCHKVTjquxvt6CM6tdG4SLp1Btn/nOeHHE5UOzRdf";

    #[test]
    fn test_valid_store_passes() {
        let mut store = HostKeyStore::new();
        store.insert(parse_line(&format!("host1 ssh-ed25519 {}", ED25519_A)).unwrap());
        store.insert(parse_line(&format!("host2 ssh-ed25519 {}", ED25519_B)).unwrap());
        assert!(validate_store(&store, false).is_ok());
    }

    #[test]
    fn test_empty_store_rejected_unless_allowed() {
        let store = HostKeyStore::new();
        assert!(validate_store(&store, false).is_err());
        assert!(validate_store(&store, true).is_ok());
    }

    #[test]
    fn test_corrupted_material_is_caught() {
        let mut store = HostKeyStore::new();
        let mut entry = parse_line(&format!("host1 ssh-ed25519 {}", ED25519_A)).unwrap();
        entry.key_material.truncate(8);
        store.insert(entry);

        let violations = validate_store(&store, false).unwrap_err();
        assert!(violations.iter().any(|v| v.contains("undecodable")));
    }

    #[test]
    fn test_fingerprint_tampering_is_caught() {
        let mut store = HostKeyStore::new();
        let mut entry = parse_line(&format!("host1 ssh-ed25519 {}", ED25519_A)).unwrap();
        entry.fingerprint = "SHA256:forged".to_string();
        store.insert(entry);

        let violations = validate_store(&store, false).unwrap_err();
        assert!(violations.iter().any(|v| v.contains("fingerprint mismatch")));
    }

    #[test]
    fn test_empty_hostname_is_caught() {
        let mut store = HostKeyStore::new();
        let mut entry = parse_line(&format!("host1 ssh-ed25519 {}", ED25519_A)).unwrap();
        entry.hosts = String::new();
        store.insert(entry);

        let violations = validate_store(&store, false).unwrap_err();
        assert!(violations.iter().any(|v| v.contains("empty hostname")));
    }
}
