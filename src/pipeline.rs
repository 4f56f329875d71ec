// 调和流水线
//
// load → parse → merge → validate → install，顺序执行；
// 只有扫描阶段内部并发。校验或安装失败时运行以硬错误收场，
// 但汇总仍然带出，操作者无需重跑即可诊断

use tracing::{debug, info};

use crate::config::{ReconcileConfig, SourceKind};
use crate::error::ReconcileError;
use crate::install::install;
use crate::report::RunSummary;
use crate::scan::{collect_into_source, scan_all, ScanTarget};
use crate::store::{load_file_source, load_inline_source, merge_sources, validate_store, SourceStore};

/// 运行失败：错误与已累计的汇总一并返回
#[derive(Debug)]
pub struct RunFailure {
    pub error: ReconcileError,
    pub summary: RunSummary,
}

/// 执行一次完整的调和运行
pub async fn run(config: &ReconcileConfig) -> Result<RunSummary, RunFailure> {
    let mut summary = RunSummary::new();

    // 阶段 1: 按优先级从低到高加载各来源
    info!("[Reconcile] Loading sources...");
    let sources = match build_sources(config, &mut summary).await {
        Ok(sources) => sources,
        Err(error) => return Err(RunFailure { error, summary }),
    };

    // 阶段 2: 合并去重
    info!("[Reconcile] Merging {} source(s)...", sources.len());
    let merged = merge_sources(&sources, &mut summary);
    debug!("[Reconcile] merged store holds {} entries", merged.len());

    // 阶段 3: 校验，不通过绝不安装
    info!("[Reconcile] Validating merged store...");
    if let Err(violations) = validate_store(&merged, config.allow_empty) {
        return Err(RunFailure {
            error: ReconcileError::Validation(violations),
            summary,
        });
    }

    // 阶段 4: 原子安装
    info!("[Reconcile] Installing to {}...", config.destination.display());
    match install(&merged, &config.destination) {
        Ok(written) => {
            summary.entries_written = written;
            Ok(summary)
        }
        Err(error) => Err(RunFailure { error, summary }),
    }
}

async fn build_sources(
    config: &ReconcileConfig,
    summary: &mut RunSummary,
) -> Result<Vec<SourceStore>, ReconcileError> {
    let mut sources = Vec::new();

    for kind in &config.precedence {
        match kind {
            SourceKind::File => {
                for path in &config.files {
                    sources.push(load_file_source(path, summary).await?);
                }
            }
            SourceKind::Secret => {
                for (index, text) in config.secrets.iter().enumerate() {
                    sources.push(load_inline_source(index, text, summary));
                }
            }
            SourceKind::Scan => {
                if config.scan.targets.is_empty() {
                    continue;
                }
                let mut targets = Vec::new();
                for spec in &config.scan.targets {
                    targets.push(ScanTarget::parse(spec).map_err(ReconcileError::Config)?);
                }
                info!(
                    "[Scan] scanning {} target(s), concurrency {}, per-host timeout {}s",
                    targets.len(),
                    config.scan.concurrency,
                    config.scan.timeout_secs
                );
                let results = scan_all(targets, &config.scan).await;
                sources.push(collect_into_source(results, &config.scan.fallback_keys, summary));
            }
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    const ED25519_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const ED25519_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAfuCHKVTjquxvt6CM6tdG4SLp1Btn/nOeHHE5UOzRdf";
    const ED25519_C: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIIazEu89wgQZ4bqs3d63QSMzYVa0MuJ2e2gKTKqu+UUO";

    fn temp_workdir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        let dir = std::env::temp_dir().join(format!(
            "hostsync-pipeline-{}-{}-{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn base_config(dir: &PathBuf) -> ReconcileConfig {
        ReconcileConfig {
            destination: dir.join("known_hosts"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_secret_overrides_file_for_same_identity() {
        let dir = temp_workdir("precedence");
        let file_path = dir.join("source.txt");
        fs::write(&file_path, format!("host1 ssh-ed25519 {}\n", ED25519_A)).unwrap();

        let mut config = base_config(&dir);
        config.files = vec![file_path];
        config.secrets = vec![format!("host1 ssh-ed25519 {}\n", ED25519_B)];

        let summary = run(&config).await.unwrap();
        assert_eq!(summary.entries_written, 1);

        let contents = fs::read_to_string(&config.destination).unwrap();
        assert_eq!(contents, format!("host1 ssh-ed25519 {}\n", ED25519_B));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_bad_line_is_tolerated_and_counted() {
        let dir = temp_workdir("badline");
        let file_path = dir.join("source.txt");
        fs::write(
            &file_path,
            format!("badhost\nhost1 ssh-ed25519 {}\n", ED25519_A),
        )
        .unwrap();

        let mut config = base_config(&dir);
        config.files = vec![file_path];

        let summary = run(&config).await.unwrap();
        assert_eq!(summary.entries_written, 1);
        assert_eq!(summary.parse_failures, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_revoked_identity_never_reaches_destination() {
        let dir = temp_workdir("revoked");
        let file_path = dir.join("source.txt");
        fs::write(
            &file_path,
            format!(
                "host1 ssh-ed25519 {}\nhost2 ssh-ed25519 {}\n",
                ED25519_A, ED25519_B
            ),
        )
        .unwrap();

        let mut config = base_config(&dir);
        config.files = vec![file_path];
        config.secrets = vec![format!("@revoked host1 ssh-ed25519 {}\n", ED25519_C)];

        let summary = run(&config).await.unwrap();
        assert_eq!(summary.entries_written, 1);
        assert_eq!(summary.revoked_suppressed, 1);

        let contents = fs::read_to_string(&config.destination).unwrap();
        assert!(!contents.contains("host1"));
        assert!(contents.contains("host2"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_empty_result_fails_validation_and_installs_nothing() {
        let dir = temp_workdir("empty");
        let config = base_config(&dir);

        let failure = run(&config).await.unwrap_err();
        assert!(matches!(failure.error, ReconcileError::Validation(_)));
        assert!(!config.destination.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_allow_empty_installs_empty_file() {
        let dir = temp_workdir("allow-empty");
        let mut config = base_config(&dir);
        config.allow_empty = true;

        let summary = run(&config).await.unwrap();
        assert_eq!(summary.entries_written, 0);
        assert_eq!(fs::read_to_string(&config.destination).unwrap(), "");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_destination() {
        let dir = temp_workdir("keep-previous");
        let mut config = base_config(&dir);
        let previous = format!("host1 ssh-ed25519 {}\n", ED25519_A);
        fs::write(&config.destination, &previous).unwrap();

        // 无来源 → 空存储 → 校验失败，旧文件必须原样保留
        config.allow_empty = false;
        let failure = run(&config).await.unwrap_err();
        assert!(matches!(failure.error, ReconcileError::Validation(_)));
        assert_eq!(fs::read_to_string(&config.destination).unwrap(), previous);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_file_is_fatal() {
        let dir = temp_workdir("missing-file");
        let mut config = base_config(&dir);
        config.files = vec![dir.join("does-not-exist.txt")];

        let failure = run(&config).await.unwrap_err();
        assert!(matches!(failure.error, ReconcileError::Source(_)));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_output_is_sorted_across_sources() {
        let dir = temp_workdir("sorted");
        let file_path = dir.join("source.txt");
        fs::write(&file_path, format!("zulu.example ssh-ed25519 {}\n", ED25519_A)).unwrap();

        let mut config = base_config(&dir);
        config.files = vec![file_path];
        config.secrets = vec![format!("alpha.example ssh-ed25519 {}\n", ED25519_B)];

        run(&config).await.unwrap();

        let contents = fs::read_to_string(&config.destination).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].starts_with("alpha.example "));
        assert!(lines[1].starts_with("zulu.example "));

        fs::remove_dir_all(&dir).unwrap();
    }
}
