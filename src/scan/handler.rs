// 扫描用 Handler 实现
// 实现 russh::client::Handler trait，只采集服务器公钥

use russh::keys::PublicKey;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::debug;

/// 密钥采集 Handler
/// 在 check_server_key 回调里把服务器公钥发回扫描器，随后拒绝握手继续：
/// 扫描从不认证、从不建立会话
pub struct ScanHandler {
    /// 采集到的公钥通过此通道送出（只发送一次）
    key_tx: Option<oneshot::Sender<PublicKey>>,
    /// 目标主机名（用于日志）
    host: String,
}

impl ScanHandler {
    pub fn new(key_tx: oneshot::Sender<PublicKey>, host: String) -> Self {
        Self {
            key_tx: Some(key_tx),
            host,
        }
    }
}

impl russh::client::Handler for ScanHandler {
    type Error = russh::Error;

    /// 采集服务器公钥并中止握手
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(russh::keys::ssh_key::HashAlg::Sha256);
        debug!(
            "[Scan] {} presented {} key, fingerprint {}",
            self.host,
            server_public_key.algorithm(),
            fingerprint
        );

        if let Some(tx) = self.key_tx.take() {
            let _ = tx.send(server_public_key.clone());
        }

        // 返回 false 中止连接：密钥已拿到，无需继续
        async { Ok(false) }
    }
}
