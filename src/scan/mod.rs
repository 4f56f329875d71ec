// 在线扫描模块
//
// 模块结构:
// - handler: russh Handler 实现，采集服务器公钥
// - scanner: 并发扫描与结果汇集 (ScanTarget, ScanResult)

pub mod handler;
pub mod scanner;

// 公开导出
pub use scanner::{collect_into_source, scan_all, ScanResult, ScanTarget};
