//! # Eraser Queue
//!
//! 崩溃安全的图片上传队列
//!
//! ## 模块
//!
//! - `store`: 持久日志存储（每个工件一条 JSON 边车记录，fsync 后才算入队）
//! - `backoff`: 指数退避策略
//! - `uploader`: 存储协作者契约 + mock 实现
//! - `worker`: 队列本体（生产者入队 + 消费者线程排空）
//!
//! ## 崩溃恢复契约
//!
//! 每个未投递的工件都能通过扫描队列目录重建：入队在返回成功之前
//! 已把记录落盘（fsync），因此入队后立刻断电也不会丢失。只有外部
//! 存储协作者确认成功后才删除本地工件和记录——从调用方视角恰好
//! 一次，内部是至少一次，由协作者按工件身份去重。
//!
//! 重启恢复时 `attempts` 原样保留（不清零），`next_attempt_at`
//! 立即到期：重启不应给失败项一轮新的快速重试，也不应欠下
//! 崩溃前的退避债。

pub mod backoff;
pub mod store;
pub mod uploader;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use store::{ItemStatus, JournalStore, QueueItem};
#[cfg(any(test, feature = "mock"))]
pub use uploader::MockUploader;
pub use uploader::{DeliveryConfirmation, UploadError, Uploader};
pub use worker::UploadQueue;

use thiserror::Error;

/// 队列统一错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 持久存储故障（磁盘写入失败）
    ///
    /// 对入队操作是致命的：它破坏崩溃恢复保证，必须大声上报，
    /// 不允许静默重试。
    #[error("Durable store failure: {0}")]
    Persistence(#[source] std::io::Error),

    /// 队列目录已被另一个进程锁定
    #[error("Queue directory is locked by another process")]
    DirectoryLocked,

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,
}

impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        QueueError::Persistence(e)
    }
}
