//! 存储协作者契约
//!
//! 真实实现（对象存储客户端）在本仓库之外；契约要求按工件身份
//! 幂等——同一个工件重复投递必须得到相同的确认，这是至少一次
//! 内部语义在协作者边界被去重成恰好一次的前提。

use crate::store::QueueItem;
use thiserror::Error;

/// 上传协作者失败（对该次尝试是局部的，由队列退避重试）
#[derive(Error, Debug)]
#[error("Upload collaborator failure: {0}")]
pub struct UploadError(pub String);

/// 投递确认
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfirmation {
    /// 远端可访问的 URL（协作者可能不提供）
    pub remote_url: Option<String>,
}

/// 存储上传协作者契约
pub trait Uploader: Send {
    /// 投递一个工件；必须按工件身份幂等
    fn upload(&mut self, item: &QueueItem) -> Result<DeliveryConfirmation, UploadError>;
}

/// Mock 上传器（可脚本化失败次数）
#[cfg(any(test, feature = "mock"))]
pub struct MockUploader {
    fail_first: u32,
    failures_seen: u32,
    delivered: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(any(test, feature = "mock"))]
impl MockUploader {
    /// 总是成功的 mock
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// 前 `n` 次调用失败，之后成功
    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            failures_seen: 0,
            delivered: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// 已确认投递的工件 ID 列表（跨线程观察）
    pub fn delivered_log(&self) -> std::sync::Arc<std::sync::Mutex<Vec<String>>> {
        self.delivered.clone()
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
impl Uploader for MockUploader {
    fn upload(&mut self, item: &QueueItem) -> Result<DeliveryConfirmation, UploadError> {
        if self.failures_seen < self.fail_first {
            self.failures_seen += 1;
            return Err(UploadError("mock network outage".to_string()));
        }
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(item.id.clone());
        Ok(DeliveryConfirmation {
            remote_url: Some(format!("mock://uploads/{}", item.id)),
        })
    }
}
