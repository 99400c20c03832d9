//! 外部协作者契约
//!
//! 相机、状态发布、数据库和调度器都是能力接口：生产实现和测试
//! 实现可互换，启动时注入调度器，而不是运行时动态查找。
//!
//! 发布接口是 fire-and-forget 的：实现必须立即返回（通道
//! `try_send` 纪律），失败自行记日志，绝不阻塞状态转换。

use eraser_protocol::{CommandResponse, SchedulerSummary, StatusSnapshot};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// 拍摄产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// 工件文件路径（随后移交上传队列）
    pub path: PathBuf,
}

/// 拍摄协作者失败（局部于本次调用）
#[derive(Error, Debug)]
#[error("Capture collaborator failure: {0}")]
pub struct CameraError(pub String);

/// 拍摄协作者契约
pub trait Camera: Send + Sync {
    /// 同步拍摄一张照片
    fn capture(&self) -> Result<Artifact, CameraError>;
}

impl<T: Camera + ?Sized> Camera for std::sync::Arc<T> {
    fn capture(&self) -> Result<Artifact, CameraError> {
        (**self).capture()
    }
}

/// 状态发布协作者契约（broker 客户端在仓库之外）
pub trait StatusPublisher: Send + Sync {
    /// 发布状态快照到状态主题
    fn publish_status(&self, snapshot: &StatusSnapshot);
    /// 发布命令结果到响应主题（按关联 ID 匹配）
    fn publish_response(&self, response: &CommandResponse);
    /// 发布会话切换通知到会话主题
    fn publish_session(&self, active: bool);
}

/// 持久化协作者失败（记日志，绝不致命于设备运行）
#[derive(Error, Debug)]
#[error("Persistence collaborator failure: {0}")]
pub struct EventStoreError(pub String);

/// 持久化协作者契约（远端数据库）
pub trait EventStore: Send + Sync {
    /// 新建会话，返回会话 ID
    fn create_session(&self) -> Result<String, EventStoreError>;
    /// 结束会话
    fn end_session(&self, id: &str) -> Result<(), EventStoreError>;
    /// 追加一条事件日志（fire-and-forget，失败自行记日志）
    fn record_event(&self, event: &str, detail: &str);
}

/// 调度器协作者失败
#[derive(Error, Debug)]
#[error("Scheduler collaborator failure: {0}")]
pub struct SchedulerError(pub String);

/// 调度器协作者契约
///
/// 调度器把日历规则翻译成命令、从命令通道注入，调度器本体在
/// 仓库之外；这里只暴露重载和状态查询。
pub trait SchedulerHandle: Send + Sync {
    /// 重新加载计划，返回计划数
    fn reload(&self) -> Result<usize, SchedulerError>;
    /// 调度器状态摘要
    fn status(&self) -> SchedulerSummary;
}

/// 仅记日志的发布器（未接 broker 时的默认实现）
#[derive(Debug, Default)]
pub struct LogPublisher;

impl StatusPublisher for LogPublisher {
    fn publish_status(&self, snapshot: &StatusSnapshot) {
        debug!(state = snapshot.device_state, "status update");
    }

    fn publish_response(&self, response: &CommandResponse) {
        debug!(correlation_id = %response.correlation_id, command = response.command, "command response");
    }

    fn publish_session(&self, active: bool) {
        debug!(active, "session update");
    }
}

/// 空调度器（未接外部调度器时的默认实现）
#[derive(Debug, Default)]
pub struct NullScheduler;

impl SchedulerHandle for NullScheduler {
    fn reload(&self) -> Result<usize, SchedulerError> {
        Ok(0)
    }

    fn status(&self) -> SchedulerSummary {
        SchedulerSummary::default()
    }
}

/// 内存事件存储（未接数据库时的默认实现）
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    next_session: std::sync::atomic::AtomicU64,
}

impl EventStore for MemoryEventStore {
    fn create_session(&self) -> Result<String, EventStoreError> {
        let id = self
            .next_session
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        Ok(format!("session-{id}"))
    }

    fn end_session(&self, _id: &str) -> Result<(), EventStoreError> {
        Ok(())
    }

    fn record_event(&self, event: &str, detail: &str) {
        debug!(event, detail, "device event");
    }
}

/// Mock 协作者（测试用）
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mock 相机：把占位图片写入指定目录，可脚本化失败
    pub struct MockCamera {
        dir: PathBuf,
        shots: AtomicU32,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MockCamera {
        /// 创建 mock 相机，工件写入 `dir`
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self {
                dir: dir.into(),
                shots: AtomicU32::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }

        /// 让后续 capture 全部失败
        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::Release);
        }

        /// 成功拍摄的次数
        pub fn shot_count(&self) -> u32 {
            self.shots.load(Ordering::Relaxed)
        }
    }

    impl Camera for MockCamera {
        fn capture(&self) -> Result<Artifact, CameraError> {
            if self.fail.load(Ordering::Acquire) {
                return Err(CameraError("mock camera offline".to_string()));
            }
            let shot = self.shots.fetch_add(1, Ordering::Relaxed) + 1;
            let path = self.dir.join(format!("mock_shot_{shot}.jpg"));
            std::fs::create_dir_all(&self.dir)
                .and_then(|_| std::fs::write(&path, b"mock-jpeg"))
                .map_err(|e| CameraError(e.to_string()))?;
            Ok(Artifact { path })
        }
    }

    /// 录制发布器：把所有发布收进内存供断言
    #[derive(Default)]
    pub struct RecordingPublisher {
        statuses: Mutex<Vec<StatusSnapshot>>,
        responses: Mutex<Vec<CommandResponse>>,
        sessions: Mutex<Vec<bool>>,
    }

    impl RecordingPublisher {
        /// 创建共享的录制发布器
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// 已发布的响应副本
        pub fn responses(&self) -> Vec<CommandResponse> {
            self.responses.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// 已发布的状态快照副本
        pub fn statuses(&self) -> Vec<StatusSnapshot> {
            self.statuses.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// 已发布的会话通知副本
        pub fn sessions(&self) -> Vec<bool> {
            self.sessions.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    impl StatusPublisher for Arc<RecordingPublisher> {
        fn publish_status(&self, snapshot: &StatusSnapshot) {
            self.statuses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(snapshot.clone());
        }

        fn publish_response(&self, response: &CommandResponse) {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(response.clone());
        }

        fn publish_session(&self, active: bool) {
            self.sessions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(active);
        }
    }
}
