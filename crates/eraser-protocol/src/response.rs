//! 命令结果和状态快照负载
//!
//! 每条命令返回一个结构化结果：成功/失败加上机器可读的负载；
//! `status`/`scheduler_status` 返回完整的状态快照。

use crate::command::CorrelationId;
use serde::Serialize;

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// 成功
    Success {
        /// 人类可读的结果说明
        message: String,
        /// 机器可读的附加负载（如状态快照）
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<serde_json::Value>,
    },
    /// 忙槽已被占用，命令被立即拒绝（不排队、不合并）
    Busy,
    /// 执行失败
    Failure {
        /// 失败原因
        reason: String,
    },
}

impl CommandOutcome {
    /// 无附加负载的成功结果
    pub fn success(message: impl Into<String>) -> Self {
        CommandOutcome::Success {
            message: message.into(),
            detail: None,
        }
    }

    /// 带负载的成功结果
    pub fn success_with(message: impl Into<String>, detail: serde_json::Value) -> Self {
        CommandOutcome::Success {
            message: message.into(),
            detail: Some(detail),
        }
    }

    /// 失败结果
    pub fn failure(reason: impl Into<String>) -> Self {
        CommandOutcome::Failure {
            reason: reason.into(),
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }
}

/// 发布到响应主题的完整响应（按关联 ID 匹配）
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    /// 关联 ID
    pub correlation_id: CorrelationId,
    /// 命令动词（线上字符串形式）
    pub command: String,
    /// 执行结果
    #[serde(flatten)]
    pub outcome: CommandOutcome,
}

/// 电机状态摘要（进入状态快照）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MotorSummary {
    /// 航位推算的累计步数
    pub steps: i64,
    /// 当前半步相位索引（0..8）
    pub phase: u8,
}

/// 调度器状态摘要
///
/// 调度器是外部协作者，这里只定义快照形状。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    /// 调度器是否在运行
    pub running: bool,
    /// 活动任务数
    pub active_jobs: usize,
    /// 缓存的计划数
    pub cached_schedules: usize,
}

/// 系统状态快照
///
/// `status` 命令的负载，也在每次状态转换后发布到状态主题。
/// 只读，生成时不持有任何长锁。
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// 设备状态名（如 "idle", "erasing", "stopped"）
    pub device_state: String,
    /// 电机摘要
    pub motor: MotorSummary,
    /// 上传队列深度
    pub queue_depth: usize,
    /// 会话是否激活
    pub session_active: bool,
    /// 当前会话 ID（无会话时为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// 调度器摘要
    pub scheduler: SchedulerSummary,
}

impl StatusSnapshot {
    /// 启动时的初始快照
    pub fn initial() -> Self {
        Self {
            device_state: "idle".to_string(),
            motor: MotorSummary::default(),
            queue_depth: 0,
            session_active: false,
            session_id: None,
            scheduler: SchedulerSummary::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, CorrelationId};

    #[test]
    fn test_outcome_serialization_shape() {
        let ok = CommandOutcome::success("Image captured successfully");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["result"], "success");
        assert_eq!(json["message"], "Image captured successfully");
        assert!(json.get("detail").is_none());

        let busy = serde_json::to_value(CommandOutcome::Busy).unwrap();
        assert_eq!(busy["result"], "busy");

        let fail = serde_json::to_value(CommandOutcome::failure("camera offline")).unwrap();
        assert_eq!(fail["result"], "failure");
        assert_eq!(fail["reason"], "camera offline");
    }

    #[test]
    fn test_response_is_keyed_by_correlation_id() {
        let response = CommandResponse {
            correlation_id: CorrelationId::provided("mqtt-42"),
            command: CommandKind::Erase.as_str().to_string(),
            outcome: CommandOutcome::Busy,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["correlation_id"], "mqtt-42");
        assert_eq!(json["command"], "erase");
        assert_eq!(json["result"], "busy");
    }

    #[test]
    fn test_initial_snapshot() {
        let snap = StatusSnapshot::initial();
        assert_eq!(snap.device_state, "idle");
        assert_eq!(snap.queue_depth, 0);
        assert!(!snap.session_active);
    }
}
