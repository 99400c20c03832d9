//! 命令类型定义模块
//!
//! 提供命令动词、来源标记和关联 ID。`Command` 一旦创建即不可变，
//! 由调度器精确消费一次。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 命令动词
///
/// 与来源无关的统一动词集合，远程消息、按钮和终端产生的命令
/// 在调度器眼中完全相同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 拍摄一张白板照片并入队上传
    Capture,
    /// 执行一次完整的擦除扫掠
    Erase,
    /// 先拍摄后擦除（原子占用忙槽）
    CaptureErase,
    /// 协作式取消当前操作
    Stop,
    /// 读取系统状态快照（只读）
    Status,
    /// 切换会话（开始/结束）
    Session,
    /// 暂停/恢复当前电机操作
    MotorStartPause,
    /// 按累计步数反向驱动，归零位置
    MotorReset,
    /// 重新加载计划任务
    SchedulerReload,
    /// 读取调度器状态（只读）
    SchedulerStatus,
}

impl CommandKind {
    /// 动词的线上字符串形式
    ///
    /// 与远程命令主题上收到的负载逐字对应。
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Capture => "capture",
            CommandKind::Erase => "erase",
            CommandKind::CaptureErase => "capture_erase",
            CommandKind::Stop => "stop",
            CommandKind::Status => "status",
            CommandKind::Session => "session",
            CommandKind::MotorStartPause => "motor_start_pause",
            CommandKind::MotorReset => "motor_reset",
            CommandKind::SchedulerReload => "scheduler_reload",
            CommandKind::SchedulerStatus => "scheduler_status",
        }
    }

    /// 解析线上字符串为动词
    ///
    /// 输入先做小写和去空白归一化。未知动词返回
    /// `ProtocolError::UnknownCommand`，调用方应立即拒绝且不改变任何状态。
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        match normalized.as_str() {
            "capture" => Ok(CommandKind::Capture),
            "erase" => Ok(CommandKind::Erase),
            "capture_erase" => Ok(CommandKind::CaptureErase),
            "stop" => Ok(CommandKind::Stop),
            "status" => Ok(CommandKind::Status),
            "session" => Ok(CommandKind::Session),
            "motor_start_pause" => Ok(CommandKind::MotorStartPause),
            "motor_reset" => Ok(CommandKind::MotorReset),
            "scheduler_reload" => Ok(CommandKind::SchedulerReload),
            "scheduler_status" => Ok(CommandKind::SchedulerStatus),
            _ => Err(ProtocolError::UnknownCommand(normalized)),
        }
    }

    /// 是否占用忙槽（一次只允许一个的长操作）
    pub fn claims_busy_slot(self) -> bool {
        matches!(
            self,
            CommandKind::Capture
                | CommandKind::Erase
                | CommandKind::CaptureErase
                | CommandKind::MotorReset
        )
    }

    /// 是否为只读命令（永不改变状态，总是成功）
    pub fn is_read_only(self) -> bool {
        matches!(self, CommandKind::Status | CommandKind::SchedulerStatus)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 命令来源
///
/// 仅用于日志和关联 ID 标记，调度器对所有来源一视同仁
/// （按钮和远程命令之间没有优先级）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// 远程消息通道
    Mqtt,
    /// 物理按钮
    Button,
    /// 本地终端
    Terminal,
    /// 计划任务调度器（与其他来源共用同一通道，无特殊处理）
    Scheduler,
}

impl CommandSource {
    /// 来源的短标签（用于关联 ID 前缀）
    pub fn tag(self) -> &'static str {
        match self {
            CommandSource::Mqtt => "mqtt",
            CommandSource::Button => "btn",
            CommandSource::Terminal => "term",
            CommandSource::Scheduler => "sched",
        }
    }
}

/// 关联 ID
///
/// 连接一条入站命令和它最终的响应，允许多个远程请求同时在途
/// 并各自匹配到结果。进程内单调递增，带来源标签。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

impl CorrelationId {
    /// 为指定来源生成下一个关联 ID
    pub fn next(source: CommandSource) -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}", source.tag(), seq))
    }

    /// 采用远端提供的关联 ID（远程请求可自带）
    pub fn provided(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// ID 字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一条完整的命令
///
/// 不可变；由输入适配器创建，由调度器精确消费一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// 命令来源
    pub source: CommandSource,
    /// 命令动词
    pub kind: CommandKind,
    /// 关联 ID（响应按此键发布）
    pub correlation_id: CorrelationId,
}

impl Command {
    /// 创建新命令，自动分配关联 ID
    pub fn new(source: CommandSource, kind: CommandKind) -> Self {
        Self {
            source,
            kind,
            correlation_id: CorrelationId::next(source),
        }
    }

    /// 从线上字符串解析命令（远程命令主题的入口）
    pub fn parse(source: CommandSource, raw: &str) -> Result<Self, ProtocolError> {
        Ok(Self::new(source, CommandKind::parse(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_verbs() {
        assert_eq!(CommandKind::parse("capture").unwrap(), CommandKind::Capture);
        assert_eq!(CommandKind::parse("capture_erase").unwrap(), CommandKind::CaptureErase);
        assert_eq!(
            CommandKind::parse("motor_start_pause").unwrap(),
            CommandKind::MotorStartPause
        );
        // 大小写和空白归一化
        assert_eq!(CommandKind::parse("  ERASE \n").unwrap(), CommandKind::Erase);
    }

    #[test]
    fn test_parse_unknown_verb() {
        let err = CommandKind::parse("explode").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand("explode".to_string()));

        let err = CommandKind::parse("   ").unwrap_err();
        assert_eq!(err, ProtocolError::EmptyCommand);
    }

    #[test]
    fn test_busy_slot_classification() {
        assert!(CommandKind::Capture.claims_busy_slot());
        assert!(CommandKind::MotorReset.claims_busy_slot());
        assert!(!CommandKind::Stop.claims_busy_slot());
        assert!(!CommandKind::Status.claims_busy_slot());
        assert!(CommandKind::Status.is_read_only());
        assert!(!CommandKind::Erase.is_read_only());
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::next(CommandSource::Button);
        let b = CorrelationId::next(CommandSource::Button);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("btn-"));
    }

    #[test]
    fn test_command_parse_carries_source() {
        let cmd = Command::parse(CommandSource::Mqtt, "status").unwrap();
        assert_eq!(cmd.kind, CommandKind::Status);
        assert_eq!(cmd.source, CommandSource::Mqtt);
        assert!(cmd.correlation_id.as_str().starts_with("mqtt-"));
    }
}
