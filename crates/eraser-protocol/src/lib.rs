//! # Eraser Protocol
//!
//! 白板擦除器的命令协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 命令动词、来源和关联 ID
//! - `response`: 命令结果和状态快照负载
//! - `topics`: 每台设备的消息主题形状
//!
//! ## 设计说明
//!
//! 三个输入来源（远程消息通道、物理按钮、本地终端）都被归一化为同一个
//! `Command` 值，由调度器统一消费。协议层只定义动词和负载形状，
//! 不关心具体的传输实现（broker 客户端是外部协作者）。

pub mod command;
pub mod response;
pub mod topics;

// 重新导出常用类型
pub use command::{Command, CommandKind, CommandSource, CorrelationId};
pub use response::{CommandOutcome, CommandResponse, MotorSummary, SchedulerSummary, StatusSnapshot};
pub use topics::Topics;

use thiserror::Error;

/// 协议层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 未知命令动词（校验失败，不产生任何状态变化）
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// 空命令负载
    #[error("Empty command payload")]
    EmptyCommand,
}
