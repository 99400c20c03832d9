//! 输入归一化
//!
//! 输入适配器很薄：把按钮沿、终端按键和远程消息归一化为同一个
//! `Command` 值后立即返回。这里集中放纯逻辑部分（防抖、映射），
//! 真正的线程由二进制侧创建。
//!
//! 被防抖丢弃的事件等于从未发生：不产生命令，也不会收到 `Busy`。

use eraser_protocol::CommandKind;
use std::time::{Duration, Instant};

/// 物理按钮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    /// 开始/暂停/恢复按钮
    StartPause,
    /// 电机复位按钮
    Reset,
    /// 会话切换按钮
    Session,
}

impl ButtonKind {
    fn index(self) -> usize {
        match self {
            ButtonKind::StartPause => 0,
            ButtonKind::Reset => 1,
            ButtonKind::Session => 2,
        }
    }
}

/// 按钮防抖器（每个按钮独立的时间窗）
///
/// 窗口内紧跟已接受事件之后的重复事件被丢弃在调度器之前。
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: [Option<Instant>; 3],
}

impl Debouncer {
    /// 创建防抖器；窗口默认 300 ms，可配置
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: [None; 3],
        }
    }

    /// 判定一次按钮事件是否被接受
    pub fn accept(&mut self, button: ButtonKind, at: Instant) -> bool {
        let slot = &mut self.last_accepted[button.index()];
        if let Some(last) = *slot
            && at.duration_since(last) < self.window
        {
            return false;
        }
        *slot = Some(at);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

/// 按钮到命令动词的映射
///
/// 开始/暂停按钮在电机空闲时发起一次完整的拍摄并擦除，
/// 否则作为暂停/恢复开关；其余按钮直接对应动词。
pub fn map_button(button: ButtonKind, motor_engaged: bool) -> CommandKind {
    match button {
        ButtonKind::StartPause if motor_engaged => CommandKind::MotorStartPause,
        ButtonKind::StartPause => CommandKind::CaptureErase,
        ButtonKind::Reset => CommandKind::MotorReset,
        ButtonKind::Session => CommandKind::Session,
    }
}

/// 终端单字母按键到命令动词的映射
///
/// `q`（退出）不是设备命令，由二进制侧自行处理，返回 None。
pub fn map_terminal_key(key: char) -> Option<CommandKind> {
    match key.to_ascii_lowercase() {
        'c' => Some(CommandKind::Capture),
        'e' => Some(CommandKind::Erase),
        'b' => Some(CommandKind::CaptureErase),
        'm' => Some(CommandKind::MotorStartPause),
        'r' => Some(CommandKind::MotorReset),
        's' => Some(CommandKind::Stop),
        'i' => Some(CommandKind::Status),
        'n' => Some(CommandKind::Session),
        'l' => Some(CommandKind::SchedulerReload),
        'j' => Some(CommandKind::SchedulerStatus),
        _ => None,
    }
}
