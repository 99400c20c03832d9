//! 设备状态机
//!
//! 全进程唯一的 `DeviceState` 实例由调度器独占持有，所有变更都在
//! 同一把锁下进行。状态集合是封闭的带标签变体，转换规则集中在
//! `DispatchState::try_claim` 一处，而不是散落的布尔标志。
//!
//! `Paused` 记住被打断的操作，`resume` 据此回到原状态；`Stopped`
//! 表示被中止的操作（不是崩溃），需要显式 `motor_reset` 才能离开。

use eraser_protocol::CommandKind;

/// 被暂停打断的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausedOp {
    /// 暂停前在擦除
    Erasing,
    /// 暂停前在拍摄并擦除
    CaptureErasing,
}

impl PausedOp {
    /// 恢复后应回到的运行状态
    pub fn running_state(self) -> DeviceState {
        match self {
            PausedOp::Erasing => DeviceState::Erasing,
            PausedOp::CaptureErasing => DeviceState::CaptureErasing,
        }
    }
}

/// 设备状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// 空闲，可接受新操作
    #[default]
    Idle,
    /// 正在拍摄
    Capturing,
    /// 正在擦除
    Erasing,
    /// 正在拍摄并擦除（单次原子占用）
    CaptureErasing,
    /// 已暂停（记住被打断的操作）
    Paused(PausedOp),
    /// 操作被中止；需要 motor_reset 或重启才能离开
    Stopped,
}

impl DeviceState {
    /// 状态名（进入状态快照和主题负载）
    pub fn name(&self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Capturing => "capturing",
            DeviceState::Erasing => "erasing",
            DeviceState::CaptureErasing => "capture_erasing",
            DeviceState::Paused(_) => "paused",
            DeviceState::Stopped => "stopped",
        }
    }

    /// 是否有擦除类操作在运行或暂停（电机占用中）
    pub fn motor_engaged(&self) -> bool {
        matches!(
            self,
            DeviceState::Erasing | DeviceState::CaptureErasing | DeviceState::Paused(_)
        )
    }

    /// 是否可被 `stop` 作用（任何非空闲状态）
    pub fn stoppable(&self) -> bool {
        !matches!(self, DeviceState::Idle)
    }
}

/// 忙槽占用检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// 已占用忙槽，新状态已生效
    Granted,
    /// 槽被占用或状态不允许，立即拒绝
    Rejected,
}

/// 调度器内部状态（单锁守护）
///
/// 除 `DeviceState` 外还跟踪"操作在途"标志：`motor_reset` 执行
/// 期间设备状态按规范停留在 `Idle`/`Stopped`（封闭状态集合没有
/// Resetting），但竞争命令仍然必须收到 `Busy`。
#[derive(Debug, Default)]
pub struct DispatchState {
    /// 设备状态
    pub device: DeviceState,
    /// 忙槽是否有操作在途
    pub op_in_flight: bool,
}

impl DispatchState {
    /// 尝试为一个忙槽命令占用状态机
    ///
    /// 占用成功时完成入口状态转换；拒绝时不产生任何变化。
    pub fn try_claim(&mut self, kind: CommandKind) -> Claim {
        if self.op_in_flight {
            return Claim::Rejected;
        }
        match (kind, self.device) {
            (CommandKind::Capture, DeviceState::Idle) => {
                self.device = DeviceState::Capturing;
            },
            (CommandKind::Erase, DeviceState::Idle) => {
                self.device = DeviceState::Erasing;
            },
            (CommandKind::CaptureErase, DeviceState::Idle) => {
                self.device = DeviceState::CaptureErasing;
            },
            // 复位保持入口状态：成功完成后由 finish 把 Stopped 转回 Idle
            (CommandKind::MotorReset, DeviceState::Idle | DeviceState::Stopped) => {},
            _ => return Claim::Rejected,
        }
        self.op_in_flight = true;
        Claim::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_from_idle() {
        for kind in [
            CommandKind::Capture,
            CommandKind::Erase,
            CommandKind::CaptureErase,
            CommandKind::MotorReset,
        ] {
            let mut state = DispatchState::default();
            assert_eq!(state.try_claim(kind), Claim::Granted);
            assert!(state.op_in_flight);
        }
    }

    #[test]
    fn test_second_claim_is_rejected() {
        let mut state = DispatchState::default();
        assert_eq!(state.try_claim(CommandKind::Erase), Claim::Granted);
        assert_eq!(state.device, DeviceState::Erasing);
        assert_eq!(state.try_claim(CommandKind::Capture), Claim::Rejected);
        // 拒绝不产生变化
        assert_eq!(state.device, DeviceState::Erasing);
    }

    #[test]
    fn test_stopped_only_accepts_reset() {
        let mut state = DispatchState {
            device: DeviceState::Stopped,
            op_in_flight: false,
        };
        assert_eq!(state.try_claim(CommandKind::Erase), Claim::Rejected);
        assert_eq!(state.try_claim(CommandKind::Capture), Claim::Rejected);
        assert_eq!(state.try_claim(CommandKind::MotorReset), Claim::Granted);
        // 复位在途时设备状态不变
        assert_eq!(state.device, DeviceState::Stopped);
    }

    #[test]
    fn test_reset_in_flight_rejects_competitors() {
        let mut state = DispatchState::default();
        assert_eq!(state.try_claim(CommandKind::MotorReset), Claim::Granted);
        assert_eq!(state.device, DeviceState::Idle);
        // 状态仍是 Idle，但槽已被占用
        assert_eq!(state.try_claim(CommandKind::Capture), Claim::Rejected);
    }

    #[test]
    fn test_paused_remembers_interrupted_op() {
        assert_eq!(
            PausedOp::Erasing.running_state(),
            DeviceState::Erasing
        );
        assert_eq!(
            PausedOp::CaptureErasing.running_state(),
            DeviceState::CaptureErasing
        );
        assert_eq!(DeviceState::Paused(PausedOp::Erasing).name(), "paused");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(DeviceState::Idle.name(), "idle");
        assert_eq!(DeviceState::CaptureErasing.name(), "capture_erasing");
        assert_eq!(DeviceState::Stopped.name(), "stopped");
        assert!(DeviceState::Stopped.stoppable());
        assert!(!DeviceState::Idle.stoppable());
        assert!(DeviceState::Paused(PausedOp::Erasing).motor_engaged());
        assert!(!DeviceState::Capturing.motor_engaged());
    }
}
