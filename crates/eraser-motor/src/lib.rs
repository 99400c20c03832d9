//! # Eraser Motor
//!
//! 双步进电机同步驱动（半步模式）
//!
//! ## 模块
//!
//! - `stepper`: 半步相位表和航位推算位置
//! - `signals`: 暂停/停止协作信号
//! - `adapter`: 电机硬件抽象层（GPIO 驱动是外部协作者）
//! - `controller`: 运动控制器（步进、扫掠、复位）
//!
//! ## 设计说明
//!
//! 本 crate 对命令和网络一无所知。上层把抽象的运动请求
//! （方向 + 步数）翻译成一串 8 相半步模式，同一模式同时施加到
//! 两台电机上（锁步驱动，相位索引永不分叉）。
//!
//! 位置是纯航位推算的：只计数已下发的步，没有任何硬件反馈。
//! `reset` 的定义是"按记录的累计步数反向驱动"，而不是"寻找
//! 传感器原点"——断电期间被手动移动过的机构，复位后不会回到
//! 真实物理原点。这是已知并接受的限制。

pub mod adapter;
pub mod controller;
pub mod signals;
pub mod stepper;

pub use adapter::MotorAdapter;
#[cfg(any(test, feature = "mock"))]
pub use adapter::MockMotorAdapter;
pub use controller::{MotorConfig, MotorController, StepOutcome};
pub use signals::MotorSignals;
pub use stepper::{Direction, MotorPosition, HALF_STEP_SEQ};

use thiserror::Error;

/// 电机子系统统一错误类型
#[derive(Error, Debug)]
pub enum MotorError {
    /// 硬件故障（运动中止，上层应转入 Stopped 状态）
    #[error("Motor hardware fault: {0}")]
    Hardware(String),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,
}
