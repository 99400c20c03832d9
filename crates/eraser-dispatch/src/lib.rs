//! # Eraser Dispatch
//!
//! 设备编排器：命令调度 + 状态机
//!
//! ## 模块
//!
//! - `state`: 封闭的设备状态机和忙槽占用规则
//! - `dispatcher`: 单串行化点（提交快路径 + 工作线程）
//! - `collaborators`: 外部协作者的能力接口（相机、发布、数据库、调度器）
//! - `session`: 会话切换跟踪
//! - `inputs`: 按钮防抖和输入映射（纯逻辑，线程在二进制侧）
//!
//! ## 数据流
//!
//! ```text
//! 输入适配器 → Command → Dispatcher ─┬→ 电机子系统（eraser-motor）
//!                                    ├→ 拍摄协作者 → 上传队列（eraser-queue）
//!                                    └→ 状态/响应/会话发布（fire-and-forget）
//! ```

pub mod collaborators;
pub mod dispatcher;
pub mod inputs;
pub mod session;
pub mod state;

pub use collaborators::{
    Artifact, Camera, CameraError, EventStore, EventStoreError, LogPublisher, MemoryEventStore,
    NullScheduler, SchedulerError, SchedulerHandle, StatusPublisher,
};
#[cfg(any(test, feature = "mock"))]
pub use collaborators::mock::{MockCamera, RecordingPublisher};
pub use dispatcher::{Dispatcher, DispatcherBuilder, SubmitResult};
pub use inputs::{map_button, map_terminal_key, ButtonKind, Debouncer};
pub use session::{SessionChange, SessionTracker};
pub use state::{DeviceState, DispatchState, PausedOp};
