//! 命令调度器
//!
//! 唯一的串行化点：同一时刻恰好一条命令"活动"。状态机不在
//! `Idle`/`Paused` 时到达的第二条命令立即收到 `Busy`，不排队、
//! 不合并——远程、按钮和终端命令竞争同一个忙槽。
//!
//! 线程模型：
//!
//! - 信号/只读类命令（stop、暂停/恢复、status、session、调度器
//!   查询）在提交方线程上就地执行。它们只翻转原子信号、读快照
//!   或调用会话协作者，耗时可忽略；这正是电机信号可以被其他
//!   线程安全翻转的原因。
//! - 忙槽类命令（capture、erase、capture_erase、motor_reset）在
//!   状态锁下完成占用（占不到立即 `Busy`），然后交给唯一的工作
//!   线程执行，最终结果按关联 ID 发布到响应主题。
//!
//! 每次状态转换都发布一次状态快照并追加一条事件日志；两者都是
//! fire-and-forget，绝不阻塞转换本身。

use crate::collaborators::{
    Camera, EventStore, LogPublisher, MemoryEventStore, NullScheduler, SchedulerHandle,
    StatusPublisher,
};
use crate::session::{SessionChange, SessionTracker};
use crate::state::{Claim, DeviceState, DispatchState, PausedOp};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender};
use eraser_motor::{MotorController, MotorSignals, StepOutcome};
use eraser_protocol::{
    Command, CommandKind, CommandOutcome, CommandResponse, MotorSummary, StatusSnapshot,
};
use eraser_queue::{QueueError, UploadQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// `submit` 的立即结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// 命令已就地执行完毕（信号/只读类，或被立即拒绝）
    Completed(CommandOutcome),
    /// 忙槽已占用成功，操作移交工作线程；最终结果按关联 ID 发布
    Accepted,
}

/// 调度器构造器
pub struct DispatcherBuilder {
    motor: Arc<MotorController>,
    queue: Arc<UploadQueue>,
    camera: Box<dyn Camera>,
    publisher: Box<dyn StatusPublisher>,
    events: Box<dyn EventStore>,
    scheduler: Box<dyn SchedulerHandle>,
}

impl DispatcherBuilder {
    /// 创建构造器（电机、队列和相机是必需协作者）
    pub fn new(
        motor: Arc<MotorController>,
        queue: Arc<UploadQueue>,
        camera: Box<dyn Camera>,
    ) -> Self {
        Self {
            motor,
            queue,
            camera,
            publisher: Box::new(LogPublisher),
            events: Box::new(MemoryEventStore::default()),
            scheduler: Box::new(NullScheduler),
        }
    }

    /// 注入状态发布协作者
    pub fn publisher(mut self, publisher: Box<dyn StatusPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// 注入持久化协作者
    pub fn events(mut self, events: Box<dyn EventStore>) -> Self {
        self.events = events;
        self
    }

    /// 注入调度器协作者
    pub fn scheduler(mut self, scheduler: Box<dyn SchedulerHandle>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// 构建调度器并启动工作线程
    pub fn build(self) -> Dispatcher {
        let signals = self.motor.signals();
        let inner = Arc::new(DispatcherInner {
            state: Mutex::new(DispatchState::default()),
            motor: self.motor,
            signals,
            queue: self.queue,
            camera: self.camera,
            publisher: self.publisher,
            events: self.events,
            scheduler: self.scheduler,
            session: Mutex::new(SessionTracker::default()),
            snapshot: ArcSwap::from_pointee(StatusSnapshot::initial()),
            fatal: AtomicBool::new(false),
        });

        // 容量 1 足够：占用成功后、工作线程空闲前最多一个任务在途
        let (job_tx, job_rx) = bounded::<Command>(1);
        let worker = {
            let inner = inner.clone();
            std::thread::spawn(move || worker_loop(inner, job_rx))
        };

        info!("Dispatcher started");
        Dispatcher {
            inner,
            job_tx: Mutex::new(Some(job_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }
}

/// 命令调度器（对外 API）
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
    /// 任务发送端；关机时提前丢弃以促使工作线程退出
    job_tx: Mutex<Option<Sender<Command>>>,
    /// 工作线程句柄（关机时 join）
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// 创建构造器
    pub fn builder(
        motor: Arc<MotorController>,
        queue: Arc<UploadQueue>,
        camera: Box<dyn Camera>,
    ) -> DispatcherBuilder {
        DispatcherBuilder::new(motor, queue, camera)
    }

    /// 提交一条命令（任意适配器线程可调用，立即返回）
    pub fn submit(&self, command: Command) -> SubmitResult {
        info!(
            source = ?command.source,
            kind = %command.kind,
            correlation_id = %command.correlation_id,
            "Handling command"
        );

        if command.kind.claims_busy_slot() {
            return self.claim_and_dispatch(command);
        }

        let outcome = match command.kind {
            CommandKind::Status => self.inner.read_status(),
            CommandKind::SchedulerStatus => self.inner.read_scheduler_status(),
            CommandKind::SchedulerReload => self.inner.reload_scheduler(),
            CommandKind::Session => self.inner.toggle_session(),
            CommandKind::Stop => self.inner.handle_stop(),
            CommandKind::MotorStartPause => self.inner.handle_start_pause(),
            // claims_busy_slot 已分流，这里不可达；防御处理
            other => {
                error!("Verb {} fell through command classification", other);
                CommandOutcome::failure("internal dispatch error")
            },
        };
        self.inner.respond(&command, outcome.clone());
        SubmitResult::Completed(outcome)
    }

    /// 当前设备状态（测试与适配器用）
    pub fn device_state(&self) -> DeviceState {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).device
    }

    /// 是否有擦除类操作占用电机（按钮映射用）
    pub fn motor_engaged(&self) -> bool {
        self.device_state().motor_engaged()
    }

    /// 最近一次发布的状态快照（无锁读取）
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.snapshot.load().as_ref().clone()
    }

    /// 健康检查：持久队列写入失败会破坏崩溃恢复保证，
    /// 此后应当快速失败并依赖外部重启
    pub fn is_healthy(&self) -> bool {
        !self.inner.fatal.load(Ordering::Acquire)
    }

    /// 关停：取消在途运动、关闭任务通道并等待工作线程退出
    pub fn shutdown(&self) {
        self.inner.signals.request_stop();
        let tx = self.job_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(tx);
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Dispatcher worker panicked");
            } else {
                info!("Dispatcher stopped");
            }
        }
    }

    /// 占用忙槽并移交工作线程
    fn claim_and_dispatch(&self, command: Command) -> SubmitResult {
        let claim = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let claim = state.try_claim(command.kind);
            if claim == Claim::Granted {
                // 在状态锁内清信号：与 stop 串行化，保证占用后到达的
                // stop 不会被随后的清除覆盖
                self.inner.signals.begin_operation();
            }
            claim
        };

        if claim == Claim::Rejected {
            warn!(kind = %command.kind, "Busy slot occupied, command rejected");
            let outcome = CommandOutcome::Busy;
            self.inner.respond(&command, outcome.clone());
            return SubmitResult::Completed(outcome);
        }

        self.inner.announce("operation claimed");

        let send_result = self
            .job_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|tx| tx.try_send(command.clone()));
        match send_result {
            Some(Ok(())) => SubmitResult::Accepted,
            _ => {
                // 工作线程已关闭：释放占用，报告失败
                {
                    let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.op_in_flight = false;
                    if matches!(
                        state.device,
                        DeviceState::Capturing | DeviceState::Erasing | DeviceState::CaptureErasing
                    ) {
                        state.device = DeviceState::Idle;
                    }
                }
                let outcome = CommandOutcome::failure("dispatcher is shut down");
                self.inner.respond(&command, outcome.clone());
                SubmitResult::Completed(outcome)
            },
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct DispatcherInner {
    state: Mutex<DispatchState>,
    motor: Arc<MotorController>,
    signals: Arc<MotorSignals>,
    queue: Arc<UploadQueue>,
    camera: Box<dyn Camera>,
    publisher: Box<dyn StatusPublisher>,
    events: Box<dyn EventStore>,
    scheduler: Box<dyn SchedulerHandle>,
    session: Mutex<SessionTracker>,
    snapshot: ArcSwap<StatusSnapshot>,
    fatal: AtomicBool,
}

impl DispatcherInner {
    /// 重建状态快照、缓存并发布（fire-and-forget），同时追加事件日志
    fn announce(&self, reason: &str) {
        let snapshot = self.refresh_snapshot();
        self.publisher.publish_status(&snapshot);
        self.events.record_event("transition", reason);
    }

    /// 发布一条命令的最终结果
    fn respond(&self, command: &Command, outcome: CommandOutcome) {
        let response = CommandResponse {
            correlation_id: command.correlation_id.clone(),
            command: command.kind.as_str().to_string(),
            outcome,
        };
        self.publisher.publish_response(&response);
    }

    /// 重建并缓存状态快照
    fn refresh_snapshot(&self) -> StatusSnapshot {
        let device_state = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.device.name().to_string()
        };
        let motor = self
            .motor
            .position()
            .map(|p| MotorSummary {
                steps: p.steps(),
                phase: p.phase(),
            })
            .unwrap_or_default();
        let (session_active, session_id) = {
            let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            (session.is_active(), session.id().map(String::from))
        };
        let snapshot = StatusSnapshot {
            device_state,
            motor,
            queue_depth: self.queue.depth(),
            session_active,
            session_id,
            scheduler: self.scheduler.status(),
        };
        self.snapshot.store(Arc::new(snapshot.clone()));
        snapshot
    }

    /// `status`：只读，永不失败
    fn read_status(&self) -> CommandOutcome {
        let snapshot = self.refresh_snapshot();
        match serde_json::to_value(&snapshot) {
            Ok(detail) => CommandOutcome::success_with("Status", detail),
            Err(e) => CommandOutcome::failure(format!("Failed to serialize status: {e}")),
        }
    }

    /// `scheduler_status`：只读，永不失败
    fn read_scheduler_status(&self) -> CommandOutcome {
        match serde_json::to_value(self.scheduler.status()) {
            Ok(detail) => CommandOutcome::success_with("Scheduler status", detail),
            Err(e) => CommandOutcome::failure(format!("Failed to serialize status: {e}")),
        }
    }

    /// `scheduler_reload`
    fn reload_scheduler(&self) -> CommandOutcome {
        match self.scheduler.reload() {
            Ok(count) => CommandOutcome::success_with(
                "Schedules reloaded successfully",
                serde_json::json!({ "schedules": count }),
            ),
            Err(e) => CommandOutcome::failure(format!("Failed to reload schedules: {e}")),
        }
    }

    /// `session`：切换会话，与忙槽正交
    fn toggle_session(&self) -> CommandOutcome {
        let result = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.toggle(self.events.as_ref())
        };
        match result {
            Ok(SessionChange::Started(id)) => {
                self.publisher.publish_session(true);
                self.announce("session started");
                CommandOutcome::success_with(
                    format!("Session started with ID: {id}"),
                    serde_json::json!({ "session_id": id }),
                )
            },
            Ok(SessionChange::Ended(id)) => {
                self.publisher.publish_session(false);
                self.announce("session ended");
                CommandOutcome::success_with(
                    "Session ended successfully",
                    serde_json::json!({ "session_id": id }),
                )
            },
            Err(e) => {
                warn!("Session toggle failed: {}", e);
                CommandOutcome::failure(format!("Failed to toggle session: {e}"))
            },
        }
    }

    /// `stop`：对任何非空闲状态有效；一个步进间隔内生效
    fn handle_stop(&self) -> CommandOutcome {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.device.stoppable() && !state.op_in_flight {
                return CommandOutcome::failure("No operation in progress");
            }
            self.signals.request_stop();
            state.device = DeviceState::Stopped;
        }
        self.announce("stop requested");
        CommandOutcome::success("Stopped all operations")
    }

    /// `motor_start_pause`：运行中的擦除类操作在暂停/恢复之间翻转
    fn handle_start_pause(&self) -> CommandOutcome {
        let outcome = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.device {
                DeviceState::Erasing => {
                    state.device = DeviceState::Paused(PausedOp::Erasing);
                    self.signals.set_paused(true);
                    CommandOutcome::success("Erasing process paused")
                },
                DeviceState::CaptureErasing => {
                    // 复合操作的拍摄阶段不可暂停；标志只作用于即将到来的
                    // 电机阶段
                    state.device = DeviceState::Paused(PausedOp::CaptureErasing);
                    self.signals.set_paused(true);
                    CommandOutcome::success("Erasing process paused")
                },
                DeviceState::Paused(op) => {
                    state.device = op.running_state();
                    self.signals.set_paused(false);
                    CommandOutcome::success("Erasing process resumed")
                },
                _ => return CommandOutcome::failure("Motors are not running"),
            }
        };
        self.announce("pause toggled");
        outcome
    }

    /// 工作线程执行一个忙槽操作，返回结果和建议的收尾状态
    fn execute(&self, kind: CommandKind) -> (CommandOutcome, DeviceState) {
        match kind {
            CommandKind::Capture => (self.capture_step(), DeviceState::Idle),
            CommandKind::Erase => self.op_erase(),
            CommandKind::CaptureErase => self.op_capture_erase(),
            CommandKind::MotorReset => self.op_reset(),
            other => {
                error!("Non-operation verb {} reached the worker", other);
                (CommandOutcome::failure("internal dispatch error"), DeviceState::Idle)
            },
        }
    }

    /// 拍摄并入队（capture 与 capture_erase 共用）
    fn capture_step(&self) -> CommandOutcome {
        let artifact = match self.camera.capture() {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Capture failed: {}", e);
                return CommandOutcome::failure(format!("Failed to capture image: {e}"));
            },
        };

        let metadata = {
            let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::json!({ "session_id": session.id() })
        };

        match self.queue.enqueue(&artifact.path, metadata) {
            Ok(id) => CommandOutcome::success_with(
                "Image captured successfully",
                serde_json::json!({ "queue_id": id }),
            ),
            Err(e @ QueueError::Persistence(_)) => {
                // 崩溃恢复保证被破坏：大声上报并标记进程不健康，
                // 由外部重启，而不是继续运行在不可信的不变量上
                error!("Durable queue write failed, crash-recovery guarantee broken: {}", e);
                self.fatal.store(true, Ordering::Release);
                CommandOutcome::failure(format!("Durable queue failure: {e}"))
            },
            Err(e) => {
                error!("Failed to enqueue captured image: {}", e);
                CommandOutcome::failure(format!("Failed to queue image: {e}"))
            },
        }
    }

    /// `erase`：完整扫掠
    fn op_erase(&self) -> (CommandOutcome, DeviceState) {
        match self.motor.sweep() {
            Ok(StepOutcome::Completed) => {
                (CommandOutcome::success("Whiteboard erased"), DeviceState::Idle)
            },
            Ok(StepOutcome::Stopped) => (
                CommandOutcome::failure("Erase stopped before completion"),
                DeviceState::Stopped,
            ),
            Err(e) => {
                error!("Motor hardware fault during erase: {}", e);
                (
                    CommandOutcome::failure(format!("Motor fault: {e}")),
                    DeviceState::Stopped,
                )
            },
        }
    }

    /// `capture_erase`：拍摄先行；拍摄失败则跳过擦除
    /// （不擦除未留档的板面），仍回到 Idle
    fn op_capture_erase(&self) -> (CommandOutcome, DeviceState) {
        let capture_outcome = self.capture_step();
        let detail = match &capture_outcome {
            CommandOutcome::Success { detail, .. } => detail.clone(),
            _ => {
                info!("Capture failed, skipping erase");
                return (capture_outcome, DeviceState::Idle);
            },
        };

        // 拍摄阶段收到的 stop：拍摄已自然完成，擦除不再开始
        if self.signals.stop_requested() {
            return (
                CommandOutcome::failure("Stopped before erase began"),
                DeviceState::Stopped,
            );
        }

        match self.motor.sweep() {
            Ok(StepOutcome::Completed) => {
                let outcome = match detail {
                    Some(detail) => CommandOutcome::success_with(
                        "Image captured, whiteboard erased",
                        detail,
                    ),
                    None => CommandOutcome::success("Image captured, whiteboard erased"),
                };
                (outcome, DeviceState::Idle)
            },
            Ok(StepOutcome::Stopped) => (
                CommandOutcome::failure("Image captured, erase stopped before completion"),
                DeviceState::Stopped,
            ),
            Err(e) => {
                error!("Motor hardware fault during erase: {}", e);
                (
                    CommandOutcome::failure(format!("Image captured, motor fault: {e}")),
                    DeviceState::Stopped,
                )
            },
        }
    }

    /// `motor_reset`：按累计步数反向驱动并归零；幂等
    fn op_reset(&self) -> (CommandOutcome, DeviceState) {
        let before = self.motor.position().map(|p| p.steps()).unwrap_or(0);
        match self.motor.reset() {
            Ok(StepOutcome::Completed) => (
                CommandOutcome::success_with(
                    "Motors reset to original position",
                    serde_json::json!({ "steps_driven": before.unsigned_abs() }),
                ),
                DeviceState::Idle,
            ),
            Ok(StepOutcome::Stopped) => (
                CommandOutcome::failure("Reset stopped before completion"),
                DeviceState::Stopped,
            ),
            Err(e) => {
                error!("Motor hardware fault during reset: {}", e);
                (
                    CommandOutcome::failure(format!("Motor fault: {e}")),
                    DeviceState::Stopped,
                )
            },
        }
    }

    /// 操作收尾：决定最终设备状态、释放忙槽、发布状态与响应
    fn finish(&self, command: &Command, outcome: CommandOutcome, proposed: DeviceState) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let stopped_externally = state.device == DeviceState::Stopped;
            let reset_succeeded =
                command.kind == CommandKind::MotorReset && outcome.is_success();
            // stop 命令已把状态置为 Stopped 时，只有成功的复位才能离开
            state.device = if stopped_externally && !reset_succeeded {
                DeviceState::Stopped
            } else {
                proposed
            };
            // 拍摄阶段被暂停且复合操作中止时，暂停标志可能残留；
            // 在状态锁内清除，避免与下一个操作的暂停交错
            self.signals.set_paused(false);
            state.op_in_flight = false;
        }
        self.announce(command.kind.as_str());
        self.respond(command, outcome);
    }
}

/// 工作线程主循环：一次一条命令，按到达顺序执行
fn worker_loop(inner: Arc<DispatcherInner>, job_rx: Receiver<Command>) {
    while let Ok(command) = job_rx.recv() {
        let (outcome, proposed) = inner.execute(command.kind);
        inner.finish(&command, outcome, proposed);
    }
}
