//! 运动控制器
//!
//! 把抽象运动请求（方向 + 步数）翻译为半步序列，按固定节拍
//! 施加到两台电机上。整个子系统由一把运动互斥锁守护：实际上
//! 只有调度器线程发起运动，这把锁真正的作用是让其他线程
//! （按钮线程、远程命令线程）翻转的暂停/停止信号可以被安全
//! 观察到，而不会撕裂相位/计数状态。

use crate::adapter::MotorAdapter;
use crate::signals::MotorSignals;
use crate::stepper::{Direction, MotorPosition};
use crate::MotorError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 电机时序配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorConfig {
    /// 单步间隔（节拍精度属性：任何信号翻转都不会跳步或重复施加）
    pub step_interval: Duration,
    /// 一个擦除行程的步数（单向）
    pub sweep_steps: u32,
    /// 正向行程结束后、反向行程开始前的静置时间
    pub settle_delay: Duration,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(1),
            sweep_steps: 2000,
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// 一次运动的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 全部步数施加完毕
    Completed,
    /// 协作式停止请求在步间被观察到，运动提前结束
    Stopped,
}

/// 运动控制器
///
/// 独占持有电机位置；位置没有硬件反馈，纯航位推算。
pub struct MotorController {
    adapter: Mutex<Box<dyn MotorAdapter>>,
    position: Mutex<MotorPosition>,
    signals: Arc<MotorSignals>,
    /// 每个运动操作一把锁
    motion: Mutex<()>,
    config: MotorConfig,
}

impl MotorController {
    /// 创建控制器
    pub fn new(adapter: Box<dyn MotorAdapter>, config: MotorConfig) -> Self {
        Self {
            adapter: Mutex::new(adapter),
            position: Mutex::new(MotorPosition::origin()),
            signals: Arc::new(MotorSignals::new()),
            motion: Mutex::new(()),
            config,
        }
    }

    /// 协作信号句柄（供调度器和输入线程翻转）
    pub fn signals(&self) -> Arc<MotorSignals> {
        self.signals.clone()
    }

    /// 当前位置快照
    pub fn position(&self) -> Result<MotorPosition, MotorError> {
        Ok(*self.position.lock().map_err(|_| MotorError::PoisonedLock)?)
    }

    /// 施加指定方向的若干步
    pub fn step(&self, count: u32, direction: Direction) -> Result<StepOutcome, MotorError> {
        let _motion = self.motion.lock().map_err(|_| MotorError::PoisonedLock)?;
        let outcome = self.step_locked(count, direction)?;
        self.release_coils();
        Ok(outcome)
    }

    /// 执行一次完整的擦除扫掠（正向行程 + 静置 + 反向行程）
    pub fn sweep(&self) -> Result<StepOutcome, MotorError> {
        let _motion = self.motion.lock().map_err(|_| MotorError::PoisonedLock)?;
        info!(steps = self.config.sweep_steps, "Starting erase sweep");

        if self.step_locked(self.config.sweep_steps, Direction::Forward)? == StepOutcome::Stopped {
            info!("Sweep stopped during forward pass");
            self.release_coils();
            return Ok(StepOutcome::Stopped);
        }

        // 行程端点静置；停止请求在此期间同样有效
        spin_sleep::sleep(self.config.settle_delay);
        if self.signals.stop_requested() {
            info!("Sweep stopped during settle delay");
            self.release_coils();
            return Ok(StepOutcome::Stopped);
        }

        let outcome = self.step_locked(self.config.sweep_steps, Direction::Reverse)?;
        if outcome == StepOutcome::Stopped {
            info!("Sweep stopped during backward pass");
        } else {
            info!("Erase sweep completed");
        }
        self.release_coils();
        Ok(outcome)
    }

    /// 按记录的累计步数反向驱动，归零计数器
    ///
    /// 没有物理限位开关可查：如果机构在断电期间被手动移动过，
    /// 记录的计数已经失真，复位不会回到真实物理原点。
    /// 计数为 0 时是无操作（幂等）。
    pub fn reset(&self) -> Result<StepOutcome, MotorError> {
        let _motion = self.motion.lock().map_err(|_| MotorError::PoisonedLock)?;
        let position = self.position()?;
        let Some(direction) = position.reset_direction() else {
            debug!("Already at recorded origin, reset is a no-op");
            return Ok(StepOutcome::Completed);
        };

        let distance = position.steps().unsigned_abs();
        info!(steps = distance, ?direction, "Resetting motors to recorded origin");

        // 分段驱动：累计距离可能超出单次 u32 步数（实际不会，防御截断）
        let mut remaining = distance;
        while remaining > 0 {
            let chunk = remaining.min(u32::MAX as u64) as u32;
            if self.step_locked(chunk, direction)? == StepOutcome::Stopped {
                warn!("Reset stopped before reaching recorded origin");
                self.release_coils();
                return Ok(StepOutcome::Stopped);
            }
            remaining -= chunk as u64;
        }

        self.position
            .lock()
            .map_err(|_| MotorError::PoisonedLock)?
            .zero();
        info!("Motor reset complete");
        self.release_coils();
        Ok(StepOutcome::Completed)
    }

    /// 步进内层循环（调用方必须已持有运动锁）
    ///
    /// 每一步之间：(a) 轮询停止标志，(b) 若暂停则阻塞等待
    /// （阻塞期间相位/计数原样保留）。两个检查都是廉价轮询，
    /// 节拍保持规整。
    fn step_locked(&self, count: u32, direction: Direction) -> Result<StepOutcome, MotorError> {
        let mut adapter = self.adapter.lock().map_err(|_| MotorError::PoisonedLock)?;
        for _ in 0..count {
            if self.signals.stop_requested() {
                return Ok(StepOutcome::Stopped);
            }
            self.signals.block_while_paused();
            if self.signals.stop_requested() {
                return Ok(StepOutcome::Stopped);
            }

            // 先通电成功，再提交位置：失败的一步不进入航位推算
            let mut position = self.position.lock().map_err(|_| MotorError::PoisonedLock)?;
            let mut next = *position;
            let pattern = next.advance(direction);
            adapter.energize(pattern)?;
            *position = next;
            drop(position);

            spin_sleep::sleep(self.config.step_interval);
        }
        Ok(StepOutcome::Completed)
    }

    /// 断开线圈（尽力而为）
    fn release_coils(&self) {
        match self.adapter.lock() {
            Ok(mut adapter) => {
                if let Err(e) = adapter.release() {
                    warn!("Failed to release motor coils: {}", e);
                }
            },
            Err(_) => warn!("Motor adapter lock poisoned while releasing coils"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockMotorAdapter;
    use std::sync::atomic::Ordering;

    fn test_controller(adapter: MockMotorAdapter) -> MotorController {
        // 测试用零间隔节拍，扫掠行程缩短
        MotorController::new(
            Box::new(adapter),
            MotorConfig {
                step_interval: Duration::ZERO,
                sweep_steps: 50,
                settle_delay: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_sweep_returns_to_start() {
        let adapter = MockMotorAdapter::new();
        let steps = adapter.step_counter();
        let controller = test_controller(adapter);

        assert_eq!(controller.sweep().unwrap(), StepOutcome::Completed);

        let position = controller.position().unwrap();
        assert_eq!(position.steps(), 0);
        assert_eq!(position.phase(), 0);
        assert_eq!(steps.load(Ordering::Relaxed), 100); // 50 正向 + 50 反向
    }

    #[test]
    fn test_stop_interrupts_stepping() {
        let adapter = MockMotorAdapter::new();
        let steps = adapter.step_counter();
        let controller = Arc::new(MotorController::new(
            Box::new(adapter),
            MotorConfig {
                step_interval: Duration::from_micros(100),
                sweep_steps: 1_000_000,
                settle_delay: Duration::ZERO,
            },
        ));
        let signals = controller.signals();

        let worker = {
            let controller = controller.clone();
            std::thread::spawn(move || controller.sweep().unwrap())
        };

        // 等扫掠确实开始，再请求停止
        while steps.load(Ordering::Relaxed) < 10 {
            std::thread::sleep(Duration::from_millis(1));
        }
        signals.request_stop();
        assert_eq!(worker.join().unwrap(), StepOutcome::Stopped);

        // 运动提前结束：计数器停在中途，远未到行程终点
        let position = controller.position().unwrap();
        assert!(position.steps() > 0);
        assert!(position.steps() < 1_000_000);
    }

    #[test]
    fn test_pause_freezes_progress_and_resume_completes() {
        let adapter = MockMotorAdapter::new();
        let steps = adapter.step_counter();
        let controller = Arc::new(test_controller(adapter));
        let signals = controller.signals();
        signals.set_paused(true);

        let worker = {
            let controller = controller.clone();
            std::thread::spawn(move || controller.step(200, Direction::Forward).unwrap())
        };

        // 暂停期间无进度（阻塞在第一步之前）
        std::thread::sleep(Duration::from_millis(20));
        let frozen = steps.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(steps.load(Ordering::Relaxed), frozen);

        signals.set_paused(false);
        assert_eq!(worker.join().unwrap(), StepOutcome::Completed);
        assert_eq!(steps.load(Ordering::Relaxed), 200);
        assert_eq!(controller.position().unwrap().steps(), 200);
    }

    #[test]
    fn test_reset_zeroes_counter_and_is_idempotent() {
        let controller = test_controller(MockMotorAdapter::new());

        controller.step(37, Direction::Forward).unwrap();
        assert_eq!(controller.position().unwrap().steps(), 37);

        assert_eq!(controller.reset().unwrap(), StepOutcome::Completed);
        assert_eq!(controller.position().unwrap().steps(), 0);

        // 第二次复位是无操作
        assert_eq!(controller.reset().unwrap(), StepOutcome::Completed);
        assert_eq!(controller.position().unwrap().steps(), 0);
    }

    #[test]
    fn test_reset_from_negative_counter() {
        let controller = test_controller(MockMotorAdapter::new());
        controller.step(12, Direction::Reverse).unwrap();
        assert_eq!(controller.position().unwrap().steps(), -12);

        controller.reset().unwrap();
        assert_eq!(controller.position().unwrap().steps(), 0);
    }

    #[test]
    fn test_hardware_fault_propagates() {
        let controller = test_controller(MockMotorAdapter::failing_after(10));
        let err = controller.step(50, Direction::Forward).unwrap_err();
        assert!(matches!(err, MotorError::Hardware(_)));
        // 只有成功施加的步进入航位推算
        assert_eq!(controller.position().unwrap().steps(), 10);
    }
}
