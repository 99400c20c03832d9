//! 电机硬件抽象层
//!
//! GPIO 驱动本身是外部协作者，这里只定义适配器契约：
//! 一次 `energize` 调用把同一组通电模式同时施加到两台电机上
//! （锁步驱动的同步不变量由适配器实现保证）。

use crate::MotorError;

/// 电机适配器契约
///
/// 实现者必须把 `pattern` 同时施加到两台电机的 4 个线圈上。
pub trait MotorAdapter: Send {
    /// 施加一组通电模式到两台电机
    fn energize(&mut self, pattern: [u8; 4]) -> Result<(), MotorError>;

    /// 断开所有线圈（操作结束或停机时调用）
    fn release(&mut self) -> Result<(), MotorError>;
}

/// Mock 电机适配器（无硬件依赖）
///
/// 记录施加过的模式序列，用于测试和无硬件环境下运行守护进程。
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
pub struct MockMotorAdapter {
    history: Vec<[u8; 4]>,
    steps: std::sync::Arc<std::sync::atomic::AtomicU64>,
    fail_after: Option<u64>,
    released: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MockMotorAdapter {
    /// 创建新的 mock 适配器
    pub fn new() -> Self {
        Self::default()
    }

    /// 在施加第 n 步之后注入硬件故障（用于故障路径测试）
    pub fn failing_after(n: u64) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// 共享步数计数器（跨线程观察步进进度）
    pub fn step_counter(&self) -> std::sync::Arc<std::sync::atomic::AtomicU64> {
        self.steps.clone()
    }

    /// 施加过的模式序列
    pub fn history(&self) -> &[[u8; 4]] {
        &self.history
    }

    /// 线圈是否处于断开状态
    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(any(test, feature = "mock"))]
impl MotorAdapter for MockMotorAdapter {
    fn energize(&mut self, pattern: [u8; 4]) -> Result<(), MotorError> {
        let applied = self.steps.load(std::sync::atomic::Ordering::Relaxed);
        if let Some(limit) = self.fail_after
            && applied >= limit
        {
            return Err(MotorError::Hardware("mock fault injected".to_string()));
        }
        self.history.push(pattern);
        self.steps.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.released = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), MotorError> {
        self.released = true;
        Ok(())
    }
}
