//! 暂停/停止协作信号
//!
//! 停止和暂停都是协作式的：步进循环在每一步之间检查一次，
//! 最坏情况下一个步进间隔内生效。检查是廉价的非阻塞轮询
//! （两个原子读）；只有在确实处于暂停状态时才进入 Condvar
//! 阻塞等待，不自旋，也不丢失相位/计数状态。
//!
//! 信号可以从任意线程翻转（按钮线程、远程命令线程），
//! 这正是它们存在的意义。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// 电机协作信号
#[derive(Debug, Default)]
pub struct MotorSignals {
    /// 停止请求（`stop` 命令设置，开始新操作时清除）
    stop: AtomicBool,
    /// 暂停标志（快速轮询路径）
    paused: AtomicBool,
    /// 暂停阻塞用的锁/条件变量对
    gate: Mutex<()>,
    resumed: Condvar,
}

impl MotorSignals {
    /// 创建新信号组（未停止、未暂停）
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求协作式停止，并唤醒可能正在暂停等待的步进循环
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        // 必须先拿一下 gate，保证等待方不会在检查和睡眠之间错过通知
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.resumed.notify_all();
    }

    /// 是否有停止请求
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// 设置暂停标志；恢复时唤醒步进循环
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        if !paused {
            let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            self.resumed.notify_all();
        }
    }

    /// 翻转暂停标志，返回新状态
    pub fn toggle_paused(&self) -> bool {
        let was = self.paused.fetch_xor(true, Ordering::AcqRel);
        if was {
            let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            self.resumed.notify_all();
        }
        !was
    }

    /// 是否处于暂停
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// 开始一个新操作前的信号复位（清除停止与暂停）
    pub fn begin_operation(&self) {
        self.stop.store(false, Ordering::Release);
        self.set_paused(false);
    }

    /// 若处于暂停则阻塞，直到恢复或收到停止请求
    ///
    /// 快路径只有一次原子读；慢路径在 Condvar 上等待，不自旋。
    pub fn block_while_paused(&self) {
        if !self.is_paused() {
            return;
        }
        let mut guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        while self.is_paused() && !self.stop_requested() {
            guard = self.resumed.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_begin_operation_clears_flags() {
        let signals = MotorSignals::new();
        signals.request_stop();
        signals.set_paused(true);
        assert!(signals.stop_requested());
        assert!(signals.is_paused());

        signals.begin_operation();
        assert!(!signals.stop_requested());
        assert!(!signals.is_paused());
    }

    #[test]
    fn test_resume_wakes_blocked_waiter() {
        let signals = Arc::new(MotorSignals::new());
        signals.set_paused(true);

        let waiter = {
            let signals = signals.clone();
            std::thread::spawn(move || {
                signals.block_while_paused();
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        signals.set_paused(false);
        waiter.join().unwrap();
    }

    #[test]
    fn test_stop_wakes_blocked_waiter() {
        let signals = Arc::new(MotorSignals::new());
        signals.set_paused(true);

        let waiter = {
            let signals = signals.clone();
            std::thread::spawn(move || {
                signals.block_while_paused();
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        signals.request_stop();
        waiter.join().unwrap();
        // 暂停标志本身保持不变，由下一次 begin_operation 清除
        assert!(signals.is_paused());
    }

    #[test]
    fn test_toggle_roundtrip() {
        let signals = MotorSignals::new();
        assert!(signals.toggle_paused());
        assert!(signals.is_paused());
        assert!(!signals.toggle_paused());
        assert!(!signals.is_paused());
    }
}
