//! 位置推算的属性测试
//!
//! 使用 proptest 验证往返和复位属性。

use eraser_motor::{Direction, MockMotorAdapter, MotorConfig, MotorController, MotorPosition};
use proptest::prelude::*;
use std::time::Duration;

fn fast_controller() -> MotorController {
    MotorController::new(
        Box::new(MockMotorAdapter::new()),
        MotorConfig {
            step_interval: Duration::ZERO,
            sweep_steps: 10,
            settle_delay: Duration::ZERO,
        },
    )
}

proptest! {
    /// 任意步数正向后等量反向，计数器和相位都回到起点
    #[test]
    fn forward_backward_roundtrip(n in 0u16..2048) {
        let mut pos = MotorPosition::origin();
        let start = pos;
        for _ in 0..n {
            pos.advance(Direction::Forward);
        }
        for _ in 0..n {
            pos.advance(Direction::Reverse);
        }
        prop_assert_eq!(pos.steps(), start.steps());
        prop_assert_eq!(pos.phase(), start.phase());
    }

    /// 任意方向序列之后，相位与计数模 8 同余
    #[test]
    fn phase_tracks_counter_modulo_eight(dirs in prop::collection::vec(any::<bool>(), 0..512)) {
        let mut pos = MotorPosition::origin();
        for forward in dirs {
            pos.advance(if forward { Direction::Forward } else { Direction::Reverse });
        }
        prop_assert_eq!(pos.phase() as i64, pos.steps().rem_euclid(8));
    }

    /// 从任意计数复位后计数为 0，且第二次复位是无操作
    #[test]
    fn reset_zeroes_any_counter(n in 0u32..512, forward in any::<bool>()) {
        let controller = fast_controller();
        let direction = if forward { Direction::Forward } else { Direction::Reverse };
        controller.step(n, direction).unwrap();

        controller.reset().unwrap();
        prop_assert_eq!(controller.position().unwrap().steps(), 0);

        controller.reset().unwrap();
        prop_assert_eq!(controller.position().unwrap().steps(), 0);
    }
}
