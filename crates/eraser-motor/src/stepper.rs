//! 半步相位表和航位推算位置
//!
//! 8 相半步序列提供比整步更细的角分辨率。每一步使相位索引
//! 模 8 前进（或后退），并把累计计数器 ±1。

/// 8 相半步序列
///
/// 每行是一组绕组通电模式（4 个线圈）。两台电机总是收到同一行，
/// 因此它们的相位索引永不分叉。
pub const HALF_STEP_SEQ: [[u8; 4]; 8] = [
    [1, 0, 0, 0],
    [1, 1, 0, 0],
    [0, 1, 0, 0],
    [0, 1, 1, 0],
    [0, 0, 1, 0],
    [0, 0, 1, 1],
    [0, 0, 0, 1],
    [1, 0, 0, 1],
];

/// 运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 正向（计数器 +1，相位前进）
    Forward,
    /// 反向（计数器 -1，相位后退）
    Reverse,
}

impl Direction {
    /// 相反方向
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// 航位推算的电机位置
///
/// 相位索引是半步表中的当前行（0..8），计数器是自上次复位以来的
/// 带符号累计步数。两者只由电机控制器持有和修改。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorPosition {
    phase: u8,
    steps: i64,
}

impl MotorPosition {
    /// 原点位置（相位 0，计数 0）
    pub fn origin() -> Self {
        Self::default()
    }

    /// 当前相位索引（0..8）
    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// 累计步数（带符号）
    pub fn steps(&self) -> i64 {
        self.steps
    }

    /// 前进/后退一步，返回应施加的通电模式
    pub fn advance(&mut self, direction: Direction) -> [u8; 4] {
        match direction {
            Direction::Forward => {
                self.phase = (self.phase + 1) % 8;
                self.steps += 1;
            },
            Direction::Reverse => {
                self.phase = (self.phase + 7) % 8;
                self.steps -= 1;
            },
        }
        HALF_STEP_SEQ[self.phase as usize]
    }

    /// 归零累计计数器（复位完成后调用，相位保持不变）
    pub fn zero(&mut self) {
        self.steps = 0;
    }

    /// 回到原点所需的方向（计数为 0 时返回 None）
    pub fn reset_direction(&self) -> Option<Direction> {
        match self.steps {
            0 => None,
            s if s > 0 => Some(Direction::Reverse),
            _ => Some(Direction::Forward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_wraps_modulo_eight() {
        let mut pos = MotorPosition::origin();
        for expected in [1u8, 2, 3, 4, 5, 6, 7, 0, 1] {
            pos.advance(Direction::Forward);
            assert_eq!(pos.phase(), expected);
        }
        assert_eq!(pos.steps(), 9);
    }

    #[test]
    fn test_reverse_retreats_phase() {
        let mut pos = MotorPosition::origin();
        let pattern = pos.advance(Direction::Reverse);
        assert_eq!(pos.phase(), 7);
        assert_eq!(pos.steps(), -1);
        assert_eq!(pattern, HALF_STEP_SEQ[7]);
    }

    #[test]
    fn test_reset_direction_opposes_counter_sign() {
        let mut pos = MotorPosition::origin();
        assert_eq!(pos.reset_direction(), None);

        pos.advance(Direction::Forward);
        assert_eq!(pos.reset_direction(), Some(Direction::Reverse));

        pos.advance(Direction::Reverse);
        pos.advance(Direction::Reverse);
        assert_eq!(pos.reset_direction(), Some(Direction::Forward));
    }
}
