//! 每台设备的消息主题形状
//!
//! 命名空间为 `eraser_{ID}`，四个主题：状态（出站）、命令（入站）、
//! 响应（出站，按关联 ID 匹配）、会话（出站）。

/// 一台设备的完整主题集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// 状态主题（出站，状态快照）
    pub status: String,
    /// 命令主题（入站，命令摄取）
    pub command: String,
    /// 响应主题（出站，每条命令的结果）
    pub response: String,
    /// 会话主题（出站，会话切换通知）
    pub session: String,
}

impl Topics {
    /// 构建设备 ID 对应的主题集合
    pub fn for_device(id: u32) -> Self {
        let ns = format!("eraser_{id}");
        Self {
            status: format!("{ns}/status"),
            command: format!("{ns}/command"),
            response: format!("{ns}/response"),
            session: format!("{ns}/session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_namespace() {
        let topics = Topics::for_device(1);
        assert_eq!(topics.status, "eraser_1/status");
        assert_eq!(topics.command, "eraser_1/command");
        assert_eq!(topics.response, "eraser_1/response");
        assert_eq!(topics.session, "eraser_1/session");
    }
}
