//! 会话跟踪
//!
//! 会话是切换式的（不随命令创建）：`session` 命令在开始/结束
//! 之间翻转。会话行本身存放在外部数据库协作者里，这里只持有
//! 当前激活的会话 ID。

use crate::collaborators::{EventStore, EventStoreError};

/// 会话切换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// 新会话已开始
    Started(String),
    /// 会话已结束
    Ended(String),
}

/// 会话跟踪器（由调度器的会话锁守护）
#[derive(Debug, Default)]
pub struct SessionTracker {
    active: Option<String>,
}

impl SessionTracker {
    /// 是否有激活会话
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// 当前会话 ID
    pub fn id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// 翻转会话状态（不激活则开始，激活则结束）
    ///
    /// 协作者失败时本地状态保持不变，下次切换会重试同一意图。
    pub fn toggle(&mut self, events: &dyn EventStore) -> Result<SessionChange, EventStoreError> {
        match self.active.clone() {
            Some(id) => {
                events.end_session(&id)?;
                self.active = None;
                Ok(SessionChange::Ended(id))
            },
            None => {
                let id = events.create_session()?;
                self.active = Some(id.clone());
                Ok(SessionChange::Started(id))
            },
        }
    }
}
