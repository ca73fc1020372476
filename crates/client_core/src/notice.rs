use std::{collections::BTreeMap, time::Duration};

use tokio::time::Instant;

pub const SUCCESS_NOTICE_TTL: Duration = Duration::from_secs(3);
pub const ERROR_NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoticeLevel {
    Success,
    Error,
}

impl NoticeLevel {
    pub fn ttl(self) -> Duration {
        match self {
            NoticeLevel::Success => SUCCESS_NOTICE_TTL,
            NoticeLevel::Error => ERROR_NOTICE_TTL,
        }
    }
}

/// Transient message shown to the user after an intent completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub posted_at: Instant,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            posted_at: Instant::now(),
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.posted_at + self.level.ttl()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

/// Latest notice per level, with expired ones dropped on read. A success
/// clears any standing error, since the intent after it went through.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    latest: BTreeMap<NoticeLevel, Notice>,
}

impl NoticeBoard {
    pub fn post(&mut self, notice: Notice) {
        if notice.level == NoticeLevel::Success {
            self.latest.remove(&NoticeLevel::Error);
        }
        self.latest.insert(notice.level, notice);
    }

    pub fn active(&mut self, now: Instant) -> Vec<Notice> {
        self.latest.retain(|_, notice| !notice.is_expired(now));
        self.latest.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn success_notices_expire_before_errors() {
        let mut board = NoticeBoard::default();
        board.post(Notice::success("Order created"));
        board.post(Notice::error("could not reach the order store"));
        assert_eq!(board.active(Instant::now()).len(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        let active = board.active(Instant::now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Error);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(board.active(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_notice_replaces_older_one_of_same_level() {
        let mut board = NoticeBoard::default();
        board.post(Notice::success("Order created"));
        board.post(Notice::success("Order deleted"));

        let active = board.active(Instant::now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "Order deleted");
    }

    #[tokio::test(start_paused = true)]
    async fn success_clears_a_standing_error() {
        let mut board = NoticeBoard::default();
        board.post(Notice::error("order store rejected the request: boom"));
        tokio::time::advance(Duration::from_secs(1)).await;
        board.post(Notice::success("Payment status updated"));

        let active = board.active(Instant::now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Success);

        board.post(Notice::error("could not reach the order store"));
        assert_eq!(board.active(Instant::now()).len(), 2);
    }
}
