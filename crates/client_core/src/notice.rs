use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: Instant,
    pub expires_at: Instant,
}

/// Latest success and latest error notice.
///
/// Both can be pending at once; only the most recently raised unexpired one is
/// shown.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    ttl: Duration,
    success: Option<Notice>,
    error: Option<Notice>,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            success: None,
            error: None,
        }
    }

    pub fn raise(&mut self, kind: NoticeKind, message: impl Into<String>) -> Notice {
        let raised_at = Instant::now();
        let notice = Notice {
            kind,
            message: message.into(),
            raised_at,
            expires_at: raised_at + self.ttl,
        };
        match kind {
            NoticeKind::Success => self.success = Some(notice.clone()),
            NoticeKind::Error => self.error = Some(notice.clone()),
        }
        notice
    }

    pub fn visible(&self) -> Option<&Notice> {
        self.visible_at(Instant::now())
    }

    pub fn visible_at(&self, now: Instant) -> Option<&Notice> {
        [self.success.as_ref(), self.error.as_ref()]
            .into_iter()
            .flatten()
            .filter(|notice| notice.expires_at > now)
            .max_by_key(|notice| notice.raised_at)
    }

    pub fn pending(&self, kind: NoticeKind) -> Option<&Notice> {
        let now = Instant::now();
        match kind {
            NoticeKind::Success => self.success.as_ref(),
            NoticeKind::Error => self.error.as_ref(),
        }
        .filter(|notice| notice.expires_at > now)
    }
}
