use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A human-readable message meant for the dashboard user.
///
/// `subject` names what the notice is about (an overlay kind, "credentials", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub seq: u64,
    pub level: NoticeLevel,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct Log {
    next_seq: u64,
    pending: Vec<Notice>,
}

/// Collects user-visible notices and fans them out to live subscribers.
///
/// Notices are kept until drained so a UI that polls does not miss any;
/// subscribers additionally get every notice as it is emitted.
#[derive(Debug)]
pub struct NoticeBus {
    log: Mutex<Log>,
    live: broadcast::Sender<Notice>,
    max_pending: usize,
}

impl NoticeBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Keep at most `max_pending` undrained notices; oldest are dropped first.
    pub fn with_capacity(max_pending: usize) -> Self {
        let (live, _) = broadcast::channel(max_pending.max(1));
        Self {
            log: Mutex::new(Log::default()),
            live,
            max_pending: max_pending.max(1),
        }
    }

    pub fn emit(&self, level: NoticeLevel, subject: impl Into<String>, message: impl Into<String>) {
        let notice = {
            let mut log = self.log.lock();
            let notice = Notice {
                seq: log.next_seq,
                level,
                subject: subject.into(),
                message: message.into(),
            };
            log.next_seq += 1;
            if log.pending.len() == self.max_pending {
                log.pending.remove(0);
            }
            log.pending.push(notice.clone());
            notice
        };
        // No receivers is fine.
        let _ = self.live.send(notice);
    }

    pub fn info(&self, subject: impl Into<String>, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, subject, message);
    }

    pub fn warn(&self, subject: impl Into<String>, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, subject, message);
    }

    pub fn error(&self, subject: impl Into<String>, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, subject, message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.live.subscribe()
    }

    pub fn pending(&self) -> Vec<Notice> {
        self.log.lock().pending.clone()
    }

    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut self.log.lock().pending)
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}
