use deedbook_core::notices::{Notice, NoticeLevel, NoticeSink};

/// Prints notices to stderr and mirrors them into the log.
#[derive(Clone, Default)]
pub struct TerminalNoticeSink;

impl NoticeSink for TerminalNoticeSink {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => {
                tracing::error!(notice = %notice.message, "Notice");
                eprintln!("error: {}", notice.message);
            }
            NoticeLevel::Success => {
                tracing::info!(notice = %notice.message, "Notice");
                eprintln!("ok: {}", notice.message);
            }
            NoticeLevel::Info => {
                tracing::info!(notice = %notice.message, "Notice");
                eprintln!("{}", notice.message);
            }
        }
    }
}
