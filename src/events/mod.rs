use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::errors::ServiceError;
use crate::models::{CaseId, UploadTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A user-facing message about an asynchronous outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub case_id: CaseId,
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    pub fn new(case_id: CaseId, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            case_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn success(case_id: CaseId, message: impl Into<String>) -> Self {
        Self::new(case_id, NoticeLevel::Success, message)
    }

    pub fn info(case_id: CaseId, message: impl Into<String>) -> Self {
        Self::new(case_id, NoticeLevel::Info, message)
    }

    pub fn error(case_id: CaseId, message: impl Into<String>) -> Self {
        Self::new(case_id, NoticeLevel::Error, message)
    }
}

// Events leaving the engine. `EvidenceSubmitted` is the case-list refresh signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    EvidenceSubmitted {
        case_id: CaseId,
    },
    RefundAccepted {
        case_id: CaseId,
    },
    FilesUploaded {
        case_id: CaseId,
        target: UploadTarget,
        count: usize,
    },
    Notice(Notice),
}

impl Event {
    pub fn case_id(&self) -> &CaseId {
        match self {
            Event::EvidenceSubmitted { case_id }
            | Event::RefundAccepted { case_id }
            | Event::FilesUploaded { case_id, .. } => case_id,
            Event::Notice(notice) => &notice.case_id,
        }
    }

    /// True for the signal that should trigger a case-list refresh.
    pub fn is_refresh_signal(&self) -> bool {
        matches!(self, Event::EvidenceSubmitted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Sends an event without waiting; a closed or full channel is logged and
    /// the event dropped.
    pub fn send_or_log(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(case_id = %event.case_id(), "event channel full; event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(case_id = %event.case_id(), "event channel closed; event dropped");
            }
        }
    }
}

/// Event channel with the sending half wrapped.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

// Consumers of engine events, such as the case list or a notice toaster.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

// Drains the channel into `handler` until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handler: Arc<dyn EventHandler>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::EvidenceSubmitted { case_id } => {
                info!(%case_id, "evidence submitted; refreshing case list");
            }
            Event::RefundAccepted { case_id } => {
                info!(%case_id, "refund accepted");
            }
            Event::FilesUploaded {
                case_id,
                target,
                count,
            } => {
                debug!(%case_id, %target, count, "files uploaded");
            }
            Event::Notice(notice) => {
                debug!(case_id = %notice.case_id, level = ?notice.level, message = %notice.message, "notice");
            }
        }

        let case_id = event.case_id().clone();
        if let Err(e) = handler.handle_event(event).await {
            error!(%case_id, error = %e, "event handler failed");
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for Collector {
        async fn handle_event(&self, event: Event) -> Result<(), String> {
            let is_notice = matches!(event, Event::Notice(_));
            self.events.lock().unwrap().push(event);
            if is_notice {
                Err("notices are not handled here".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_process_events_delivers_in_order() {
        let (sender, rx) = channel(8);
        let collector = Arc::new(Collector::default());

        let case_id = CaseId::new("C-1");
        sender
            .send(Event::Notice(Notice::error(case_id.clone(), "boom")))
            .await
            .unwrap();
        sender
            .send(Event::EvidenceSubmitted {
                case_id: case_id.clone(),
            })
            .await
            .unwrap();
        drop(sender);

        process_events(rx, collector.clone()).await;

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_refresh_signal());
        assert!(events[1].is_refresh_signal());
        assert_eq!(events[1].case_id(), &case_id);
    }

    #[tokio::test]
    async fn test_send_to_closed_channel_is_an_event_error() {
        let (sender, rx) = channel(1);
        drop(rx);
        let result = sender
            .send(Event::RefundAccepted {
                case_id: CaseId::new("C-2"),
            })
            .await;
        assert!(matches!(result, Err(ServiceError::EventError(_))));

        // must not panic
        sender.send_or_log(Event::RefundAccepted {
            case_id: CaseId::new("C-2"),
        });
    }

    #[test]
    fn test_send_or_log_drops_when_full() {
        let (sender, mut rx) = channel(1);
        let case_id = CaseId::new("C-3");

        sender.send_or_log(Event::EvidenceSubmitted {
            case_id: case_id.clone(),
        });
        sender.send_or_log(Event::RefundAccepted {
            case_id: case_id.clone(),
        });

        assert_eq!(rx.try_recv().ok(), Some(Event::EvidenceSubmitted { case_id }));
        assert!(rx.try_recv().is_err());
    }
}
