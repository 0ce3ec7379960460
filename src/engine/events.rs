//! Domain events emitted by the engines
//!
//! Publish-only event bus: the core never awaits delivery or handler
//! results. Consumed by the notification collaborator and by audit
//! listeners.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Events emitted by placement, activity and commission operations
#[derive(Debug, Clone)]
pub enum MatrixEvent {
    // Placement events
    MemberPlaced {
        member_id: String,
        sponsor_id: Option<String>,
        parent_id: Option<String>,
        depth: i32,
    },
    SponsorAttached {
        member_id: String,
        sponsor_id: String,
    },

    // Qualification / activity events
    QualificationChanged {
        member_id: String,
        from_level: i32,
        to_level: i32,
    },
    ActivityLapsed {
        member_id: String,
    },
    PlanRenewed {
        member_id: String,
        active_until: String,
    },

    // Wallet-facing events
    WalletCredited {
        member_id: String,
        amount: String,
        currency: String,
    },
    PurchaseCompleted {
        member_id: String,
        amount: String,
        currency: String,
        plan_name: Option<String>,
        tokens: Option<i64>,
    },
    // Published by the wallet collaborator through the shared bus;
    // the core only defines the vocabulary
    WithdrawalRequested {
        member_id: String,
        amount: String,
        currency: String,
        status: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &MatrixEvent);
}

/// Event bus for broadcasting domain events
pub struct EventBus {
    sender: broadcast::Sender<MatrixEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: MatrixEvent) {
        trace!(event = ?event, "Emitting matrix event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<MatrixEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &MatrixEvent) {
        match event {
            MatrixEvent::MemberPlaced {
                member_id,
                parent_id,
                depth,
                ..
            } => {
                debug!(member = %member_id, parent = ?parent_id, depth = depth, "Member placed");
            }
            MatrixEvent::QualificationChanged {
                member_id,
                from_level,
                to_level,
            } => {
                debug!(member = %member_id, from = from_level, to = to_level, "Qualification changed");
            }
            MatrixEvent::WalletCredited {
                member_id,
                amount,
                currency,
            } => {
                debug!(member = %member_id, amount = %amount, currency = %currency, "Wallet credited");
            }
            _ => {
                trace!(event = ?event, "Matrix event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
