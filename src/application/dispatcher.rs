use crate::domain::notification::{EmailTask, Notification, template_for};
use crate::domain::ports::{ClockHandle, NotificationStoreBox, PreferenceStoreBox, TaskQueueBox};
use tracing::{debug, error};

/// Terminal outcome of one notification intent. There are no further
/// transitions after dispatch returns.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DispatchOutcome {
    /// Both channels disabled by preference; nothing emitted.
    Suppressed,
    InAppOnly,
    EmailOnly,
    Both,
    /// At least one channel was enabled but every attempted side effect
    /// failed. Logged, never raised.
    Failed,
}

/// Preference-gated fan-out of one notification to the in-app and email
/// channels.
///
/// `notify` never returns an error: the two channels are independent,
/// best-effort deliveries, and a refund that succeeded but failed to notify
/// is still a successful refund. Failures are logged and absorbed here.
pub struct NotificationDispatcher {
    preferences: PreferenceStoreBox,
    notifications: NotificationStoreBox,
    queue: TaskQueueBox,
    clock: ClockHandle,
}

impl NotificationDispatcher {
    pub fn new(
        preferences: PreferenceStoreBox,
        notifications: NotificationStoreBox,
        queue: TaskQueueBox,
        clock: ClockHandle,
    ) -> Self {
        Self {
            preferences,
            notifications,
            queue,
            clock,
        }
    }

    /// Emits at most one in-app notification row and at most one deferred
    /// email task for `user`, according to the user's preferences for the
    /// category's group. Unknown categories fail open.
    pub async fn notify(
        &self,
        user: u32,
        category: &str,
        title: &str,
        message: &str,
        link: Option<String>,
    ) -> DispatchOutcome {
        let prefs = match self.preferences.get_or_create(user).await {
            Ok(prefs) => prefs,
            Err(err) => {
                error!(user, category, error = %err, "failed to resolve notification preferences");
                return DispatchOutcome::Failed;
            }
        };
        let channels = prefs.channels_for(category);

        let mut stored = false;
        if channels.in_app {
            let notification = Notification {
                user,
                category: category.to_string(),
                title: title.to_string(),
                message: message.to_string(),
                link: link.clone(),
                read_at: None,
                created_at: self.clock.now(),
            };
            match self.notifications.store(notification).await {
                Ok(()) => stored = true,
                // The email channel still gets its chance below.
                Err(err) => {
                    error!(user, category, error = %err, "failed to persist in-app notification")
                }
            }
        }

        let mut queued = false;
        if channels.email {
            let task = EmailTask {
                user,
                template: template_for(category),
                category: category.to_string(),
                subject: title.to_string(),
                body: message.to_string(),
            };
            match self.queue.enqueue(task).await {
                Ok(()) => queued = true,
                // An enqueue failure must not roll back the in-app row.
                Err(err) => {
                    error!(user, category, error = %err, "failed to enqueue notification email")
                }
            }
        }

        let outcome = match (stored, queued) {
            (true, true) => DispatchOutcome::Both,
            (true, false) => DispatchOutcome::InAppOnly,
            (false, true) => DispatchOutcome::EmailOnly,
            (false, false) if channels.in_app || channels.email => DispatchOutcome::Failed,
            (false, false) => DispatchOutcome::Suppressed,
        };
        debug!(user, category, ?outcome, "notification dispatched");
        outcome
    }
}
