use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four independently-toggleable notification groups.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceGroup {
    Appointments,
    Messages,
    Payments,
    System,
}

/// Per-channel switches for one preference group.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct ChannelPrefs {
    pub email: bool,
    pub in_app: bool,
}

impl ChannelPrefs {
    pub const ENABLED: Self = Self {
        email: true,
        in_app: true,
    };
}

impl Default for ChannelPrefs {
    fn default() -> Self {
        Self::ENABLED
    }
}

/// One row per user; created lazily with every channel enabled (opt-out
/// model) the first time the dispatcher touches the user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct NotificationPreference {
    pub user: u32,
    pub appointments: ChannelPrefs,
    pub messages: ChannelPrefs,
    pub payments: ChannelPrefs,
    pub system: ChannelPrefs,
}

impl NotificationPreference {
    pub fn all_enabled(user: u32) -> Self {
        Self {
            user,
            appointments: ChannelPrefs::ENABLED,
            messages: ChannelPrefs::ENABLED,
            payments: ChannelPrefs::ENABLED,
            system: ChannelPrefs::ENABLED,
        }
    }

    pub fn group(&self, group: PreferenceGroup) -> ChannelPrefs {
        match group {
            PreferenceGroup::Appointments => self.appointments,
            PreferenceGroup::Messages => self.messages,
            PreferenceGroup::Payments => self.payments,
            PreferenceGroup::System => self.system,
        }
    }

    pub fn group_mut(&mut self, group: PreferenceGroup) -> &mut ChannelPrefs {
        match group {
            PreferenceGroup::Appointments => &mut self.appointments,
            PreferenceGroup::Messages => &mut self.messages,
            PreferenceGroup::Payments => &mut self.payments,
            PreferenceGroup::System => &mut self.system,
        }
    }

    /// Resolves the effective channels for a category. Unknown categories
    /// fail open (both channels on) so new categories are delivered until a
    /// group is assigned to them.
    pub fn channels_for(&self, category: &str) -> ChannelPrefs {
        match classify(category) {
            Some(group) => self.group(group),
            None => ChannelPrefs::ENABLED,
        }
    }
}

/// Maps a category to its preference group by substring, checked in order.
pub fn classify(category: &str) -> Option<PreferenceGroup> {
    if category.contains("appointment") {
        Some(PreferenceGroup::Appointments)
    } else if category.contains("message") {
        Some(PreferenceGroup::Messages)
    } else if category.contains("payment") || category.contains("refund") {
        Some(PreferenceGroup::Payments)
    } else if category.contains("system")
        || category.contains("profile")
        || category.contains("review")
    {
        Some(PreferenceGroup::System)
    } else {
        None
    }
}

/// Email templates the deferred executor knows how to render.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    Booking,
    Cancellation,
    PaymentReceived,
    PaymentFailed,
    Refund,
    ProfileApproved,
    NewReview,
    SystemAnnouncement,
    Generic,
}

/// Fixed category-to-template table. Total: anything unmapped renders the
/// generic template.
pub fn template_for(category: &str) -> EmailTemplate {
    match category {
        "appointment_booked" | "appointment_reminder" => EmailTemplate::Booking,
        "appointment_cancelled" => EmailTemplate::Cancellation,
        "payment_received" => EmailTemplate::PaymentReceived,
        "payment_failed" => EmailTemplate::PaymentFailed,
        "refund_processed" | "no_refund" => EmailTemplate::Refund,
        "profile_approved" => EmailTemplate::ProfileApproved,
        "new_review" => EmailTemplate::NewReview,
        "system_announcement" => EmailTemplate::SystemAnnouncement,
        _ => EmailTemplate::Generic,
    }
}

/// A persisted in-app notification. Created by the dispatcher; afterwards
/// only `read_at` ever changes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Notification {
    pub user: u32,
    pub category: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The unit of work handed to the deferred task executor for one email send.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct EmailTask {
    pub user: u32,
    pub template: EmailTemplate,
    pub category: String,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_substring() {
        assert_eq!(
            classify("appointment_cancelled"),
            Some(PreferenceGroup::Appointments)
        );
        assert_eq!(classify("new_message"), Some(PreferenceGroup::Messages));
        assert_eq!(classify("payment_received"), Some(PreferenceGroup::Payments));
        assert_eq!(classify("refund_processed"), Some(PreferenceGroup::Payments));
        assert_eq!(classify("no_refund"), Some(PreferenceGroup::Payments));
        assert_eq!(classify("system_announcement"), Some(PreferenceGroup::System));
        assert_eq!(classify("profile_approved"), Some(PreferenceGroup::System));
        assert_eq!(classify("new_review"), Some(PreferenceGroup::System));
        assert_eq!(classify("something_else"), None);
    }

    #[test]
    fn test_unknown_category_fails_open() {
        let mut prefs = NotificationPreference::all_enabled(1);
        prefs.payments = ChannelPrefs {
            email: false,
            in_app: false,
        };

        let channels = prefs.channels_for("brand_new_category");
        assert!(channels.email);
        assert!(channels.in_app);
    }

    #[test]
    fn test_known_category_respects_group() {
        let mut prefs = NotificationPreference::all_enabled(1);
        prefs.payments = ChannelPrefs {
            email: true,
            in_app: false,
        };

        let channels = prefs.channels_for("refund_processed");
        assert!(channels.email);
        assert!(!channels.in_app);
    }

    #[test]
    fn test_template_table() {
        assert_eq!(template_for("appointment_booked"), EmailTemplate::Booking);
        assert_eq!(template_for("appointment_reminder"), EmailTemplate::Booking);
        assert_eq!(
            template_for("appointment_cancelled"),
            EmailTemplate::Cancellation
        );
        assert_eq!(template_for("payment_received"), EmailTemplate::PaymentReceived);
        assert_eq!(template_for("payment_failed"), EmailTemplate::PaymentFailed);
        assert_eq!(template_for("refund_processed"), EmailTemplate::Refund);
        assert_eq!(template_for("no_refund"), EmailTemplate::Refund);
        assert_eq!(template_for("profile_approved"), EmailTemplate::ProfileApproved);
        assert_eq!(template_for("new_review"), EmailTemplate::NewReview);
        assert_eq!(
            template_for("system_announcement"),
            EmailTemplate::SystemAnnouncement
        );
        assert_eq!(template_for("not_in_the_table"), EmailTemplate::Generic);
    }

    #[test]
    fn test_defaults_all_enabled() {
        let prefs = NotificationPreference::all_enabled(7);
        for group in [
            PreferenceGroup::Appointments,
            PreferenceGroup::Messages,
            PreferenceGroup::Payments,
            PreferenceGroup::System,
        ] {
            let channels = prefs.group(group);
            assert!(channels.email);
            assert!(channels.in_app);
        }
    }
}
