use crate::domain::appointment::Appointment;
use crate::domain::notification::{EmailTask, Notification, NotificationPreference};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AppointmentStore, NotificationStore, PaymentStore, PreferenceStore, TaskQueue,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory payment store.
///
/// Uses `Arc<RwLock<HashMap<u32, Payment>>>` for shared concurrent access.
/// Used by tests and the default CLI path where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<u32, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, payment_id: u32) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&payment_id).cloned())
    }
}

/// A thread-safe in-memory appointment store.
#[derive(Default, Clone)]
pub struct InMemoryAppointmentStore {
    appointments: Arc<RwLock<HashMap<u32, Appointment>>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn store(&self, appointment: Appointment) -> Result<()> {
        let mut appointments = self.appointments.write().await;
        appointments.insert(appointment.id, appointment);
        Ok(())
    }

    async fn get(&self, appointment_id: u32) -> Result<Option<Appointment>> {
        let appointments = self.appointments.read().await;
        Ok(appointments.get(&appointment_id).cloned())
    }
}

/// A thread-safe in-memory store for in-app notification records.
#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn store(&self, notification: Notification) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        notifications.push(notification);
        Ok(())
    }

    async fn for_user(&self, user: u32) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.user == user)
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory preference store with upsert semantics.
///
/// `get_or_create` holds the write lock across find-and-insert, so two
/// concurrent first accesses for the same user still produce exactly one row.
#[derive(Default, Clone)]
pub struct InMemoryPreferenceStore {
    preferences: Arc<RwLock<HashMap<u32, NotificationPreference>>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_or_create(&self, user: u32) -> Result<NotificationPreference> {
        let mut preferences = self.preferences.write().await;
        Ok(preferences
            .entry(user)
            .or_insert_with(|| NotificationPreference::all_enabled(user))
            .clone())
    }

    async fn store(&self, prefs: NotificationPreference) -> Result<()> {
        let mut preferences = self.preferences.write().await;
        preferences.insert(prefs.user, prefs);
        Ok(())
    }
}

/// Records enqueued email tasks instead of delivering them. Stands in for the
/// external at-least-once task executor in tests and the CLI.
#[derive(Default, Clone)]
pub struct InMemoryTaskQueue {
    tasks: Arc<RwLock<Vec<EmailTask>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueued(&self) -> Vec<EmailTask> {
        self.tasks.read().await.clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: EmailTask) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_payment_store_roundtrip() {
        let store = InMemoryPaymentStore::new();
        let payment = Payment::new(1, 10, Some(5), Amount::new(dec!(100.0)).unwrap(), "pi_1");

        store.store(payment.clone()).await.unwrap();
        let retrieved = store.get(1).await.unwrap().unwrap();
        assert_eq!(retrieved, payment);

        assert!(store.get(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notification_store_filters_by_user() {
        let store = InMemoryNotificationStore::new();
        for user in [1, 1, 2] {
            store
                .store(Notification {
                    user,
                    category: "system_announcement".to_string(),
                    title: "t".to_string(),
                    message: "m".to_string(),
                    link: None,
                    read_at: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.for_user(1).await.unwrap().len(), 2);
        assert_eq!(store.for_user(2).await.unwrap().len(), 1);
        assert!(store.for_user(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preference_upsert_is_stable() {
        let store = InMemoryPreferenceStore::new();

        let first = store.get_or_create(1).await.unwrap();
        assert_eq!(first, NotificationPreference::all_enabled(1));

        let mut edited = first.clone();
        edited.payments.email = false;
        store.store(edited.clone()).await.unwrap();

        // A later get_or_create must not clobber the edited row.
        let second = store.get_or_create(1).await.unwrap();
        assert_eq!(second, edited);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_creates_one_row() {
        let store = InMemoryPreferenceStore::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.get_or_create(7).await.unwrap() },
            ));
        }
        for handle in handles {
            let prefs = handle.await.unwrap();
            assert_eq!(prefs, NotificationPreference::all_enabled(7));
        }
    }
}
