use crate::domain::appointment::Appointment;
use crate::domain::notification::{Notification, NotificationPreference};
use crate::domain::payment::Payment;
use crate::domain::ports::{AppointmentStore, NotificationStore, PaymentStore, PreferenceStore};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payment records.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for appointment reference data.
pub const CF_APPOINTMENTS: &str = "appointments";
/// Column Family for in-app notifications, keyed by user.
pub const CF_NOTIFICATIONS: &str = "notifications";
/// Column Family for notification preferences, keyed by user.
pub const CF_PREFERENCES: &str = "preferences";

/// A persistent store implementation using RocksDB.
///
/// One Column Family per record type keeps the key spaces separate.
/// `Clone` shares the underlying `Arc<DB>`, so one opened store backs every
/// port. Notification rows for a user and the preference upsert are
/// read-modify-write sequences, serialized by `write_lock`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_PAYMENTS, CF_APPOINTMENTS, CF_NOTIFICATIONS, CF_PREFERENCES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BillingError::InternalError(Box::new(std::io::Error::other(format!(
                "column family {name} not found"
            ))))
        })
    }

    fn put_json<T: serde::Serialize>(&self, cf_name: &str, key: u32, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| BillingError::InternalError(Box::new(e)))?;
        self.db.put_cf(&cf, key.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: u32,
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key.to_be_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| BillingError::InternalError(Box::new(e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn store(&self, payment: Payment) -> Result<()> {
        self.put_json(CF_PAYMENTS, payment.id, &payment)
    }

    async fn get(&self, payment_id: u32) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, payment_id)
    }
}

#[async_trait]
impl AppointmentStore for RocksDBStore {
    async fn store(&self, appointment: Appointment) -> Result<()> {
        self.put_json(CF_APPOINTMENTS, appointment.id, &appointment)
    }

    async fn get(&self, appointment_id: u32) -> Result<Option<Appointment>> {
        self.get_json(CF_APPOINTMENTS, appointment_id)
    }
}

#[async_trait]
impl NotificationStore for RocksDBStore {
    async fn store(&self, notification: Notification) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rows: Vec<Notification> = self
            .get_json(CF_NOTIFICATIONS, notification.user)?
            .unwrap_or_default();
        let user = notification.user;
        rows.push(notification);
        self.put_json(CF_NOTIFICATIONS, user, &rows)
    }

    async fn for_user(&self, user: u32) -> Result<Vec<Notification>> {
        Ok(self.get_json(CF_NOTIFICATIONS, user)?.unwrap_or_default())
    }
}

#[async_trait]
impl PreferenceStore for RocksDBStore {
    async fn get_or_create(&self, user: u32) -> Result<NotificationPreference> {
        let _guard = self.write_lock.lock().await;
        if let Some(prefs) = self.get_json(CF_PREFERENCES, user)? {
            return Ok(prefs);
        }
        let prefs = NotificationPreference::all_enabled(user);
        self.put_json(CF_PREFERENCES, user, &prefs)?;
        Ok(prefs)
    }

    async fn store(&self, prefs: NotificationPreference) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put_json(CF_PREFERENCES, prefs.user, &prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_PAYMENTS, CF_APPOINTMENTS, CF_NOTIFICATIONS, CF_PREFERENCES] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_payment_roundtrip() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut payment = Payment::new(1, 10, Some(5), Amount::new(dec!(150.00)).unwrap(), "pi_1");
        payment.mark_succeeded(Utc::now()).unwrap();

        PaymentStore::store(&store, payment.clone()).await.unwrap();
        let retrieved = PaymentStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(retrieved, payment);

        assert!(PaymentStore::get(&store, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notifications_append_per_user() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        for i in 0..3 {
            NotificationStore::store(
                &store,
                Notification {
                    user: 1,
                    category: "no_refund".to_string(),
                    title: format!("t{i}"),
                    message: "m".to_string(),
                    link: None,
                    read_at: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(store.for_user(1).await.unwrap().len(), 3);
        assert!(store.for_user(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preferences_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let mut prefs = store.get_or_create(1).await.unwrap();
            prefs.payments.email = false;
            PreferenceStore::store(&store, prefs).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let prefs = store.get_or_create(1).await.unwrap();
        assert!(!prefs.payments.email);
        assert!(prefs.appointments.email);
    }
}
