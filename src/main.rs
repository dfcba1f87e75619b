use calmora_billing::application::dispatcher::NotificationDispatcher;
use calmora_billing::application::orchestrator::{RefundOrchestrator, RefundOutcome};
use calmora_billing::domain::appointment::Appointment;
use calmora_billing::domain::payment::{Amount, Payment};
use calmora_billing::domain::ports::{
    AppointmentStoreBox, ClockHandle, NotificationStoreBox, PaymentStoreBox, PreferenceStoreBox,
};
use calmora_billing::error::BillingError;
use calmora_billing::infrastructure::clock::SystemClock;
use calmora_billing::infrastructure::gateway::SandboxGateway;
use calmora_billing::infrastructure::in_memory::{
    InMemoryAppointmentStore, InMemoryNotificationStore, InMemoryPaymentStore,
    InMemoryPreferenceStore, InMemoryTaskQueue,
};
use calmora_billing::interfaces::csv::event_reader::{Event, EventReader, EventType};
use calmora_billing::interfaces::csv::outcome_writer::OutcomeWriter;
use chrono::Duration;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input billing events CSV file
    input: PathBuf,

    /// Path to persistent database (optional). Requires the
    /// `storage-rocksdb` feature.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

/// Boxed store handles for the orchestrator plus a second set for seeding,
/// both backed by the same underlying store.
struct Backend {
    payments: PaymentStoreBox,
    appointments: AppointmentStoreBox,
    seed_payments: PaymentStoreBox,
    seed_appointments: AppointmentStoreBox,
    notifications: NotificationStoreBox,
    preferences: PreferenceStoreBox,
}

fn in_memory_backend() -> Backend {
    let payments = InMemoryPaymentStore::new();
    let appointments = InMemoryAppointmentStore::new();
    Backend {
        payments: Box::new(payments.clone()),
        appointments: Box::new(appointments.clone()),
        seed_payments: Box::new(payments),
        seed_appointments: Box::new(appointments),
        notifications: Box::new(InMemoryNotificationStore::new()),
        preferences: Box::new(InMemoryPreferenceStore::new()),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_backend(db_path: Option<PathBuf>) -> Result<Backend> {
    use calmora_billing::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Backend {
                payments: Box::new(store.clone()),
                appointments: Box::new(store.clone()),
                seed_payments: Box::new(store.clone()),
                seed_appointments: Box::new(store.clone()),
                notifications: Box::new(store.clone()),
                preferences: Box::new(store),
            })
        }
        None => Ok(in_memory_backend()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_backend(db_path: Option<PathBuf>) -> Result<Backend> {
    if db_path.is_some() {
        return Err(miette::miette!(
            "this binary was built without the storage-rocksdb feature; --db-path is unavailable"
        ));
    }
    Ok(in_memory_backend())
}

async fn seed_payment(
    payments: &PaymentStoreBox,
    appointments: &AppointmentStoreBox,
    clock: &ClockHandle,
    event: &Event,
) -> std::result::Result<(), BillingError> {
    let client = event
        .client
        .ok_or_else(|| BillingError::ValidationError("payment row missing client".to_string()))?;
    let raw_amount = event
        .amount
        .ok_or_else(|| BillingError::ValidationError("payment row missing amount".to_string()))?;
    let starts_in = event.starts_in_minutes.ok_or_else(|| {
        BillingError::ValidationError("payment row missing starts_in_minutes".to_string())
    })?;

    let now = clock.now();
    let mut payment = Payment::new(
        event.payment,
        client,
        Some(event.payment),
        Amount::new(raw_amount)?,
        format!("pi_{}", event.payment),
    );
    payment.mark_succeeded(now)?;
    payments.store(payment).await?;
    appointments
        .store(Appointment::new(
            event.payment,
            client,
            0,
            now + Duration::minutes(starts_in),
        ))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the outcome CSV.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let Backend {
        payments,
        appointments,
        seed_payments,
        seed_appointments,
        notifications,
        preferences,
    } = open_backend(cli.db_path)?;
    let clock: ClockHandle = Arc::new(SystemClock);
    let gateway = SandboxGateway::new();
    let queue = InMemoryTaskQueue::new();

    let dispatcher = NotificationDispatcher::new(
        preferences,
        notifications,
        Box::new(queue.clone()),
        clock.clone(),
    );
    let orchestrator = RefundOrchestrator::new(
        payments,
        appointments,
        Box::new(gateway.clone()),
        clock.clone(),
        dispatcher,
    );

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    let mut outcomes: Vec<(u32, RefundOutcome)> = Vec::new();
    for event_result in reader.events() {
        match event_result {
            Ok(event) => match event.r#type {
                EventType::Payment => {
                    if let Err(e) =
                        seed_payment(&seed_payments, &seed_appointments, &clock, &event).await
                    {
                        eprintln!("Error seeding payment {}: {}", event.payment, e);
                    }
                }
                EventType::Cancel => {
                    let reason = event.reason.clone().unwrap_or_default();
                    let outcome = orchestrator.process_refund(event.payment, &reason).await;
                    outcomes.push((event.payment, outcome));
                }
            },
            Err(e) => {
                eprintln!("Error reading event: {}", e);
            }
        }
    }

    info!(
        gateway_calls = gateway.calls().await.len(),
        emails_enqueued = queue.enqueued().await.len(),
        "event stream processed"
    );

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    writer.write_outcomes(&outcomes).into_diagnostic()?;

    Ok(())
}
