//! Poll service
//!
//! Owns the protocol client and runs the periodic poll loop: fetch a
//! snapshot, run the update tracker, forward the selected fields. Operator
//! writes share the client through the same mutex, so poll reads and writes
//! are serialized over the single half-duplex connection.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HeatSrvConfig;
use crate::error::{HeatSrvError, Result};
use crate::protocol::{Command, LuxtronikClient};
use crate::registers::{self, FieldValue, Unit};
use crate::snapshot;
use crate::tracker::UpdateTracker;

/// One forwarded field update on the output boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub field: &'static str,
    pub value: FieldValue,
    pub unit: Unit,
    pub timestamp: DateTime<Utc>,
}

/// Handle for interacting with a running poll service.
#[derive(Clone)]
pub struct ServiceHandle {
    client: Arc<Mutex<LuxtronikClient>>,
    refresh: Arc<Notify>,
}

impl ServiceHandle {
    /// Write a parameter by field identifier, raw value in register units.
    ///
    /// The value is validated against the parameter's permitted set before
    /// anything goes on the wire. A write the controller does not echo back
    /// verbatim is reported as failed. A successful write triggers an
    /// immediate poll so the new parameter value is observed right away.
    pub async fn write_parameter(&self, id: &str, value: i32) -> Result<()> {
        let param = registers::writable(id).ok_or_else(|| {
            HeatSrvError::validation(format!("parameter {id} is not writable"))
        })?;
        param.validate(value)?;

        let mut client = self.client.lock().await;
        client
            .execute(&Command::WriteParameter {
                index: param.index,
                value,
            })
            .await?;
        drop(client);

        info!(parameter = id, value, "parameter written");
        self.refresh.notify_one();
        Ok(())
    }
}

/// The poll service. Construct with [`PollService::new`], obtain a
/// [`ServiceHandle`] and drive it with [`PollService::run`].
pub struct PollService {
    config: HeatSrvConfig,
    client: Arc<Mutex<LuxtronikClient>>,
    tracker: UpdateTracker,
    refresh: Arc<Notify>,
    updates: mpsc::Sender<FieldUpdate>,
}

impl PollService {
    pub fn new(config: HeatSrvConfig, updates: mpsc::Sender<FieldUpdate>) -> Self {
        let client = Arc::new(Mutex::new(LuxtronikClient::new(config.client_options())));
        let tracker = UpdateTracker::new(config.heartbeat(), config.poll.epsilon);
        Self {
            config,
            client,
            tracker,
            refresh: Arc::new(Notify::new()),
            updates,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            client: Arc::clone(&self.client),
            refresh: Arc::clone(&self.refresh),
        }
    }

    /// Run the poll loop until cancelled. The first poll happens immediately,
    /// then on every interval tick and after every successful write. A failed
    /// poll cycle is logged and the loop waits for the next trigger; the
    /// process never exits because the controller was unreachable.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.poll.interval_secs,
            heartbeat_secs = self.config.poll.heartbeat_secs,
            "poll service started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    break;
                },
                _ = interval.tick() => {
                    self.poll_once().await?;
                },
                _ = self.refresh.notified() => {
                    debug!("refresh requested");
                    self.poll_once().await?;
                },
            }
        }

        self.client.lock().await.disconnect();
        info!("poll service stopped");
        Ok(())
    }

    /// One poll cycle. Transport failures are absorbed here; only a closed
    /// update channel stops the service.
    async fn poll_once(&mut self) -> Result<()> {
        let result = {
            let mut client = self.client.lock().await;
            snapshot::build(&mut client).await
        };

        let snap = match result {
            Ok(snap) => snap,
            Err(e) => {
                warn!(error = %e, "poll cycle failed, keeping previous state");
                return Ok(());
            },
        };

        let forward = self.tracker.decide(&snap, Instant::now());
        if forward.is_empty() {
            debug!(fields = snap.len(), "no updates to forward");
            return Ok(());
        }

        debug!(forwarded = forward.len(), fields = snap.len(), "forwarding updates");
        for id in forward {
            // decide() only returns ids present in the snapshot
            let Some(reading) = snap.get(id) else { continue };
            let update = FieldUpdate {
                field: id,
                value: reading.value.clone(),
                unit: reading.unit,
                timestamp: snap.taken_at_utc,
            };
            if self.updates.send(update).await.is_err() {
                error!("update channel closed");
                return Err(HeatSrvError::internal("update channel closed"));
            }
        }
        Ok(())
    }
}
