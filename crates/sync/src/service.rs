use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::api::{ApiClient, ApiError, ArmCommand};
use crate::config::SyncConfig;
use crate::connection::{ConnectionEvent, ConnectionState, Connector};
use crate::notifications::{Notification, NotificationQueue, Severity};
use crate::protocol::{self, CameraFrame, OutboundMessage};
use crate::router;
use crate::state::{ArmStatus, DashboardState, DefectSnapshot};

struct CommandOutcome {
    command: ArmCommand,
    result: Result<ArmStatus, ApiError>,
}

/// Single-writer context owned by the event loop: the canonical snapshot,
/// the notification queue, and the channels that publish them.
struct Core {
    state: DashboardState,
    notifications: NotificationQueue,
    defects_tx: watch::Sender<DefectSnapshot>,
    arm_tx: watch::Sender<ArmStatus>,
    notifications_tx: watch::Sender<Vec<Notification>>,
    frames_tx: broadcast::Sender<CameraFrame>,
}

impl Core {
    /// Seed the snapshot from the REST collaborator. Called once per
    /// session start; on failure the zero-valued defaults stand and the
    /// operator gets one error notification.
    async fn seed(&mut self, api: &ApiClient) {
        let mut failed = false;

        match api.fetch_metrics().await {
            Ok(snapshot) => {
                tracing::info!(
                    total_defects = snapshot.total_defects,
                    "Initial metrics loaded"
                );
                self.state.defects = snapshot;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch initial metrics");
                failed = true;
            }
        }

        match api.fetch_arm_status().await {
            Ok(status) => {
                tracing::info!(status = status.as_str(), "Initial arm status loaded");
                self.state.arm_status = status;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch initial arm status");
                failed = true;
            }
        }

        if failed {
            self.notifications
                .push("Error", "Failed to fetch initial data", Severity::Error);
        }
        self.publish();
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Up => tracing::info!("Telemetry stream online"),
            ConnectionEvent::Down => tracing::info!("Telemetry stream offline"),
            ConnectionEvent::Frame(text) => self.handle_frame(&text),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(message) => {
                if router::dispatch(
                    message,
                    &mut self.state,
                    &mut self.notifications,
                    &self.frames_tx,
                ) {
                    self.publish();
                }
            }
            // A frame that does not decode is dropped; the stream lives on.
            Err(e) => tracing::warn!(error = %e, "Dropping undecodable frame"),
        }
    }

    fn apply_command_outcome(&mut self, outcome: CommandOutcome) {
        match outcome.result {
            Ok(status) => {
                self.state.arm_status = status;
                self.notifications.push(
                    "Robotic Arm",
                    format!(
                        "Successfully {} the robotic arm",
                        outcome.command.past_tense()
                    ),
                    Severity::Success,
                );
                tracing::info!(
                    command = outcome.command.as_str(),
                    status = status.as_str(),
                    "Arm command applied"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    command = outcome.command.as_str(),
                    "Arm command failed"
                );
                self.notifications.push(
                    "Error",
                    format!("Failed to {} robotic arm", outcome.command.as_str()),
                    Severity::Error,
                );
            }
        }
        self.publish();
    }

    fn expire_notifications(&mut self) {
        let removed = self.notifications.expire_due(Instant::now());
        if removed > 0 {
            tracing::debug!(removed, "Notifications expired");
            self.publish();
        }
    }

    /// Push the current snapshot, arm status, and notification list to
    /// consumers. Watch channels only wake readers on actual changes.
    fn publish(&mut self) {
        let defects = self.state.defects.clone();
        self.defects_tx.send_if_modified(|current| {
            if *current != defects {
                *current = defects;
                true
            } else {
                false
            }
        });

        let status = self.state.arm_status;
        self.arm_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });

        let live = self.notifications.live();
        self.notifications_tx.send_if_modified(|current| {
            let changed = current.len() != live.len()
                || current.iter().zip(&live).any(|(a, b)| a.id != b.id);
            if changed {
                *current = live;
            }
            changed
        });
    }
}

/// The synchronization service: owns the event loop that is the sole
/// writer of dashboard state. Built together with the [`SyncHandle`] the
/// view layer consumes.
pub struct SyncService {
    config: SyncConfig,
    api: ApiClient,
    core: Core,
    conn_state_tx: watch::Sender<ConnectionState>,
    conn_events_tx: mpsc::Sender<ConnectionEvent>,
    conn_events_rx: mpsc::Receiver<ConnectionEvent>,
    commands_rx: mpsc::Receiver<ArmCommand>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    stop: watch::Receiver<bool>,
}

/// Read access and commands for downstream consumers. Cloneable; dropping
/// every handle shuts the service down.
#[derive(Clone)]
pub struct SyncHandle {
    defects: watch::Receiver<DefectSnapshot>,
    arm_status: watch::Receiver<ArmStatus>,
    connection: watch::Receiver<ConnectionState>,
    notifications: watch::Receiver<Vec<Notification>>,
    frames_tx: broadcast::Sender<CameraFrame>,
    commands_tx: mpsc::Sender<ArmCommand>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl SyncService {
    pub fn build(config: SyncConfig, api: ApiClient) -> (SyncService, SyncHandle) {
        let ttl = Duration::from_millis(config.notification_ttl_ms);

        let (defects_tx, defects_rx) = watch::channel(DefectSnapshot::default());
        let (arm_tx, arm_rx) = watch::channel(ArmStatus::Unknown);
        let (conn_state_tx, conn_state_rx) = watch::channel(ConnectionState::Disconnected);
        let (notifications_tx, notifications_rx) = watch::channel(Vec::new());
        let (frames_tx, _) = broadcast::channel(16);
        let (conn_events_tx, conn_events_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let core = Core {
            state: DashboardState::default(),
            notifications: NotificationQueue::new(ttl),
            defects_tx,
            arm_tx,
            notifications_tx,
            frames_tx: frames_tx.clone(),
        };

        let service = SyncService {
            config,
            api,
            core,
            conn_state_tx,
            conn_events_tx,
            conn_events_rx,
            commands_rx,
            outbound_tx: outbound_tx.clone(),
            outbound_rx,
            stop: stop_rx,
        };

        let handle = SyncHandle {
            defects: defects_rx,
            arm_status: arm_rx,
            connection: conn_state_rx,
            notifications: notifications_rx,
            frames_tx,
            commands_tx,
            outbound_tx,
            stop_tx: Arc::new(stop_tx),
        };

        (service, handle)
    }

    /// Run until shutdown. Seeds state from the REST snapshot, spawns the
    /// connection manager, then serializes every mutation through one
    /// `select!` loop: stream events, command outcomes, and notification
    /// expiries all interleave here.
    pub async fn run(self) -> anyhow::Result<()> {
        let SyncService {
            config,
            api,
            mut core,
            conn_state_tx,
            conn_events_tx,
            mut conn_events_rx,
            mut commands_rx,
            outbound_tx,
            outbound_rx,
            mut stop,
        } = self;

        core.seed(&api).await;

        let connector = Connector::new(
            config.ws_url.clone(),
            Duration::from_millis(config.reconnect_delay_ms),
            conn_state_tx,
            conn_events_tx,
            outbound_rx,
            stop.clone(),
        );
        tokio::spawn(connector.run());

        // Keeps the connector's outbound channel open even if the view
        // layer drops every handle clone's sender first.
        let _outbound_tx = outbound_tx;

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<CommandOutcome>(8);

        tracing::info!("Sync loop running");
        loop {
            let next_expiry = core.notifications.next_expiry();
            tokio::select! {
                event = conn_events_rx.recv() => match event {
                    Some(event) => core.handle_connection_event(event),
                    None => break,
                },
                Some(command) = commands_rx.recv() => {
                    tracing::info!(command = command.as_str(), "Issuing arm command");
                    let api = api.clone();
                    let outcome_tx = outcome_tx.clone();
                    tokio::spawn(async move {
                        let result = api.arm_command(command).await;
                        let _ = outcome_tx.send(CommandOutcome { command, result }).await;
                    });
                },
                Some(outcome) = outcome_rx.recv() => core.apply_command_outcome(outcome),
                _ = expiry(next_expiry) => core.expire_notifications(),
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }

        tracing::info!("Sync loop stopped");
        Ok(())
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl SyncHandle {
    pub fn defects(&self) -> DefectSnapshot {
        self.defects.borrow().clone()
    }

    pub fn arm_status(&self) -> ArmStatus {
        *self.arm_status.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.borrow().clone()
    }

    /// Watch receivers for reactive consumers that re-render on change.
    pub fn watch_defects(&self) -> watch::Receiver<DefectSnapshot> {
        self.defects.clone()
    }

    pub fn watch_arm_status(&self) -> watch::Receiver<ArmStatus> {
        self.arm_status.clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn watch_notifications(&self) -> watch::Receiver<Vec<Notification>> {
        self.notifications.clone()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<CameraFrame> {
        self.frames_tx.subscribe()
    }

    /// Queue a control command; its outcome lands in the arm status and
    /// the notification list.
    pub async fn issue_arm_command(&self, command: ArmCommand) -> anyhow::Result<()> {
        self.commands_tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("sync service is not running"))
    }

    /// Send an envelope over the transport. Reported as a no-op by the
    /// connection manager if the stream is down.
    pub async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        self.outbound_tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("sync service is not running"))
    }

    /// Stop the service: cancels any pending reconnect and ends the loop.
    /// Already-scheduled notification expiries are simply abandoned.
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
    }
}
