use tokio::sync::broadcast;

use crate::notifications::{NotificationQueue, Severity};
use crate::protocol::{CameraFrame, InboundMessage};
use crate::state::{ArmStatus, DashboardState};

/// Dispatch one decoded message to its handler. Messages are processed
/// strictly one at a time, in receipt order. Returns true when the
/// persisted snapshot or the notification list changed.
pub fn dispatch(
    message: InboundMessage,
    state: &mut DashboardState,
    notifications: &mut NotificationQueue,
    frames_tx: &broadcast::Sender<CameraFrame>,
) -> bool {
    match message {
        InboundMessage::DefectUpdate(delta) => {
            if let Some(new_defect) = &delta.new_defect {
                notifications.push(
                    "New Defect Detected",
                    format!("Defect type: {}", new_defect.defect_type),
                    Severity::Warning,
                );
            }
            state.defects.apply(&delta);
            tracing::debug!(
                total_defects = state.defects.total_defects,
                "Defect metrics merged"
            );
            true
        }
        InboundMessage::RoboticArmUpdate { status } => {
            state.arm_status = status;
            if status == ArmStatus::Error {
                notifications.push(
                    "Robotic Arm Error",
                    "The robotic arm has encountered an issue",
                    Severity::Error,
                );
            }
            tracing::debug!(status = status.as_str(), "Arm status updated");
            true
        }
        InboundMessage::CameraFeed(frame) => {
            // Lagging render consumers drop frames rather than stalling the loop.
            let _ = frames_tx.send(frame);
            false
        }
        InboundMessage::Unknown { msg_type } => {
            tracing::debug!(msg_type = %msg_type, "Ignoring unknown message type");
            false
        }
    }
}
