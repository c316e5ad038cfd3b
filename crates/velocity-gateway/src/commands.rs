//! Control commands shared by every transport.
//!
//! HTTP handlers, the `WebSocket` handler and the NATS bridge all reduce an
//! incoming request to a validated [`ControlCommand`] and hand it to
//! [`execute`]. That keeps the unknown-junction rule and the default
//! vehicle ids in one place.

use std::fmt;
use std::str::FromStr;

use tracing::info;
use velocity_core::JunctionRegistry;
use velocity_types::{JunctionId, JunctionMode, VehicleId};

use crate::error::GatewayError;
use crate::protocol::ProtocolError;

/// Vehicle recorded for HTTP triggers that do not name one.
pub const HTTP_DEFAULT_VEHICLE: &str = "http-unknown";

/// Vehicle recorded for emergencies raised through a manual override.
pub const MANUAL_OVERRIDE_VEHICLE: &str = "manual_override";

/// What a manual override asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// Force the emergency pattern.
    Emergency,
    /// Return to the rotation, starting at North.
    AutoCycle,
}

impl OverrideAction {
    /// Mode the junction is in once the override has been applied.
    pub const fn resulting_mode(self) -> JunctionMode {
        match self {
            Self::Emergency => JunctionMode::Emergency,
            Self::AutoCycle => JunctionMode::AutoCycle,
        }
    }
}

impl FromStr for OverrideAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergency" => Ok(Self::Emergency),
            "auto_cycle" => Ok(Self::AutoCycle),
            _ => Err(ProtocolError::InvalidAction),
        }
    }
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resulting_mode().as_str())
    }
}

/// A validated request against one junction.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Emergency vehicle approaching.
    Trigger {
        /// Target junction.
        junction_id: String,
        /// Approaching vehicle.
        vehicle_id: VehicleId,
    },
    /// Operator override.
    Override {
        /// Target junction.
        junction_id: String,
        /// Requested action.
        action: OverrideAction,
    },
    /// New position reported by the junction's device.
    Relocate {
        /// Target junction.
        junction_id: String,
        /// New latitude.
        lat: f64,
        /// New longitude.
        lng: f64,
        /// Kind of device that reported the position, for logging.
        device_type: Option<String>,
    },
}

impl ControlCommand {
    /// Junction the command is addressed to.
    pub fn junction_id(&self) -> &str {
        match self {
            Self::Trigger { junction_id, .. }
            | Self::Override { junction_id, .. }
            | Self::Relocate { junction_id, .. } => junction_id,
        }
    }
}

/// Result of a successfully applied command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The junction is now preempted.
    Triggered {
        /// Junction that was preempted.
        junction_id: JunctionId,
        /// Vehicle now recorded as `triggered_by`.
        vehicle_id: VehicleId,
    },
    /// The override was applied.
    Overridden {
        /// Junction that was overridden.
        junction_id: JunctionId,
        /// Mode after the override.
        mode: JunctionMode,
    },
    /// The junction moved.
    Relocated {
        /// Junction that moved.
        junction_id: JunctionId,
        /// New latitude.
        lat: f64,
        /// New longitude.
        lng: f64,
    },
}

impl CommandOutcome {
    /// Junction the outcome refers to.
    pub const fn junction_id(&self) -> &JunctionId {
        match self {
            Self::Triggered { junction_id, .. }
            | Self::Overridden { junction_id, .. }
            | Self::Relocated { junction_id, .. } => junction_id,
        }
    }
}

/// Apply `command` to the registry.
///
/// # Errors
///
/// Returns [`GatewayError::UnknownJunction`] if the junction is not
/// configured, or [`GatewayError::Controller`] if its worker has stopped.
pub async fn execute(
    registry: &JunctionRegistry,
    command: ControlCommand,
) -> Result<CommandOutcome, GatewayError> {
    let unknown = || GatewayError::UnknownJunction(command.junction_id().to_owned());

    match &command {
        ControlCommand::Trigger {
            junction_id,
            vehicle_id,
        } => {
            info!(%junction_id, vehicle_id = %vehicle_id, "Emergency trigger received");
            if !registry
                .trigger_emergency(junction_id, vehicle_id.clone())
                .await?
            {
                return Err(unknown());
            }
            Ok(CommandOutcome::Triggered {
                junction_id: JunctionId::new(junction_id.as_str()),
                vehicle_id: vehicle_id.clone(),
            })
        }
        ControlCommand::Override {
            junction_id,
            action,
        } => {
            info!(%junction_id, action = %action, "Manual override received");
            let applied = match action {
                OverrideAction::Emergency => {
                    registry
                        .trigger_emergency(junction_id, VehicleId::from(MANUAL_OVERRIDE_VEHICLE))
                        .await?
                }
                OverrideAction::AutoCycle => registry.request_auto_cycle(junction_id).await?,
            };
            if !applied {
                return Err(unknown());
            }
            Ok(CommandOutcome::Overridden {
                junction_id: JunctionId::new(junction_id.as_str()),
                mode: action.resulting_mode(),
            })
        }
        ControlCommand::Relocate {
            junction_id,
            lat,
            lng,
            device_type,
        } => {
            info!(
                %junction_id,
                lat,
                lng,
                device_type = device_type.as_deref().unwrap_or("unknown"),
                "Junction location update received"
            );
            if !registry.update_location(junction_id, *lat, *lng).await? {
                return Err(unknown());
            }
            Ok(CommandOutcome::Relocated {
                junction_id: JunctionId::new(junction_id.as_str()),
                lat: *lat,
                lng: *lng,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use velocity_core::{NoopSink, VelocityConfig};

    use super::*;

    #[test]
    fn override_actions_parse() {
        assert_eq!(
            "emergency".parse::<OverrideAction>().unwrap(),
            OverrideAction::Emergency
        );
        assert_eq!(
            "auto_cycle".parse::<OverrideAction>().unwrap(),
            OverrideAction::AutoCycle
        );
        assert_eq!(
            "green".parse::<OverrideAction>(),
            Err(ProtocolError::InvalidAction)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_emergency_records_override_vehicle() {
        let config = VelocityConfig::default_with_junctions();
        let registry = JunctionRegistry::spawn(&config, Arc::new(NoopSink));
        registry.start_all().await.unwrap();

        let outcome = execute(
            &registry,
            ControlCommand::Override {
                junction_id: "junction1".to_owned(),
                action: OverrideAction::Emergency,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.junction_id().as_str(), "junction1");
        let state = registry.junction("junction1").await.unwrap().unwrap();
        assert_eq!(
            state.triggered_by,
            Some(VehicleId::from(MANUAL_OVERRIDE_VEHICLE))
        );

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_junction_is_rejected() {
        let config = VelocityConfig::default_with_junctions();
        let registry = JunctionRegistry::spawn(&config, Arc::new(NoopSink));

        let err = execute(
            &registry,
            ControlCommand::Trigger {
                junction_id: "ghost".to_owned(),
                vehicle_id: VehicleId::from("amb-1"),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::UnknownJunction(ref id) if id == "ghost"));
        registry.shutdown().await;
    }
}
