//! Action Factory
//!
//! Turns a logged `(actionKind, payload)` pair back into an executable
//! [`Command`]. Unknown kinds and malformed payloads are fatal for replay.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::game::action::{Action, ActionKind, Command};
use crate::game::rules::Rules;
use crate::game::state::{Direction, MonsterId};
use crate::replay::error::ReplayError;
use crate::replay::record::ActionRecord;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MovePayload {
    direction: Direction,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttackPayload {
    target: MonsterId,
}

/// Builds commands bound to one rule set.
#[derive(Clone, Debug)]
pub struct ActionFactory {
    rules: Arc<Rules>,
}

impl ActionFactory {
    /// Factory for a rule set.
    pub fn new(rules: Arc<Rules>) -> Self {
        Self { rules }
    }

    /// Rule set commands are bound to.
    pub fn rules(&self) -> &Arc<Rules> {
        &self.rules
    }

    /// Decode an action from its kind tag and payload.
    pub fn parse(kind: &str, payload: &Value) -> Result<Action, ReplayError> {
        let kind: ActionKind = kind
            .parse()
            .map_err(|_| ReplayError::UnknownActionKind(kind.to_string()))?;

        let action = match kind {
            ActionKind::Move => {
                let p: MovePayload = decode(kind, payload)?;
                Action::Move { direction: p.direction }
            }
            ActionKind::Attack => {
                let p: AttackPayload = decode(kind, payload)?;
                Action::Attack { target: p.target }
            }
            ActionKind::PickUp => unit(kind, payload, Action::PickUp)?,
            ActionKind::Descend => unit(kind, payload, Action::Descend)?,
            ActionKind::Rest => unit(kind, payload, Action::Rest)?,
            ActionKind::Save => unit(kind, payload, Action::Save)?,
            ActionKind::SpawnWanderer => unit(kind, payload, Action::SpawnWanderer)?,
            ActionKind::ToggleRenderMode => unit(kind, payload, Action::ToggleRenderMode)?,
            ActionKind::RevealMap => unit(kind, payload, Action::RevealMap)?,
        };
        Ok(action)
    }

    /// Build a command from a kind tag and payload.
    pub fn build(&self, kind: &str, payload: &Value) -> Result<Command, ReplayError> {
        Ok(self.bind(Self::parse(kind, payload)?))
    }

    /// Build the command a log entry describes.
    pub fn build_record(&self, record: &ActionRecord) -> Result<Command, ReplayError> {
        self.build(&record.action_kind, &record.payload)
    }

    /// Bind an already-typed action.
    pub fn bind(&self, action: Action) -> Command {
        Command::new(action, self.rules.clone())
    }
}

fn decode<T: DeserializeOwned>(kind: ActionKind, payload: &Value) -> Result<T, ReplayError> {
    T::deserialize(payload).map_err(|e| ReplayError::MalformedPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Payload-less kinds accept `null` or `{}` and nothing else.
fn unit(kind: ActionKind, payload: &Value, action: Action) -> Result<Action, ReplayError> {
    match payload {
        Value::Null => Ok(action),
        Value::Object(map) if map.is_empty() => Ok(action),
        other => Err(ReplayError::MalformedPayload {
            kind,
            reason: format!("expected no payload, found {}", other),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
