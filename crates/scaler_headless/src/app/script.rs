use std::num::ParseIntError;

use scaler::{Keybinds, ScalerAction};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("script entry '{entry}' is missing '@tick'")]
    MissingTick { entry: String },
    #[error("script entry '{entry}' has an invalid tick: {source}")]
    InvalidTick {
        entry: String,
        #[source]
        source: ParseIntError,
    },
    #[error("script entry '{entry}' names no known action or bound key")]
    UnknownAction { entry: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScriptStep {
    pub(crate) tick: u64,
    pub(crate) action: ScalerAction,
}

/// Actions to fire at given ticks, kept in tick order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ActionScript {
    steps: Vec<ScriptStep>,
}

impl ActionScript {
    /// Parses `Action@tick` entries separated by commas. The action part may
    /// be an action name or a key bound in `keybinds`.
    pub(crate) fn parse(raw: &str, keybinds: &Keybinds) -> Result<Self, ScriptError> {
        let mut steps = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (name, tick) = entry
                .rsplit_once('@')
                .ok_or_else(|| ScriptError::MissingTick {
                    entry: entry.to_string(),
                })?;
            let tick = tick
                .trim()
                .parse::<u64>()
                .map_err(|source| ScriptError::InvalidTick {
                    entry: entry.to_string(),
                    source,
                })?;
            let action = ScalerAction::from_name(name)
                .or_else(|| keybinds.action_for_key(name))
                .ok_or_else(|| ScriptError::UnknownAction {
                    entry: entry.to_string(),
                })?;
            steps.push(ScriptStep { tick, action });
        }
        steps.sort_by_key(|step| step.tick);
        Ok(Self { steps })
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn actions_at(&self, tick: u64) -> impl Iterator<Item = ScalerAction> + '_ {
        self.steps
            .iter()
            .skip_while(move |step| step.tick < tick)
            .take_while(move |step| step.tick == tick)
            .map(|step| step.action)
    }
}
