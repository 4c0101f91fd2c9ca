//! Civilization special abilities.
//!
//! An ability is a timed, cooldown-gated bundle of [`AbilityEffect`]s.
//! Timers are stored as tick deadlines and evaluated by
//! [`Ability::update`] once per tick; nothing waits.

use serde::{Deserialize, Serialize};

use crate::components::Tick;
use crate::error::{GameError, Result};
use crate::math::percent;
use crate::modifiers::{EffectId, ModifierKind, ModifierRegistry, ModifierSet};
use crate::resources::{ResourceBundle, ResourceKind};

/// One thing an ability does when activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityEffect {
    /// Scale a modifier by `percent / 100` for the ability's duration.
    Scale {
        /// Modifier to scale.
        kind: ModifierKind,
        /// Factor as a whole percentage.
        percent: i32,
    },
    /// Credit the owner's ledger once, at activation.
    Grant {
        /// Resource to credit.
        resource: ResourceKind,
        /// Amount credited.
        amount: u32,
    },
}

/// Static description of an ability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityDescriptor {
    /// Display name.
    pub name: String,
    /// How long the effects last, in seconds.
    pub duration_secs: u32,
    /// Time from activation until the ability is ready again, in seconds.
    pub cooldown_secs: u32,
    /// Effects applied on activation.
    pub effects: Vec<AbilityEffect>,
}

impl AbilityDescriptor {
    /// Resources credited at activation.
    #[must_use]
    pub fn grants(&self) -> ResourceBundle {
        let pairs: Vec<_> = self
            .effects
            .iter()
            .filter_map(|effect| match *effect {
                AbilityEffect::Grant { resource, amount } => Some((resource, amount)),
                AbilityEffect::Scale { .. } => None,
            })
            .collect();
        ResourceBundle::from_pairs(&pairs)
    }
}

/// Lifecycle of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityState {
    /// May be activated.
    Ready,
    /// Effects are applied.
    Active {
        /// Tick of activation.
        since: Tick,
        /// Tick at which the effects expire.
        until: Tick,
    },
    /// Waiting out the cooldown.
    Cooldown {
        /// Tick at which the ability becomes ready.
        ready_at: Tick,
    },
}

/// A timer transition observed by [`Ability::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityTransition {
    /// Effects expired and were reverted.
    Expired,
    /// The cooldown finished.
    Ready,
}

/// A civilization ability with its timer state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ability {
    descriptor: AbilityDescriptor,
    duration_ticks: Tick,
    cooldown_ticks: Tick,
    state: AbilityState,
}

impl Ability {
    /// Build a ready ability, converting seconds to ticks at `tick_rate`.
    #[must_use]
    pub fn new(descriptor: AbilityDescriptor, tick_rate: u32) -> Self {
        let rate = Tick::from(tick_rate);
        Self {
            duration_ticks: Tick::from(descriptor.duration_secs) * rate,
            cooldown_ticks: Tick::from(descriptor.cooldown_secs) * rate,
            descriptor,
            state: AbilityState::Ready,
        }
    }

    /// Static description.
    #[must_use]
    pub const fn descriptor(&self) -> &AbilityDescriptor {
        &self.descriptor
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AbilityState {
        self.state
    }

    /// Whether the effects are currently applied.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, AbilityState::Active { .. })
    }

    /// Advance timers to `now`, reverting expired effects.
    ///
    /// Returns every transition passed through, in order. Both appear in one
    /// call when the cooldown ends no later than the expiry.
    pub fn update(&mut self, now: Tick, registry: &mut ModifierRegistry) -> Vec<AbilityTransition> {
        let mut transitions = Vec::new();

        if let AbilityState::Active { since, until } = self.state {
            if now >= until {
                registry.revert_all(EffectId::Ability);
                self.state = AbilityState::Cooldown {
                    ready_at: (since + self.cooldown_ticks).max(until),
                };
                tracing::info!(ability = %self.descriptor.name, tick = now, "Ability expired");
                transitions.push(AbilityTransition::Expired);
            }
        }

        if let AbilityState::Cooldown { ready_at } = self.state {
            if now >= ready_at {
                self.state = AbilityState::Ready;
                transitions.push(AbilityTransition::Ready);
            }
        }

        transitions
    }

    /// Activate at `now`, applying every scale effect.
    ///
    /// Returns the resources to credit to the owner.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::CooldownActive`] unless the ability is ready.
    pub fn activate(
        &mut self,
        now: Tick,
        registry: &mut ModifierRegistry,
    ) -> Result<ResourceBundle> {
        self.update(now, registry);
        if self.state != AbilityState::Ready {
            return Err(GameError::CooldownActive);
        }

        for effect in &self.descriptor.effects {
            if let AbilityEffect::Scale { kind, percent: p } = *effect {
                registry.apply_effect(kind, percent(p), EffectId::Ability);
            }
        }
        self.state = AbilityState::Active {
            since: now,
            until: now + self.duration_ticks,
        };
        tracing::info!(ability = %self.descriptor.name, tick = now, "Ability activated");
        Ok(self.descriptor.grants())
    }

    /// End an active ability early. The cooldown still runs from activation.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the ability is not active.
    pub fn deactivate(
        &mut self,
        now: Tick,
        registry: &mut ModifierRegistry,
    ) -> Result<ModifierSet> {
        let AbilityState::Active { since, .. } = self.state else {
            return Err(GameError::InvalidState(format!(
                "ability '{}' is not active",
                self.descriptor.name
            )));
        };
        let touched = registry.revert_all(EffectId::Ability);
        self.state = AbilityState::Cooldown {
            ready_at: (since + self.cooldown_ticks).max(now),
        };
        tracing::info!(ability = %self.descriptor.name, tick = now, "Ability deactivated");
        Ok(touched)
    }
}
