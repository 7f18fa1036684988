use crate::catalog::items::ConsumableEffect;

pub const HEALTH_MAX: f32 = 100.0;
pub const HUNGER_MAX: f32 = 100.0;
pub const THIRST_MAX: f32 = 100.0;
pub const TEMPERATURE_MIN: f32 = -50.0;
pub const TEMPERATURE_MAX: f32 = 50.0;
pub const TEMPERATURE_NEUTRAL: f32 = 20.0;

const HUNGER_DECAY_PER_SEC: f32 = 0.25;
const THIRST_DECAY_PER_SEC: f32 = 0.4;
const TEMPERATURE_DRIFT_PER_SEC: f32 = 0.05;
const STARVATION_DAMAGE_PER_SEC: f32 = 1.0;
const DEHYDRATION_DAMAGE_PER_SEC: f32 = 1.5;
const EXPOSURE_DAMAGE_PER_SEC: f32 = 2.0;
const HOT_THRESHOLD: f32 = 45.0;
const COLD_THRESHOLD: f32 = -10.0;
const REGEN_THRESHOLD: f32 = 60.0;
const REGEN_PER_SEC: f32 = 0.5;

/// Bounded survival scalars. Once `is_dead` is set nothing mutates except
/// through `respawn`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStats {
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
    pub temperature: f32,
    pub is_dead: bool,
    pub death_handled: bool,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            health: HEALTH_MAX,
            hunger: HUNGER_MAX,
            thirst: THIRST_MAX,
            temperature: TEMPERATURE_NEUTRAL,
            is_dead: false,
            death_handled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatTickOutcome {
    pub damage_taken: f32,
    /// Dominant damage source for this tick, empty when unhurt.
    pub cause: &'static str,
    pub died: bool,
}

impl PlayerStats {
    /// Advances decay, drift, environmental damage and regen by `dt`
    /// seconds. Dead players are untouched.
    pub fn tick(&mut self, dt: f32) -> StatTickOutcome {
        let mut outcome = StatTickOutcome::default();
        if self.is_dead || dt <= 0.0 {
            return outcome;
        }

        self.hunger = (self.hunger - HUNGER_DECAY_PER_SEC * dt).max(0.0);
        self.thirst = (self.thirst - THIRST_DECAY_PER_SEC * dt).max(0.0);
        self.temperature += (TEMPERATURE_NEUTRAL - self.temperature)
            * (TEMPERATURE_DRIFT_PER_SEC * dt).min(1.0);
        self.temperature = self.temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

        let mut damage = 0.0;
        if self.hunger <= 0.0 {
            damage += STARVATION_DAMAGE_PER_SEC * dt;
            outcome.cause = "starvation";
        }
        if self.thirst <= 0.0 {
            damage += DEHYDRATION_DAMAGE_PER_SEC * dt;
            if outcome.cause.is_empty() {
                outcome.cause = "dehydration";
            }
        }
        if self.temperature > HOT_THRESHOLD || self.temperature < COLD_THRESHOLD {
            damage += EXPOSURE_DAMAGE_PER_SEC * dt;
            if outcome.cause.is_empty() {
                outcome.cause = "exposure";
            }
        }

        if damage > 0.0 {
            outcome.damage_taken = damage;
            outcome.died = self.apply_damage(damage);
        } else if self.hunger > REGEN_THRESHOLD && self.thirst > REGEN_THRESHOLD {
            self.health = (self.health + REGEN_PER_SEC * dt).min(HEALTH_MAX);
        }
        outcome
    }

    /// Returns true when this call crossed into death.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if self.is_dead || amount <= 0.0 {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.is_dead = true;
            return true;
        }
        false
    }

    pub fn apply_consumable(&mut self, effect: &ConsumableEffect) {
        if self.is_dead {
            return;
        }
        self.health = (self.health + effect.health).clamp(0.0, HEALTH_MAX);
        self.hunger = (self.hunger + effect.hunger).clamp(0.0, HUNGER_MAX);
        self.thirst = (self.thirst + effect.thirst).clamp(0.0, THIRST_MAX);
    }

    /// Claims the one-shot death handling. Death broadcasts and loot-bag
    /// creation key off the first claim only.
    pub fn claim_death_handling(&mut self) -> bool {
        if !self.is_dead || self.death_handled {
            return false;
        }
        self.death_handled = true;
        true
    }

    pub fn respawn(&mut self) {
        *self = PlayerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_clamps_at_floor() {
        let mut stats = PlayerStats::default();
        for _ in 0..1000 {
            // Keep the player alive so both meters actually reach the floor.
            stats.health = HEALTH_MAX;
            stats.tick(1.0);
        }
        assert_eq!(stats.hunger, 0.0);
        assert_eq!(stats.thirst, 0.0);
        assert!(!stats.is_dead);
    }

    #[test]
    fn starvation_and_dehydration_stack() {
        let mut stats = PlayerStats {
            hunger: 0.0,
            thirst: 0.0,
            ..PlayerStats::default()
        };
        let outcome = stats.tick(1.0);
        assert!((outcome.damage_taken - 2.5).abs() < 1e-5);
        assert!((stats.health - 97.5).abs() < 1e-5);
    }

    #[test]
    fn tick_names_the_damage_cause() {
        let mut stats = PlayerStats {
            hunger: 20.0,
            thirst: 0.0,
            ..PlayerStats::default()
        };
        let outcome = stats.tick(1.0);
        assert_eq!(outcome.cause, "dehydration");

        let mut starving = PlayerStats {
            hunger: 0.0,
            thirst: 0.0,
            ..PlayerStats::default()
        };
        assert_eq!(starving.tick(1.0).cause, "starvation");

        let mut frozen = PlayerStats {
            temperature: -40.0,
            ..PlayerStats::default()
        };
        assert_eq!(frozen.tick(1.0).cause, "exposure");

        let mut fine = PlayerStats::default();
        assert_eq!(fine.tick(1.0).cause, "");
    }

    #[test]
    fn temperature_drifts_toward_neutral() {
        let mut stats = PlayerStats {
            temperature: 50.0,
            ..PlayerStats::default()
        };
        stats.tick(1.0);
        assert!(stats.temperature < 50.0);
        assert!(stats.temperature > TEMPERATURE_NEUTRAL);

        let mut cold = PlayerStats {
            temperature: -40.0,
            ..PlayerStats::default()
        };
        cold.tick(1.0);
        assert!(cold.temperature > -40.0);
    }

    #[test]
    fn exposure_damages_outside_thresholds() {
        let mut stats = PlayerStats {
            temperature: 49.0,
            ..PlayerStats::default()
        };
        let outcome = stats.tick(1.0);
        assert!(outcome.damage_taken > 0.0);
    }

    #[test]
    fn regen_requires_both_stats_above_threshold() {
        let mut stats = PlayerStats {
            health: 50.0,
            hunger: 80.0,
            thirst: 80.0,
            ..PlayerStats::default()
        };
        stats.tick(1.0);
        assert!(stats.health > 50.0);

        let mut hungry = PlayerStats {
            health: 50.0,
            hunger: 40.0,
            thirst: 80.0,
            ..PlayerStats::default()
        };
        hungry.tick(1.0);
        assert_eq!(hungry.health, 50.0);
    }

    #[test]
    fn death_freezes_stats_until_respawn() {
        let mut stats = PlayerStats::default();
        assert!(stats.apply_damage(1000.0));
        assert!(stats.is_dead);
        let hunger = stats.hunger;
        stats.tick(5.0);
        assert_eq!(stats.hunger, hunger);
        stats.apply_consumable(&ConsumableEffect {
            health: 50.0,
            hunger: 0.0,
            thirst: 0.0,
        });
        assert_eq!(stats.health, 0.0);

        stats.respawn();
        assert!(!stats.is_dead);
        assert_eq!(stats.health, HEALTH_MAX);
    }

    #[test]
    fn death_handling_claim_is_one_shot() {
        let mut stats = PlayerStats::default();
        stats.apply_damage(1000.0);
        assert!(stats.claim_death_handling());
        assert!(!stats.claim_death_handling());
    }

    #[test]
    fn damage_on_dead_player_is_a_noop() {
        let mut stats = PlayerStats::default();
        stats.apply_damage(1000.0);
        assert!(!stats.apply_damage(10.0));
    }
}
