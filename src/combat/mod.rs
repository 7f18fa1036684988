use crate::catalog::items::{ItemCatalog, ItemTypeId, ToolKind};
use crate::entities::player::{PlayerId, PlayerMap};
use crate::world::position::Vec3;

pub const HEADSHOT_MULTIPLIER: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackRequest {
    pub victim: PlayerId,
    pub weapon: ItemTypeId,
    pub hit_position: Vec3,
    pub headshot: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackResolution {
    pub success: bool,
    pub damage: f32,
    pub headshot: bool,
    pub killed: bool,
    pub distance: f32,
    pub reason: &'static str,
}

impl AttackResolution {
    fn failure(reason: &'static str) -> Self {
        Self {
            success: false,
            damage: 0.0,
            headshot: false,
            killed: false,
            distance: 0.0,
            reason,
        }
    }
}

/// Resolves an attack inside one critical section over the player map so
/// concurrent attacks on the same victim cannot double-spend health.
///
/// The only server-side validation is that the attacker holds the named
/// weapon; hit position and headshot flag are client-asserted (a known
/// trust boundary carried over from the observed design).
pub fn resolve_attack(
    catalog: &ItemCatalog,
    players: &mut PlayerMap,
    attacker_id: PlayerId,
    request: AttackRequest,
) -> AttackResolution {
    let Some(attacker) = players.get(attacker_id) else {
        return AttackResolution::failure("unknown attacker");
    };
    if attacker.stats.is_dead {
        return AttackResolution::failure("attacker is dead");
    }
    if !attacker.inventory.holds(request.weapon) {
        return AttackResolution::failure("weapon not held");
    }
    let Some(profile) = catalog.get(request.weapon).and_then(|def| def.tool) else {
        return AttackResolution::failure("item is not a weapon");
    };
    if profile.kind != ToolKind::Weapon {
        return AttackResolution::failure("item is not a weapon");
    }
    let attacker_position = attacker.position;

    let Some(victim) = players.get_mut(request.victim) else {
        return AttackResolution::failure("unknown target");
    };
    if victim.stats.is_dead {
        return AttackResolution::failure("target is already dead");
    }

    let damage = if request.headshot {
        profile.damage * HEADSHOT_MULTIPLIER
    } else {
        profile.damage
    };
    let killed = victim.stats.apply_damage(damage);
    let distance = attacker_position.distance_to(victim.position);
    AttackResolution {
        success: true,
        damage,
        headshot: request.headshot,
        killed,
        distance,
        reason: "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded { ammo_remaining: u16 },
    Failed(&'static str),
}

/// Reload only reports the held ammo count; magazine state lives
/// client-side in the observed design.
pub fn resolve_reload(
    catalog: &ItemCatalog,
    players: &PlayerMap,
    player_id: PlayerId,
    weapon: ItemTypeId,
) -> ReloadOutcome {
    let Some(player) = players.get(player_id) else {
        return ReloadOutcome::Failed("unknown player");
    };
    if !player.inventory.holds(weapon) {
        return ReloadOutcome::Failed("cannot reload this weapon");
    }
    let ammo_item = match catalog.get(weapon).and_then(|def| def.tool) {
        Some(profile) if profile.kind == ToolKind::Weapon => profile.ammo,
        _ => return ReloadOutcome::Failed("cannot reload this weapon"),
    };
    let Some(ammo_item) = ammo_item else {
        return ReloadOutcome::Failed("cannot reload this weapon");
    };
    let held = player.inventory.count_of(ammo_item);
    if held == 0 {
        return ReloadOutcome::Failed("no ammo");
    }
    ReloadOutcome::Reloaded {
        ammo_remaining: held.min(u32::from(u16::MAX)) as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::items::default_catalog;

    const BOW: ItemTypeId = ItemTypeId(211);
    const ARROW: ItemTypeId = ItemTypeId(212);
    const ROCK: ItemTypeId = ItemTypeId(210);
    const WOOD: ItemTypeId = ItemTypeId(100);

    fn two_players(catalog: &ItemCatalog) -> (PlayerMap, PlayerId, PlayerId) {
        let mut players = PlayerMap::new();
        let attacker = players.create("attacker".to_string(), Vec3::default());
        let victim = players.create("victim".to_string(), Vec3::new(10.0, 0.0, 0.0));
        players
            .get_mut(attacker)
            .expect("attacker")
            .inventory
            .add_item(catalog, BOW, 1)
            .expect("bow");
        (players, attacker, victim)
    }

    #[test]
    fn unheld_weapon_fails_without_damage() {
        let catalog = default_catalog();
        let (mut players, attacker, victim) = two_players(&catalog);
        let resolution = resolve_attack(
            &catalog,
            &mut players,
            attacker,
            AttackRequest {
                victim,
                weapon: ROCK,
                hit_position: Vec3::default(),
                headshot: false,
            },
        );
        assert!(!resolution.success);
        assert_eq!(resolution.reason, "weapon not held");
        assert_eq!(players.get(victim).expect("victim").stats.health, 100.0);
    }

    #[test]
    fn headshot_doubles_weapon_damage() {
        let catalog = default_catalog();
        let (mut players, attacker, victim) = two_players(&catalog);
        let resolution = resolve_attack(
            &catalog,
            &mut players,
            attacker,
            AttackRequest {
                victim,
                weapon: BOW,
                hit_position: Vec3::new(10.0, 1.8, 0.0),
                headshot: true,
            },
        );
        assert!(resolution.success);
        assert_eq!(resolution.damage, 80.0);
        assert!(!resolution.killed);
        assert_eq!(resolution.distance, 10.0);
        assert_eq!(players.get(victim).expect("victim").stats.health, 20.0);
    }

    #[test]
    fn lethal_hit_reports_kill() {
        let catalog = default_catalog();
        let (mut players, attacker, victim) = two_players(&catalog);
        players.get_mut(victim).expect("victim").stats.health = 30.0;
        let resolution = resolve_attack(
            &catalog,
            &mut players,
            attacker,
            AttackRequest {
                victim,
                weapon: BOW,
                hit_position: Vec3::default(),
                headshot: false,
            },
        );
        assert!(resolution.killed);
        assert!(players.get(victim).expect("victim").stats.is_dead);
    }

    #[test]
    fn dead_victim_cannot_be_hit_again() {
        let catalog = default_catalog();
        let (mut players, attacker, victim) = two_players(&catalog);
        players.get_mut(victim).expect("victim").stats.apply_damage(1000.0);
        let resolution = resolve_attack(
            &catalog,
            &mut players,
            attacker,
            AttackRequest {
                victim,
                weapon: BOW,
                hit_position: Vec3::default(),
                headshot: false,
            },
        );
        assert!(!resolution.success);
        assert_eq!(resolution.reason, "target is already dead");
    }

    #[test]
    fn non_weapon_items_cannot_attack() {
        let catalog = default_catalog();
        let (mut players, attacker, victim) = two_players(&catalog);
        players
            .get_mut(attacker)
            .expect("attacker")
            .inventory
            .add_item(&catalog, WOOD, 5)
            .expect("wood");
        let resolution = resolve_attack(
            &catalog,
            &mut players,
            attacker,
            AttackRequest {
                victim,
                weapon: WOOD,
                hit_position: Vec3::default(),
                headshot: false,
            },
        );
        assert!(!resolution.success);
        assert_eq!(resolution.reason, "item is not a weapon");
    }

    #[test]
    fn reload_reports_held_ammo() {
        let catalog = default_catalog();
        let (mut players, attacker, _) = two_players(&catalog);
        assert_eq!(
            resolve_reload(&catalog, &players, attacker, BOW),
            ReloadOutcome::Failed("no ammo")
        );
        players
            .get_mut(attacker)
            .expect("attacker")
            .inventory
            .add_item(&catalog, ARROW, 12)
            .expect("arrows");
        assert_eq!(
            resolve_reload(&catalog, &players, attacker, BOW),
            ReloadOutcome::Reloaded { ammo_remaining: 12 }
        );
    }

    #[test]
    fn rock_cannot_reload() {
        let catalog = default_catalog();
        let (mut players, attacker, _) = two_players(&catalog);
        players
            .get_mut(attacker)
            .expect("attacker")
            .inventory
            .add_item(&catalog, ROCK, 1)
            .expect("rock");
        assert_eq!(
            resolve_reload(&catalog, &players, attacker, ROCK),
            ReloadOutcome::Failed("cannot reload this weapon")
        );
    }
}
