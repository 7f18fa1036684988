use crate::entities::inventory::Inventory;
use crate::entities::stats::PlayerStats;
use crate::world::position::{Rotation, Vec3};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub u32);

/// Authoritative per-player record. Owned exclusively by the player map;
/// sessions refer to it by id and never hold a copy.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Rotation,
    pub connected: bool,
    pub last_heartbeat: Instant,
    pub stats: PlayerStats,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Vec3) -> Self {
        Self {
            id,
            name,
            position,
            rotation: Rotation::default(),
            connected: false,
            last_heartbeat: Instant::now(),
            stats: PlayerStats::default(),
            inventory: Inventory::default(),
        }
    }
}

/// Arena store for players. Records survive disconnects so a reconnect by
/// the same name re-attaches instead of starting over.
#[derive(Debug, Default)]
pub struct PlayerMap {
    players: HashMap<PlayerId, Player>,
    next_id: u32,
}

impl PlayerMap {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Player> {
        self.players.values().find(|player| player.name == name)
    }

    pub fn id_by_name(&self, name: &str) -> Option<PlayerId> {
        self.by_name(name).map(|player| player.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn create(&mut self, name: String, position: Vec3) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.players.insert(id, Player::new(id, name, position));
        id
    }

    /// Replaces the whole map with loaded records, advancing the id
    /// counter past the highest loaded id.
    pub fn replace_all(&mut self, players: Vec<Player>) {
        self.players.clear();
        let mut highest = 0;
        for player in players {
            highest = highest.max(player.id.0);
            self.players.insert(player.id, player);
        }
        self.next_id = highest.saturating_add(1).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let mut map = PlayerMap::new();
        let a = map.create("ada".to_string(), Vec3::default());
        let b = map.create("bo".to_string(), Vec3::default());
        assert_eq!(a, PlayerId(1));
        assert_eq!(b, PlayerId(2));
        assert_eq!(map.id_by_name("ada"), Some(a));
        assert_eq!(map.id_by_name("Ada"), None);
    }

    #[test]
    fn replace_all_advances_next_id() {
        let mut map = PlayerMap::new();
        map.replace_all(vec![
            Player::new(PlayerId(3), "c".to_string(), Vec3::default()),
            Player::new(PlayerId(7), "g".to_string(), Vec3::default()),
        ]);
        assert_eq!(map.len(), 2);
        let next = map.create("h".to_string(), Vec3::default());
        assert_eq!(next, PlayerId(8));
    }
}
