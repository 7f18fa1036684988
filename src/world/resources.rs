use crate::catalog::items::ItemTypeId;
use crate::world::position::Vec3;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const MAX_INTERACT_DISTANCE: f32 = 8.0;
pub const RESPAWN_DELAY: Duration = Duration::from_secs(300);
const PARTIAL_HARVEST_FRACTION: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Tree,
    StoneNode,
    MetalOre,
    SulfurOre,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Tree,
        ResourceKind::StoneNode,
        ResourceKind::MetalOre,
        ResourceKind::SulfurOre,
    ];

    pub fn to_wire(self) -> u8 {
        match self {
            ResourceKind::Tree => 0,
            ResourceKind::StoneNode => 1,
            ResourceKind::MetalOre => 2,
            ResourceKind::SulfurOre => 3,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResourceKind::Tree),
            1 => Some(ResourceKind::StoneNode),
            2 => Some(ResourceKind::MetalOre),
            3 => Some(ResourceKind::SulfurOre),
            _ => None,
        }
    }

    fn is_wood(self) -> bool {
        matches!(self, ResourceKind::Tree)
    }

    pub fn profile(self) -> KindProfile {
        match self {
            ResourceKind::Tree => KindProfile {
                population: 40,
                max_health: 200.0,
                yields: &[(ItemTypeId(100), 400, 800)],
            },
            ResourceKind::StoneNode => KindProfile {
                population: 30,
                max_health: 300.0,
                yields: &[(ItemTypeId(101), 400, 800)],
            },
            ResourceKind::MetalOre => KindProfile {
                population: 15,
                max_health: 300.0,
                yields: &[(ItemTypeId(102), 200, 400)],
            },
            ResourceKind::SulfurOre => KindProfile {
                population: 10,
                max_health: 300.0,
                yields: &[(ItemTypeId(103), 100, 300)],
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KindProfile {
    pub population: usize,
    pub max_health: f32,
    pub yields: &'static [(ItemTypeId, u16, u16)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherTool {
    Hands,
    Hatchet,
    Pickaxe,
    Weapon,
}

impl GatherTool {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(GatherTool::Hands),
            1 => Some(GatherTool::Hatchet),
            2 => Some(GatherTool::Pickaxe),
            3 => Some(GatherTool::Weapon),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            GatherTool::Hands => 0,
            GatherTool::Hatchet => 1,
            GatherTool::Pickaxe => 2,
            GatherTool::Weapon => 3,
        }
    }

    /// Right-tool bonus, wrong-tool penalty.
    pub fn multiplier(self, kind: ResourceKind) -> f32 {
        match self {
            GatherTool::Hands => 1.0,
            GatherTool::Weapon => 0.25,
            GatherTool::Hatchet => {
                if kind.is_wood() {
                    2.0
                } else {
                    0.5
                }
            }
            GatherTool::Pickaxe => {
                if kind.is_wood() {
                    0.5
                } else {
                    2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldRoll {
    pub item: ItemTypeId,
    pub total: u16,
    pub remaining: u16,
}

#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: ResourceKind,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub died_at: Option<Instant>,
    pub yields: Vec<YieldRoll>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatherOutcome {
    Rejected(&'static str),
    Harvest {
        yields: Vec<(ItemTypeId, u16)>,
        health: f32,
        destroyed: bool,
    },
}

/// Seeded roller for node placement and yield totals.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRng {
    state: u64,
}

impl ResourceRng {
    pub fn from_time() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos() as u64)
            .unwrap_or(0x9e3779b97f4a7c15);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state: seed }
    }

    fn next(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    pub fn roll_range(&mut self, min: u16, max: u16) -> u16 {
        let (min, max) = if min >= max { (min, min) } else { (min, max) };
        let span = u32::from(max - min) + 1;
        min + (self.next() % span) as u16
    }

    pub fn roll_coord(&mut self, radius: f32) -> f32 {
        let unit = self.next() as f32 / u32::MAX as f32;
        (unit * 2.0 - 1.0) * radius
    }
}

/// Arena store for harvestable nodes.
#[derive(Debug)]
pub struct ResourceWorld {
    nodes: HashMap<NodeId, ResourceNode>,
    next_id: u32,
    rng: ResourceRng,
}

impl ResourceWorld {
    pub fn spawn(spawn_radius: f32, mut rng: ResourceRng) -> Self {
        let mut world = Self {
            nodes: HashMap::new(),
            next_id: 1,
            rng: ResourceRng::from_seed(1),
        };
        for kind in ResourceKind::ALL {
            let profile = kind.profile();
            for _ in 0..profile.population {
                let position = Vec3::new(rng.roll_coord(spawn_radius), 0.0, rng.roll_coord(spawn_radius));
                world.insert_node(kind, position, &mut rng);
            }
        }
        world.rng = rng;
        world
    }

    fn insert_node(&mut self, kind: ResourceKind, position: Vec3, rng: &mut ResourceRng) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let profile = kind.profile();
        self.nodes.insert(
            id,
            ResourceNode {
                id,
                kind,
                position,
                health: profile.max_health,
                max_health: profile.max_health,
                alive: true,
                died_at: None,
                yields: roll_yields(kind, rng),
            },
        );
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Applies a gather hit. Partial harvests grant a fixed fraction of
    /// each rolled yield; the lethal hit grants whatever remains.
    pub fn gather(
        &mut self,
        id: NodeId,
        raw_damage: f32,
        tool: GatherTool,
        player_position: Vec3,
        now: Instant,
    ) -> GatherOutcome {
        let Some(node) = self.nodes.get_mut(&id) else {
            return GatherOutcome::Rejected("unknown resource");
        };
        if !node.alive {
            return GatherOutcome::Rejected("resource already destroyed");
        }
        if !player_position.within_range(node.position, MAX_INTERACT_DISTANCE) {
            return GatherOutcome::Rejected("too far away");
        }

        let damage = (raw_damage.max(0.0) * tool.multiplier(node.kind)).max(0.0);
        node.health = (node.health - damage).max(0.0);
        let destroyed = node.health <= 0.0;

        let mut yields = Vec::with_capacity(node.yields.len());
        for roll in &mut node.yields {
            let amount = if destroyed {
                roll.remaining
            } else {
                let partial =
                    ((f32::from(roll.total) * PARTIAL_HARVEST_FRACTION) as u16).max(1);
                partial.min(roll.remaining)
            };
            if amount > 0 {
                roll.remaining -= amount;
                yields.push((roll.item, amount));
            }
        }

        if destroyed {
            node.alive = false;
            node.died_at = Some(now);
        }
        GatherOutcome::Harvest {
            yields,
            health: node.health,
            destroyed,
        }
    }

    /// Resurrects nodes whose respawn window has elapsed, re-rolling
    /// health and yields. Returns the revived node ids.
    pub fn respawn_sweep(&mut self, now: Instant) -> Vec<NodeId> {
        let mut revived = Vec::new();
        let rng = &mut self.rng;
        for node in self.nodes.values_mut() {
            if node.alive {
                continue;
            }
            let due = node
                .died_at
                .map(|died| now.duration_since(died) >= RESPAWN_DELAY)
                .unwrap_or(true);
            if !due {
                continue;
            }
            node.alive = true;
            node.died_at = None;
            node.health = node.max_health;
            node.yields = roll_yields(node.kind, rng);
            revived.push(node.id);
        }
        revived
    }
}

fn roll_yields(kind: ResourceKind, rng: &mut ResourceRng) -> Vec<YieldRoll> {
    kind.profile()
        .yields
        .iter()
        .map(|&(item, min, max)| {
            let total = rng.roll_range(min, max);
            YieldRoll {
                item,
                total,
                remaining: total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world() -> (ResourceWorld, NodeId) {
        let mut rng = ResourceRng::from_seed(42);
        let mut world = ResourceWorld {
            nodes: HashMap::new(),
            next_id: 1,
            rng: ResourceRng::from_seed(7),
        };
        let id = world.insert_node(ResourceKind::Tree, Vec3::default(), &mut rng);
        (world, id)
    }

    #[test]
    fn spawn_populates_every_kind() {
        let world = ResourceWorld::spawn(500.0, ResourceRng::from_seed(9));
        for kind in ResourceKind::ALL {
            let count = world.iter().filter(|node| node.kind == kind).count();
            assert_eq!(count, kind.profile().population);
        }
        assert!(world.iter().all(|node| node.alive));
    }

    #[test]
    fn axe_doubles_damage_against_trees() {
        let (mut world, id) = small_world();
        let outcome = world.gather(id, 25.0, GatherTool::Hatchet, Vec3::default(), Instant::now());
        match outcome {
            GatherOutcome::Harvest {
                health, destroyed, yields,
            } => {
                assert_eq!(health, 150.0);
                assert!(!destroyed);
                assert_eq!(yields.len(), 1);
                let node = world.get(id).expect("node");
                let roll = node.yields[0];
                // Partial harvest is 10% of the rolled total.
                assert_eq!(yields[0].1, (f32::from(roll.total) * 0.1) as u16);
            }
            GatherOutcome::Rejected(reason) => panic!("rejected: {}", reason),
        }
    }

    #[test]
    fn out_of_range_gather_is_rejected() {
        let (mut world, id) = small_world();
        let far = Vec3::new(50.0, 0.0, 0.0);
        assert_eq!(
            world.gather(id, 25.0, GatherTool::Hands, far, Instant::now()),
            GatherOutcome::Rejected("too far away")
        );
    }

    #[test]
    fn dead_node_rejects_gathers() {
        let (mut world, id) = small_world();
        let now = Instant::now();
        world.gather(id, 10_000.0, GatherTool::Hatchet, Vec3::default(), now);
        assert!(!world.get(id).expect("node").alive);
        assert_eq!(
            world.gather(id, 25.0, GatherTool::Hatchet, Vec3::default(), now),
            GatherOutcome::Rejected("resource already destroyed")
        );
    }

    #[test]
    fn lifetime_yield_never_exceeds_rolled_total() {
        let (mut world, id) = small_world();
        let total = world.get(id).expect("node").yields[0].total;
        let now = Instant::now();
        let mut harvested: u32 = 0;
        loop {
            match world.gather(id, 30.0, GatherTool::Hands, Vec3::default(), now) {
                GatherOutcome::Harvest {
                    yields, destroyed, ..
                } => {
                    harvested += yields.iter().map(|&(_, qty)| u32::from(qty)).sum::<u32>();
                    if destroyed {
                        break;
                    }
                }
                GatherOutcome::Rejected(reason) => panic!("rejected: {}", reason),
            }
        }
        assert_eq!(harvested, u32::from(total));
    }

    #[test]
    fn respawn_rerolls_after_delay() {
        let (mut world, id) = small_world();
        let died = Instant::now();
        world.gather(id, 10_000.0, GatherTool::Hatchet, Vec3::default(), died);
        assert!(world.respawn_sweep(died).is_empty());
        let later = died + RESPAWN_DELAY;
        let revived = world.respawn_sweep(later);
        assert_eq!(revived, vec![id]);
        let node = world.get(id).expect("node");
        assert!(node.alive);
        assert_eq!(node.health, node.max_health);
        assert_eq!(node.yields[0].remaining, node.yields[0].total);
    }

    #[test]
    fn wrong_tool_is_penalized() {
        assert_eq!(GatherTool::Pickaxe.multiplier(ResourceKind::Tree), 0.5);
        assert_eq!(GatherTool::Hatchet.multiplier(ResourceKind::MetalOre), 0.5);
        assert_eq!(GatherTool::Weapon.multiplier(ResourceKind::Tree), 0.25);
        assert_eq!(GatherTool::Hands.multiplier(ResourceKind::SulfurOre), 1.0);
    }
}
