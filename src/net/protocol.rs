use crate::catalog::items::ItemTypeId;
use crate::catalog::recipes::{Ingredient, Recipe, RecipeId};
use crate::entities::inventory::{ItemStack, SLOT_COUNT};
use crate::net::packet::{PacketReader, PacketWriter};
use crate::world::position::{Rotation, Vec3};
use crate::world::resources::{GatherTool, NodeId, ResourceKind, ResourceNode};

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_TEXT_LEN: usize = 256;
const MAX_LIST_LEN: usize = 4096;

/// How a message travels over the datagram transport. State-bearing
/// messages are ordered and retransmitted, movement only keeps the
/// newest sample, stat pushes are fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    ReliableOrdered,
    Sequenced,
    Unreliable,
}

mod tag {
    pub const CONNECT_REQUEST: u8 = 0;
    pub const CONNECT_ACCEPT: u8 = 1;
    pub const CLIENT_READY: u8 = 2;
    pub const HEARTBEAT: u8 = 3;
    pub const PLAYER_SPAWN: u8 = 4;
    pub const PLAYER_DESPAWN: u8 = 5;
    pub const MOVE: u8 = 6;
    pub const PLAYER_MOVED: u8 = 7;
    pub const STATS_UPDATE: u8 = 8;
    pub const PLAYER_DEATH: u8 = 9;
    pub const RESPAWN_REQUEST: u8 = 10;
    pub const RESPAWN_ACK: u8 = 11;
    pub const DAMAGE_NOTICE: u8 = 12;
    pub const INVENTORY_UPDATE: u8 = 13;
    pub const USE_ITEM: u8 = 14;
    pub const MOVE_ITEM: u8 = 15;
    pub const SELECT_HOTBAR: u8 = 16;
    pub const ITEM_USE_RESULT: u8 = 17;
    pub const RESOURCE_LIST: u8 = 18;
    pub const GATHER_REQUEST: u8 = 19;
    pub const GATHER_RESULT: u8 = 20;
    pub const RESOURCE_HEALTH: u8 = 21;
    pub const RESOURCE_DESTROYED: u8 = 22;
    pub const RESOURCE_RESPAWNED: u8 = 23;
    pub const RECIPE_LIST: u8 = 24;
    pub const CRAFT_REQUEST: u8 = 25;
    pub const CRAFT_RESPONSE: u8 = 26;
    pub const CRAFT_QUEUE_UPDATE: u8 = 27;
    pub const CRAFT_CANCEL: u8 = 28;
    pub const CRAFT_COMPLETE: u8 = 29;
    pub const ATTACK_REQUEST: u8 = 30;
    pub const ATTACK_CONFIRM: u8 = 31;
    pub const HIT_EVENT: u8 = 32;
    pub const DEATH_EVENT: u8 = 33;
    pub const RELOAD_REQUEST: u8 = 34;
    pub const RELOAD_RESPONSE: u8 = 35;
    pub const LOOT_SPAWNED: u8 = 40;
    pub const LOOT_REMOVED: u8 = 41;
    pub const LOOT_CONTENTS: u8 = 42;
    pub const LOOT_WITHDRAW: u8 = 43;
    pub const OPEN_LOOT: u8 = 44;
}

/// A live resource node as announced to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: ResourceKind,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
}

impl NodeSnapshot {
    pub fn from_node(node: &ResourceNode) -> Self {
        Self {
            id: node.id,
            kind: node.kind,
            position: node.position,
            health: node.health,
            max_health: node.max_health,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeSnapshot {
    pub id: RecipeId,
    pub name: String,
    pub result_item: ItemTypeId,
    pub result_quantity: u16,
    pub craft_seconds: f32,
    pub workbench_tier: Option<u8>,
    pub ingredients: Vec<Ingredient>,
}

impl RecipeSnapshot {
    pub fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            result_item: recipe.result_item,
            result_quantity: recipe.result_quantity,
            craft_seconds: recipe.craft_seconds,
            workbench_tier: recipe.workbench_tier,
            ingredients: recipe.ingredients.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueEntrySnapshot {
    pub recipe: RecipeId,
    pub elapsed: f32,
    pub required: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // Session
    ConnectRequest {
        name: String,
    },
    ConnectAccept {
        player_id: u32,
        spawn: Vec3,
    },
    ClientReady,
    Heartbeat,
    PlayerSpawn {
        player_id: u32,
        name: String,
        position: Vec3,
        rotation: Rotation,
    },
    PlayerDespawn {
        player_id: u32,
    },
    Move {
        position: Vec3,
        rotation: Rotation,
    },
    PlayerMoved {
        player_id: u32,
        position: Vec3,
        rotation: Rotation,
    },
    // Survival
    StatsUpdate {
        health: f32,
        hunger: f32,
        thirst: f32,
        temperature: f32,
        is_dead: bool,
    },
    PlayerDeath {
        player_id: u32,
        position: Vec3,
    },
    RespawnRequest,
    RespawnAck {
        position: Vec3,
        health: f32,
        hunger: f32,
        thirst: f32,
        temperature: f32,
    },
    DamageNotice {
        amount: f32,
        source: String,
    },
    // Inventory
    InventoryUpdate {
        slots: Vec<Option<ItemStack>>,
        selected_hotbar: u8,
    },
    UseItem {
        slot: u8,
    },
    MoveItem {
        from: u8,
        to: u8,
    },
    SelectHotbar {
        index: u8,
    },
    ItemUseResult {
        success: bool,
        slot: u8,
        item: ItemTypeId,
        reason: String,
    },
    // Gathering
    ResourceList {
        nodes: Vec<NodeSnapshot>,
    },
    GatherRequest {
        node: NodeId,
        damage: f32,
        tool: GatherTool,
    },
    GatherResult {
        success: bool,
        yields: Vec<ItemStack>,
        destroyed: bool,
        reason: String,
    },
    ResourceHealth {
        node: NodeId,
        health: f32,
    },
    ResourceDestroyed {
        node: NodeId,
    },
    ResourceRespawned {
        node: NodeSnapshot,
    },
    // Crafting
    RecipeList {
        recipes: Vec<RecipeSnapshot>,
    },
    CraftRequest {
        recipe: RecipeId,
    },
    CraftResponse {
        success: bool,
        reason: String,
    },
    CraftQueueUpdate {
        entries: Vec<QueueEntrySnapshot>,
    },
    CraftCancel {
        index: u8,
    },
    CraftComplete {
        recipe: RecipeId,
        item: ItemTypeId,
        quantity: u16,
    },
    // Combat
    AttackRequest {
        victim: u32,
        weapon: ItemTypeId,
        hit_position: Vec3,
        headshot: bool,
    },
    AttackConfirm {
        success: bool,
        damage: f32,
        headshot: bool,
        killed: bool,
        reason: String,
    },
    HitEvent {
        attacker: u32,
        victim: u32,
        damage: f32,
        headshot: bool,
        position: Vec3,
    },
    DeathEvent {
        victim: u32,
        killer_name: String,
        weapon: ItemTypeId,
        headshot: bool,
        distance: f32,
    },
    ReloadRequest {
        weapon: ItemTypeId,
    },
    ReloadResponse {
        success: bool,
        ammo_remaining: u16,
        reason: String,
    },
    // Loot
    LootSpawned {
        container: u32,
        position: Vec3,
        owner_name: String,
    },
    LootRemoved {
        container: u32,
    },
    LootContents {
        container: u32,
        items: Vec<ItemStack>,
    },
    LootWithdraw {
        container: u32,
        slot: u8,
        quantity: u16,
    },
    OpenLoot {
        container: u32,
    },
}

impl Message {
    pub fn delivery_mode(&self) -> DeliveryMode {
        match self {
            Message::Move { .. } | Message::PlayerMoved { .. } => DeliveryMode::Sequenced,
            Message::StatsUpdate { .. } | Message::Heartbeat => DeliveryMode::Unreliable,
            _ => DeliveryMode::ReliableOrdered,
        }
    }

    /// Frames the message as tag byte, payload length, payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = PacketWriter::new();
        let tag = self.write_payload(&mut payload);
        let mut frame = PacketWriter::with_capacity(payload.len() + 5);
        frame.write_u8(tag);
        frame.write_u32_le(payload.len() as u32);
        frame.write_bytes(payload.as_slice());
        frame.into_vec()
    }

    pub fn decode(data: &[u8]) -> Option<Message> {
        let mut reader = PacketReader::new(data);
        let tag = reader.read_u8()?;
        let len = reader.read_u32_le()? as usize;
        let payload = reader.read_bytes(len)?;
        let mut reader = PacketReader::new(payload);
        Self::read_payload(tag, &mut reader)
    }

    fn write_payload(&self, w: &mut PacketWriter) -> u8 {
        match self {
            Message::ConnectRequest { name } => {
                w.write_string(name);
                tag::CONNECT_REQUEST
            }
            Message::ConnectAccept { player_id, spawn } => {
                w.write_u32_le(*player_id);
                write_vec3(w, *spawn);
                tag::CONNECT_ACCEPT
            }
            Message::ClientReady => tag::CLIENT_READY,
            Message::Heartbeat => tag::HEARTBEAT,
            Message::PlayerSpawn {
                player_id,
                name,
                position,
                rotation,
            } => {
                w.write_u32_le(*player_id);
                w.write_string(name);
                write_vec3(w, *position);
                write_rotation(w, *rotation);
                tag::PLAYER_SPAWN
            }
            Message::PlayerDespawn { player_id } => {
                w.write_u32_le(*player_id);
                tag::PLAYER_DESPAWN
            }
            Message::Move { position, rotation } => {
                write_vec3(w, *position);
                write_rotation(w, *rotation);
                tag::MOVE
            }
            Message::PlayerMoved {
                player_id,
                position,
                rotation,
            } => {
                w.write_u32_le(*player_id);
                write_vec3(w, *position);
                write_rotation(w, *rotation);
                tag::PLAYER_MOVED
            }
            Message::StatsUpdate {
                health,
                hunger,
                thirst,
                temperature,
                is_dead,
            } => {
                w.write_f32_le(*health);
                w.write_f32_le(*hunger);
                w.write_f32_le(*thirst);
                w.write_f32_le(*temperature);
                w.write_bool(*is_dead);
                tag::STATS_UPDATE
            }
            Message::PlayerDeath {
                player_id,
                position,
            } => {
                w.write_u32_le(*player_id);
                write_vec3(w, *position);
                tag::PLAYER_DEATH
            }
            Message::RespawnRequest => tag::RESPAWN_REQUEST,
            Message::RespawnAck {
                position,
                health,
                hunger,
                thirst,
                temperature,
            } => {
                write_vec3(w, *position);
                w.write_f32_le(*health);
                w.write_f32_le(*hunger);
                w.write_f32_le(*thirst);
                w.write_f32_le(*temperature);
                tag::RESPAWN_ACK
            }
            Message::DamageNotice { amount, source } => {
                w.write_f32_le(*amount);
                w.write_string(source);
                tag::DAMAGE_NOTICE
            }
            Message::InventoryUpdate {
                slots,
                selected_hotbar,
            } => {
                // Full-state push: always all slots, empty as (0, 0).
                for slot in slots.iter().take(SLOT_COUNT) {
                    match slot {
                        Some(stack) => {
                            w.write_u16_le(stack.item.0);
                            w.write_u16_le(stack.quantity);
                        }
                        None => {
                            w.write_u16_le(0);
                            w.write_u16_le(0);
                        }
                    }
                }
                for _ in slots.len()..SLOT_COUNT {
                    w.write_u16_le(0);
                    w.write_u16_le(0);
                }
                w.write_u8(*selected_hotbar);
                tag::INVENTORY_UPDATE
            }
            Message::UseItem { slot } => {
                w.write_u8(*slot);
                tag::USE_ITEM
            }
            Message::MoveItem { from, to } => {
                w.write_u8(*from);
                w.write_u8(*to);
                tag::MOVE_ITEM
            }
            Message::SelectHotbar { index } => {
                w.write_u8(*index);
                tag::SELECT_HOTBAR
            }
            Message::ItemUseResult {
                success,
                slot,
                item,
                reason,
            } => {
                w.write_bool(*success);
                w.write_u8(*slot);
                w.write_u16_le(item.0);
                w.write_string(reason);
                tag::ITEM_USE_RESULT
            }
            Message::ResourceList { nodes } => {
                w.write_u16_le(nodes.len() as u16);
                for node in nodes {
                    write_node_snapshot(w, node);
                }
                tag::RESOURCE_LIST
            }
            Message::GatherRequest { node, damage, tool } => {
                w.write_u32_le(node.0);
                w.write_f32_le(*damage);
                w.write_u8(tool.to_wire());
                tag::GATHER_REQUEST
            }
            Message::GatherResult {
                success,
                yields,
                destroyed,
                reason,
            } => {
                w.write_bool(*success);
                w.write_bool(*destroyed);
                w.write_string(reason);
                w.write_u8(yields.len() as u8);
                for stack in yields {
                    w.write_u16_le(stack.item.0);
                    w.write_u16_le(stack.quantity);
                }
                tag::GATHER_RESULT
            }
            Message::ResourceHealth { node, health } => {
                w.write_u32_le(node.0);
                w.write_f32_le(*health);
                tag::RESOURCE_HEALTH
            }
            Message::ResourceDestroyed { node } => {
                w.write_u32_le(node.0);
                tag::RESOURCE_DESTROYED
            }
            Message::ResourceRespawned { node } => {
                write_node_snapshot(w, node);
                tag::RESOURCE_RESPAWNED
            }
            Message::RecipeList { recipes } => {
                w.write_u16_le(recipes.len() as u16);
                for recipe in recipes {
                    w.write_u16_le(recipe.id.0);
                    w.write_string(&recipe.name);
                    w.write_u16_le(recipe.result_item.0);
                    w.write_u16_le(recipe.result_quantity);
                    w.write_f32_le(recipe.craft_seconds);
                    w.write_u8(recipe.workbench_tier.unwrap_or(0));
                    w.write_u8(recipe.ingredients.len() as u8);
                    for ingredient in &recipe.ingredients {
                        w.write_u16_le(ingredient.item.0);
                        w.write_u16_le(ingredient.quantity);
                    }
                }
                tag::RECIPE_LIST
            }
            Message::CraftRequest { recipe } => {
                w.write_u16_le(recipe.0);
                tag::CRAFT_REQUEST
            }
            Message::CraftResponse { success, reason } => {
                w.write_bool(*success);
                w.write_string(reason);
                tag::CRAFT_RESPONSE
            }
            Message::CraftQueueUpdate { entries } => {
                w.write_u8(entries.len() as u8);
                for entry in entries {
                    w.write_u16_le(entry.recipe.0);
                    w.write_f32_le(entry.elapsed);
                    w.write_f32_le(entry.required);
                }
                tag::CRAFT_QUEUE_UPDATE
            }
            Message::CraftCancel { index } => {
                w.write_u8(*index);
                tag::CRAFT_CANCEL
            }
            Message::CraftComplete {
                recipe,
                item,
                quantity,
            } => {
                w.write_u16_le(recipe.0);
                w.write_u16_le(item.0);
                w.write_u16_le(*quantity);
                tag::CRAFT_COMPLETE
            }
            Message::AttackRequest {
                victim,
                weapon,
                hit_position,
                headshot,
            } => {
                w.write_u32_le(*victim);
                w.write_u16_le(weapon.0);
                write_vec3(w, *hit_position);
                w.write_bool(*headshot);
                tag::ATTACK_REQUEST
            }
            Message::AttackConfirm {
                success,
                damage,
                headshot,
                killed,
                reason,
            } => {
                w.write_bool(*success);
                w.write_f32_le(*damage);
                w.write_bool(*headshot);
                w.write_bool(*killed);
                w.write_string(reason);
                tag::ATTACK_CONFIRM
            }
            Message::HitEvent {
                attacker,
                victim,
                damage,
                headshot,
                position,
            } => {
                w.write_u32_le(*attacker);
                w.write_u32_le(*victim);
                w.write_f32_le(*damage);
                w.write_bool(*headshot);
                write_vec3(w, *position);
                tag::HIT_EVENT
            }
            Message::DeathEvent {
                victim,
                killer_name,
                weapon,
                headshot,
                distance,
            } => {
                w.write_u32_le(*victim);
                w.write_string(killer_name);
                w.write_u16_le(weapon.0);
                w.write_bool(*headshot);
                w.write_f32_le(*distance);
                tag::DEATH_EVENT
            }
            Message::ReloadRequest { weapon } => {
                w.write_u16_le(weapon.0);
                tag::RELOAD_REQUEST
            }
            Message::ReloadResponse {
                success,
                ammo_remaining,
                reason,
            } => {
                w.write_bool(*success);
                w.write_u16_le(*ammo_remaining);
                w.write_string(reason);
                tag::RELOAD_RESPONSE
            }
            Message::LootSpawned {
                container,
                position,
                owner_name,
            } => {
                w.write_u32_le(*container);
                write_vec3(w, *position);
                w.write_string(owner_name);
                tag::LOOT_SPAWNED
            }
            Message::LootRemoved { container } => {
                w.write_u32_le(*container);
                tag::LOOT_REMOVED
            }
            Message::LootContents { container, items } => {
                w.write_u32_le(*container);
                w.write_u8(items.len() as u8);
                for stack in items {
                    w.write_u16_le(stack.item.0);
                    w.write_u16_le(stack.quantity);
                }
                tag::LOOT_CONTENTS
            }
            Message::LootWithdraw {
                container,
                slot,
                quantity,
            } => {
                w.write_u32_le(*container);
                w.write_u8(*slot);
                w.write_u16_le(*quantity);
                tag::LOOT_WITHDRAW
            }
            Message::OpenLoot { container } => {
                w.write_u32_le(*container);
                tag::OPEN_LOOT
            }
        }
    }

    fn read_payload(tag_byte: u8, r: &mut PacketReader) -> Option<Message> {
        let message = match tag_byte {
            tag::CONNECT_REQUEST => Message::ConnectRequest {
                name: r.read_string(MAX_NAME_LEN)?,
            },
            tag::CONNECT_ACCEPT => Message::ConnectAccept {
                player_id: r.read_u32_le()?,
                spawn: read_vec3(r)?,
            },
            tag::CLIENT_READY => Message::ClientReady,
            tag::HEARTBEAT => Message::Heartbeat,
            tag::PLAYER_SPAWN => Message::PlayerSpawn {
                player_id: r.read_u32_le()?,
                name: r.read_string(MAX_NAME_LEN)?,
                position: read_vec3(r)?,
                rotation: read_rotation(r)?,
            },
            tag::PLAYER_DESPAWN => Message::PlayerDespawn {
                player_id: r.read_u32_le()?,
            },
            tag::MOVE => Message::Move {
                position: read_vec3(r)?,
                rotation: read_rotation(r)?,
            },
            tag::PLAYER_MOVED => Message::PlayerMoved {
                player_id: r.read_u32_le()?,
                position: read_vec3(r)?,
                rotation: read_rotation(r)?,
            },
            tag::STATS_UPDATE => Message::StatsUpdate {
                health: r.read_f32_le()?,
                hunger: r.read_f32_le()?,
                thirst: r.read_f32_le()?,
                temperature: r.read_f32_le()?,
                is_dead: r.read_bool()?,
            },
            tag::PLAYER_DEATH => Message::PlayerDeath {
                player_id: r.read_u32_le()?,
                position: read_vec3(r)?,
            },
            tag::RESPAWN_REQUEST => Message::RespawnRequest,
            tag::RESPAWN_ACK => Message::RespawnAck {
                position: read_vec3(r)?,
                health: r.read_f32_le()?,
                hunger: r.read_f32_le()?,
                thirst: r.read_f32_le()?,
                temperature: r.read_f32_le()?,
            },
            tag::DAMAGE_NOTICE => Message::DamageNotice {
                amount: r.read_f32_le()?,
                source: r.read_string(MAX_TEXT_LEN)?,
            },
            tag::INVENTORY_UPDATE => {
                let mut slots = Vec::with_capacity(SLOT_COUNT);
                for _ in 0..SLOT_COUNT {
                    let item = r.read_u16_le()?;
                    let quantity = r.read_u16_le()?;
                    if item == 0 || quantity == 0 {
                        slots.push(None);
                    } else {
                        slots.push(Some(ItemStack {
                            item: ItemTypeId(item),
                            quantity,
                        }));
                    }
                }
                Message::InventoryUpdate {
                    slots,
                    selected_hotbar: r.read_u8()?,
                }
            }
            tag::USE_ITEM => Message::UseItem {
                slot: r.read_u8()?,
            },
            tag::MOVE_ITEM => Message::MoveItem {
                from: r.read_u8()?,
                to: r.read_u8()?,
            },
            tag::SELECT_HOTBAR => Message::SelectHotbar {
                index: r.read_u8()?,
            },
            tag::ITEM_USE_RESULT => Message::ItemUseResult {
                success: r.read_bool()?,
                slot: r.read_u8()?,
                item: ItemTypeId(r.read_u16_le()?),
                reason: r.read_string(MAX_TEXT_LEN)?,
            },
            tag::RESOURCE_LIST => {
                let count = r.read_u16_le()? as usize;
                if count > MAX_LIST_LEN {
                    return None;
                }
                let mut nodes = Vec::with_capacity(count);
                for _ in 0..count {
                    nodes.push(read_node_snapshot(r)?);
                }
                Message::ResourceList { nodes }
            }
            tag::GATHER_REQUEST => Message::GatherRequest {
                node: NodeId(r.read_u32_le()?),
                damage: r.read_f32_le()?,
                tool: GatherTool::from_wire(r.read_u8()?)?,
            },
            tag::GATHER_RESULT => {
                let success = r.read_bool()?;
                let destroyed = r.read_bool()?;
                let reason = r.read_string(MAX_TEXT_LEN)?;
                let count = r.read_u8()? as usize;
                let mut yields = Vec::with_capacity(count);
                for _ in 0..count {
                    yields.push(ItemStack {
                        item: ItemTypeId(r.read_u16_le()?),
                        quantity: r.read_u16_le()?,
                    });
                }
                Message::GatherResult {
                    success,
                    yields,
                    destroyed,
                    reason,
                }
            }
            tag::RESOURCE_HEALTH => Message::ResourceHealth {
                node: NodeId(r.read_u32_le()?),
                health: r.read_f32_le()?,
            },
            tag::RESOURCE_DESTROYED => Message::ResourceDestroyed {
                node: NodeId(r.read_u32_le()?),
            },
            tag::RESOURCE_RESPAWNED => Message::ResourceRespawned {
                node: read_node_snapshot(r)?,
            },
            tag::RECIPE_LIST => {
                let count = r.read_u16_le()? as usize;
                if count > MAX_LIST_LEN {
                    return None;
                }
                let mut recipes = Vec::with_capacity(count);
                for _ in 0..count {
                    let id = RecipeId(r.read_u16_le()?);
                    let name = r.read_string(MAX_TEXT_LEN)?;
                    let result_item = ItemTypeId(r.read_u16_le()?);
                    let result_quantity = r.read_u16_le()?;
                    let craft_seconds = r.read_f32_le()?;
                    let tier = r.read_u8()?;
                    let ingredient_count = r.read_u8()? as usize;
                    let mut ingredients = Vec::with_capacity(ingredient_count);
                    for _ in 0..ingredient_count {
                        ingredients.push(Ingredient {
                            item: ItemTypeId(r.read_u16_le()?),
                            quantity: r.read_u16_le()?,
                        });
                    }
                    recipes.push(RecipeSnapshot {
                        id,
                        name,
                        result_item,
                        result_quantity,
                        craft_seconds,
                        workbench_tier: if tier == 0 { None } else { Some(tier) },
                        ingredients,
                    });
                }
                Message::RecipeList { recipes }
            }
            tag::CRAFT_REQUEST => Message::CraftRequest {
                recipe: RecipeId(r.read_u16_le()?),
            },
            tag::CRAFT_RESPONSE => Message::CraftResponse {
                success: r.read_bool()?,
                reason: r.read_string(MAX_TEXT_LEN)?,
            },
            tag::CRAFT_QUEUE_UPDATE => {
                let count = r.read_u8()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(QueueEntrySnapshot {
                        recipe: RecipeId(r.read_u16_le()?),
                        elapsed: r.read_f32_le()?,
                        required: r.read_f32_le()?,
                    });
                }
                Message::CraftQueueUpdate { entries }
            }
            tag::CRAFT_CANCEL => Message::CraftCancel {
                index: r.read_u8()?,
            },
            tag::CRAFT_COMPLETE => Message::CraftComplete {
                recipe: RecipeId(r.read_u16_le()?),
                item: ItemTypeId(r.read_u16_le()?),
                quantity: r.read_u16_le()?,
            },
            tag::ATTACK_REQUEST => Message::AttackRequest {
                victim: r.read_u32_le()?,
                weapon: ItemTypeId(r.read_u16_le()?),
                hit_position: read_vec3(r)?,
                headshot: r.read_bool()?,
            },
            tag::ATTACK_CONFIRM => Message::AttackConfirm {
                success: r.read_bool()?,
                damage: r.read_f32_le()?,
                headshot: r.read_bool()?,
                killed: r.read_bool()?,
                reason: r.read_string(MAX_TEXT_LEN)?,
            },
            tag::HIT_EVENT => Message::HitEvent {
                attacker: r.read_u32_le()?,
                victim: r.read_u32_le()?,
                damage: r.read_f32_le()?,
                headshot: r.read_bool()?,
                position: read_vec3(r)?,
            },
            tag::DEATH_EVENT => Message::DeathEvent {
                victim: r.read_u32_le()?,
                killer_name: r.read_string(MAX_NAME_LEN)?,
                weapon: ItemTypeId(r.read_u16_le()?),
                headshot: r.read_bool()?,
                distance: r.read_f32_le()?,
            },
            tag::RELOAD_REQUEST => Message::ReloadRequest {
                weapon: ItemTypeId(r.read_u16_le()?),
            },
            tag::RELOAD_RESPONSE => Message::ReloadResponse {
                success: r.read_bool()?,
                ammo_remaining: r.read_u16_le()?,
                reason: r.read_string(MAX_TEXT_LEN)?,
            },
            tag::LOOT_SPAWNED => Message::LootSpawned {
                container: r.read_u32_le()?,
                position: read_vec3(r)?,
                owner_name: r.read_string(MAX_NAME_LEN)?,
            },
            tag::LOOT_REMOVED => Message::LootRemoved {
                container: r.read_u32_le()?,
            },
            tag::LOOT_CONTENTS => {
                let container = r.read_u32_le()?;
                let count = r.read_u8()? as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(ItemStack {
                        item: ItemTypeId(r.read_u16_le()?),
                        quantity: r.read_u16_le()?,
                    });
                }
                Message::LootContents { container, items }
            }
            tag::LOOT_WITHDRAW => Message::LootWithdraw {
                container: r.read_u32_le()?,
                slot: r.read_u8()?,
                quantity: r.read_u16_le()?,
            },
            tag::OPEN_LOOT => Message::OpenLoot {
                container: r.read_u32_le()?,
            },
            _ => return None,
        };
        Some(message)
    }
}

fn write_vec3(w: &mut PacketWriter, value: Vec3) {
    w.write_f32_le(value.x);
    w.write_f32_le(value.y);
    w.write_f32_le(value.z);
}

fn read_vec3(r: &mut PacketReader) -> Option<Vec3> {
    Some(Vec3 {
        x: r.read_f32_le()?,
        y: r.read_f32_le()?,
        z: r.read_f32_le()?,
    })
}

fn write_rotation(w: &mut PacketWriter, value: Rotation) {
    w.write_f32_le(value.yaw);
    w.write_f32_le(value.pitch);
}

fn read_rotation(r: &mut PacketReader) -> Option<Rotation> {
    Some(Rotation {
        yaw: r.read_f32_le()?,
        pitch: r.read_f32_le()?,
    })
}

fn write_node_snapshot(w: &mut PacketWriter, node: &NodeSnapshot) {
    w.write_u32_le(node.id.0);
    w.write_u8(node.kind.to_wire());
    write_vec3(w, node.position);
    w.write_f32_le(node.health);
    w.write_f32_le(node.max_health);
}

fn read_node_snapshot(r: &mut PacketReader) -> Option<NodeSnapshot> {
    Some(NodeSnapshot {
        id: NodeId(r.read_u32_le()?),
        kind: ResourceKind::from_wire(r.read_u8()?)?,
        position: read_vec3(r)?,
        health: r.read_f32_le()?,
        max_health: r.read_f32_le()?,
    })
}
