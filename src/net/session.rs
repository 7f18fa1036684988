use crate::catalog::items::ItemTypeId;
use crate::combat;
use crate::entities::inventory::{Inventory, ItemStack};
use crate::entities::player::PlayerId;
use crate::entities::stats::PlayerStats;
use crate::loot::WithdrawOutcome;
use crate::net::protocol::{Message, NodeSnapshot, QueueEntrySnapshot, RecipeSnapshot, MAX_NAME_LEN};
use crate::net::server::ServerState;
use crate::net::transport::{TransportEvent, UdpTransport};
use crate::telemetry::logging;
use crate::world::position::{Rotation, Vec3};
use crate::world::resources::{GatherOutcome, GatherTool, NodeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Pause between chunks of the initial world sync so a burst of reliable
/// frames does not overrun a lossy link.
const SYNC_PACING: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Datagrams seen, no identity yet.
    Connected,
    /// ConnectAccept sent, waiting for the client to ask for the world.
    AwaitingReady,
    /// Initial state push in flight.
    Syncing,
    /// Full participant.
    Ready,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub addr: SocketAddr,
    pub player_id: Option<PlayerId>,
    pub stage: SessionStage,
}

#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: HashMap<SocketAddr, Session>,
    by_player: HashMap<PlayerId, SocketAddr>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn get(&self, addr: SocketAddr) -> Option<&Session> {
        self.sessions.get(&addr)
    }

    pub fn insert_connection(&mut self, addr: SocketAddr) {
        self.sessions.entry(addr).or_insert(Session {
            addr,
            player_id: None,
            stage: SessionStage::Connected,
        });
    }

    /// Binds a player to this address. Returns the displaced address when
    /// the player was already attached elsewhere (reconnect takeover).
    pub fn attach(&mut self, addr: SocketAddr, player: PlayerId) -> Option<SocketAddr> {
        let displaced = match self.by_player.insert(player, addr) {
            Some(old) if old != addr => {
                self.sessions.remove(&old);
                Some(old)
            }
            _ => None,
        };
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.player_id = Some(player);
            session.stage = SessionStage::AwaitingReady;
        }
        displaced
    }

    pub fn set_stage(&mut self, addr: SocketAddr, stage: SessionStage) {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.stage = stage;
        }
    }

    pub fn stage_of(&self, addr: SocketAddr) -> Option<SessionStage> {
        self.sessions.get(&addr).map(|session| session.stage)
    }

    pub fn player_of(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.sessions.get(&addr).and_then(|session| session.player_id)
    }

    pub fn addr_of(&self, player: PlayerId) -> Option<SocketAddr> {
        self.by_player.get(&player).copied()
    }

    pub fn remove(&mut self, addr: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&addr)?;
        if let Some(player) = session.player_id {
            if self.by_player.get(&player) == Some(&addr) {
                self.by_player.remove(&player);
            }
        }
        Some(session)
    }

    pub fn ready_addrs(&self) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|session| session.stage == SessionStage::Ready)
            .map(|session| session.addr)
            .collect()
    }
}

pub fn send_message(transport: &Mutex<UdpTransport>, addr: SocketAddr, message: &Message) {
    let bytes = message.encode();
    let mode = message.delivery_mode();
    match transport.lock() {
        Ok(mut transport) => {
            if let Err(err) = transport.send(addr, mode, &bytes) {
                logging::log_net(&err);
            }
        }
        Err(_) => logging::log_error("transport lock poisoned"),
    }
}

/// Sends to every Ready session, optionally skipping one address. The
/// recipient list is snapshotted under the sessions lock, the sends
/// happen after it is released.
pub fn broadcast(
    state: &ServerState,
    transport: &Mutex<UdpTransport>,
    message: &Message,
    except: Option<SocketAddr>,
) {
    let addrs = match state.sessions.lock() {
        Ok(sessions) => sessions.ready_addrs(),
        Err(_) => {
            logging::log_error("sessions lock poisoned");
            return;
        }
    };
    for addr in addrs {
        if Some(addr) == except {
            continue;
        }
        send_message(transport, addr, message);
    }
}

pub fn inventory_update_message(inventory: &Inventory) -> Message {
    Message::InventoryUpdate {
        slots: inventory.slots().to_vec(),
        selected_hotbar: inventory.selected_hotbar(),
    }
}

pub fn stats_update_message(stats: &PlayerStats) -> Message {
    Message::StatsUpdate {
        health: stats.health,
        hunger: stats.hunger,
        thirst: stats.thirst,
        temperature: stats.temperature,
        is_dead: stats.is_dead,
    }
}

fn queue_update_message(entries: &[crate::crafting::CraftQueueEntry]) -> Message {
    Message::CraftQueueUpdate {
        entries: entries
            .iter()
            .map(|entry| QueueEntrySnapshot {
                recipe: entry.recipe,
                elapsed: entry.elapsed,
                required: entry.required,
            })
            .collect(),
    }
}

pub fn handle_event(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    event: TransportEvent,
    now: Instant,
) {
    match event {
        TransportEvent::Connected(addr) => {
            if let Ok(mut sessions) = state.sessions.lock() {
                sessions.insert_connection(addr);
            }
            logging::log_net(&format!("peer connected: {}", addr));
        }
        TransportEvent::Disconnected(addr) => {
            handle_disconnect(state, transport, addr);
        }
        TransportEvent::Message(addr, bytes) => match Message::decode(&bytes) {
            Some(message) => handle_message(state, transport, addr, message, now),
            None => logging::log_net(&format!("undecodable frame from {}", addr)),
        },
    }
}

fn handle_message(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    message: Message,
    now: Instant,
) {
    let stage = match state.sessions.lock() {
        Ok(mut sessions) => {
            sessions.insert_connection(addr);
            sessions.stage_of(addr)
        }
        Err(_) => return,
    };
    let Some(stage) = stage else {
        return;
    };

    match message {
        Message::ConnectRequest { name } => {
            handle_connect(state, transport, addr, stage, &name, now)
        }
        Message::ClientReady => handle_ready(state, transport, addr, stage),
        Message::Heartbeat => handle_heartbeat(state, addr, now),
        other if stage != SessionStage::Ready => {
            logging::log_net(&format!(
                "dropped pre-ready message from {}: {:?}",
                addr,
                std::mem::discriminant(&other)
            ));
        }
        Message::Move { position, rotation } => {
            handle_move(state, transport, addr, position, rotation)
        }
        Message::UseItem { slot } => handle_use_item(state, transport, addr, slot as usize),
        Message::MoveItem { from, to } => {
            handle_move_item(state, transport, addr, from as usize, to as usize)
        }
        Message::SelectHotbar { index } => handle_select_hotbar(state, transport, addr, index),
        Message::GatherRequest { node, damage, tool } => {
            handle_gather(state, transport, addr, node, damage, tool, now)
        }
        Message::CraftRequest { recipe } => {
            handle_craft_request(state, transport, addr, recipe)
        }
        Message::CraftCancel { index } => {
            handle_craft_cancel(state, transport, addr, index as usize)
        }
        Message::AttackRequest {
            victim,
            weapon,
            hit_position,
            headshot,
        } => handle_attack(
            state,
            transport,
            addr,
            combat::AttackRequest {
                victim: PlayerId(victim),
                weapon,
                hit_position,
                headshot,
            },
            now,
        ),
        Message::ReloadRequest { weapon } => handle_reload(state, transport, addr, weapon),
        Message::RespawnRequest => handle_respawn(state, transport, addr, now),
        Message::OpenLoot { container } => handle_open_loot(state, transport, addr, container),
        Message::LootWithdraw {
            container,
            slot,
            quantity,
        } => handle_loot_withdraw(state, transport, addr, container, slot as usize, quantity),
        // Server-to-client messages echoed back are ignored.
        other => {
            logging::log_net(&format!(
                "unexpected client message from {}: {:?}",
                addr,
                std::mem::discriminant(&other)
            ));
        }
    }
}

fn valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|ch| ch == ' ' || ch.is_ascii_graphic())
}

fn handle_connect(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    stage: SessionStage,
    raw_name: &str,
    now: Instant,
) {
    if stage != SessionStage::Connected {
        return;
    }
    let name = raw_name.trim();
    if !valid_player_name(name) {
        logging::log_net(&format!("rejected connect with bad name from {}", addr));
        if let Ok(mut transport) = transport.lock() {
            transport.forget(addr);
        }
        if let Ok(mut sessions) = state.sessions.lock() {
            sessions.remove(addr);
        }
        return;
    }

    let catalogs = state.catalogs();
    let (player_id, spawn) = {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let player_id = match players.id_by_name(name) {
            Some(id) => id,
            None => {
                let spawn = state.roll_spawn_position();
                let id = players.create(name.to_string(), spawn);
                if let Some(player) = players.get_mut(id) {
                    for &(item, quantity) in &catalogs.loadout.grants {
                        if player.inventory.add_item(&catalogs.items, item, quantity).is_err() {
                            logging::log_error(&format!(
                                "starter grant {} x{} did not fit for {}",
                                item.0, quantity, name
                            ));
                        }
                    }
                }
                logging::log_game(&format!("new player created: {} ({})", name, id.0));
                id
            }
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        player.connected = true;
        player.last_heartbeat = now;
        (player_id, player.position)
    };

    let displaced = match state.sessions.lock() {
        Ok(mut sessions) => sessions.attach(addr, player_id),
        Err(_) => return,
    };
    if let Some(old_addr) = displaced {
        if let Ok(mut transport) = transport.lock() {
            transport.forget(old_addr);
        }
        logging::log_net(&format!(
            "session takeover for player {}: {} replaces {}",
            player_id.0, addr, old_addr
        ));
    }

    send_message(
        transport,
        addr,
        &Message::ConnectAccept {
            player_id: player_id.0,
            spawn,
        },
    );
    logging::log_game(&format!("player {} connecting from {}", player_id.0, addr));
}

fn handle_ready(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    stage: SessionStage,
) {
    if stage != SessionStage::AwaitingReady {
        return;
    }
    let player_id = {
        let Ok(mut sessions) = state.sessions.lock() else {
            return;
        };
        let Some(player_id) = sessions.player_of(addr) else {
            return;
        };
        sessions.set_stage(addr, SessionStage::Syncing);
        player_id
    };

    let state = Arc::clone(state);
    let transport = Arc::clone(&transport);
    // The initial sync is paced, so it gets its own short-lived thread
    // instead of stalling the pump loop.
    thread::spawn(move || {
        run_world_sync(&state, &transport, addr, player_id);
    });
}

fn run_world_sync(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    player_id: PlayerId,
) {
    let inventory_update = {
        let Ok(players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get(player_id) else {
            return;
        };
        inventory_update_message(&player.inventory)
    };
    send_message(transport, addr, &inventory_update);
    thread::sleep(SYNC_PACING);

    // Roster of everyone already in the world.
    let roster: Vec<Message> = {
        let Ok(players) = state.players.lock() else {
            return;
        };
        players
            .iter()
            .filter(|player| player.connected && player.id != player_id)
            .map(|player| Message::PlayerSpawn {
                player_id: player.id.0,
                name: player.name.clone(),
                position: player.position,
                rotation: player.rotation,
            })
            .collect()
    };
    for message in &roster {
        send_message(transport, addr, message);
    }
    thread::sleep(SYNC_PACING);

    let resource_list = {
        let Ok(resources) = state.resources.lock() else {
            return;
        };
        Message::ResourceList {
            nodes: resources
                .iter()
                .filter(|node| node.alive)
                .map(NodeSnapshot::from_node)
                .collect(),
        }
    };
    send_message(transport, addr, &resource_list);
    thread::sleep(SYNC_PACING);

    let recipe_list = Message::RecipeList {
        recipes: state
            .catalogs()
            .recipes
            .recipes()
            .map(RecipeSnapshot::from_recipe)
            .collect(),
    };
    send_message(transport, addr, &recipe_list);

    let queue_update = {
        let Ok(crafting) = state.crafting.lock() else {
            return;
        };
        queue_update_message(crafting.queue(player_id))
    };
    send_message(transport, addr, &queue_update);

    let spawn_message = {
        let Ok(players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get(player_id) else {
            return;
        };
        Message::PlayerSpawn {
            player_id: player.id.0,
            name: player.name.clone(),
            position: player.position,
            rotation: player.rotation,
        }
    };
    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.set_stage(addr, SessionStage::Ready);
    }
    broadcast(state, transport, &spawn_message, Some(addr));
    logging::log_game(&format!("player {} entered the world", player_id.0));
}

fn handle_heartbeat(state: &Arc<ServerState>, addr: SocketAddr, now: Instant) {
    let player_id = match state.sessions.lock() {
        Ok(sessions) => sessions.player_of(addr),
        Err(_) => None,
    };
    let Some(player_id) = player_id else {
        return;
    };
    if let Ok(mut players) = state.players.lock() {
        if let Some(player) = players.get_mut(player_id) {
            player.last_heartbeat = now;
        }
    }
}

fn session_player(state: &ServerState, addr: SocketAddr) -> Option<PlayerId> {
    state.sessions.lock().ok()?.player_of(addr)
}

fn handle_move(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    position: Vec3,
    rotation: Rotation,
) {
    if !position.is_finite() || !rotation.is_finite() {
        return;
    }
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if player.stats.is_dead {
            return;
        }
        player.position = position;
        player.rotation = rotation;
    }
    broadcast(
        state,
        transport,
        &Message::PlayerMoved {
            player_id: player_id.0,
            position,
            rotation,
        },
        Some(addr),
    );
}

fn handle_use_item(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    slot: usize,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let mut replies: Vec<Message> = Vec::new();
    {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if player.stats.is_dead {
            replies.push(Message::ItemUseResult {
                success: false,
                slot: slot as u8,
                item: ItemTypeId(0),
                reason: "you are dead".to_string(),
            });
        } else {
            match player.inventory.consume(&catalogs.items, slot) {
                Ok((item, effect)) => {
                    player.stats.apply_consumable(&effect);
                    replies.push(Message::ItemUseResult {
                        success: true,
                        slot: slot as u8,
                        item,
                        reason: String::new(),
                    });
                    replies.push(inventory_update_message(&player.inventory));
                    replies.push(stats_update_message(&player.stats));
                    logging::log_game(&format!(
                        "player {} consumed item {}",
                        player_id.0, item.0
                    ));
                }
                Err(err) => {
                    replies.push(Message::ItemUseResult {
                        success: false,
                        slot: slot as u8,
                        item: ItemTypeId(0),
                        reason: err.reason().to_string(),
                    });
                }
            }
        }
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
}

fn handle_move_item(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    from: usize,
    to: usize,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let reply = {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        match player.inventory.move_item(&catalogs.items, from, to) {
            Ok(()) => inventory_update_message(&player.inventory),
            Err(err) => Message::ItemUseResult {
                success: false,
                slot: from as u8,
                item: ItemTypeId(0),
                reason: err.reason().to_string(),
            },
        }
    };
    send_message(transport, addr, &reply);
}

fn handle_select_hotbar(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    index: u8,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let mut replies: Vec<Message> = Vec::new();
    {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if !player.inventory.select_hotbar(index) {
            replies.push(Message::ItemUseResult {
                success: false,
                slot: index,
                item: ItemTypeId(0),
                reason: "invalid hotbar slot".to_string(),
            });
        } else {
            // Selecting a consumable on the hotbar uses it immediately.
            let is_consumable = player
                .inventory
                .slot(index as usize)
                .and_then(|stack| catalogs.items.get(stack.item))
                .map(|def| def.is_consumable())
                .unwrap_or(false);
            if is_consumable && !player.stats.is_dead {
                if let Ok((item, effect)) = player.inventory.consume(&catalogs.items, index as usize)
                {
                    player.stats.apply_consumable(&effect);
                    replies.push(Message::ItemUseResult {
                        success: true,
                        slot: index,
                        item,
                        reason: String::new(),
                    });
                    replies.push(stats_update_message(&player.stats));
                }
            }
            replies.push(inventory_update_message(&player.inventory));
        }
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
}

fn handle_gather(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    node: NodeId,
    damage: f32,
    tool: GatherTool,
    now: Instant,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let mut replies: Vec<Message> = Vec::new();
    let mut world_updates: Vec<Message> = Vec::new();
    {
        // Lock order is players then resources, matching every other path.
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if player.stats.is_dead {
            replies.push(Message::GatherResult {
                success: false,
                yields: Vec::new(),
                destroyed: false,
                reason: "you are dead".to_string(),
            });
        } else {
            let Ok(mut resources) = state.resources.lock() else {
                return;
            };
            match resources.gather(node, damage, tool, player.position, now) {
                GatherOutcome::Rejected(reason) => {
                    replies.push(Message::GatherResult {
                        success: false,
                        yields: Vec::new(),
                        destroyed: false,
                        reason: reason.to_string(),
                    });
                }
                GatherOutcome::Harvest {
                    yields,
                    health,
                    destroyed,
                } => {
                    let mut granted: Vec<ItemStack> = Vec::new();
                    for (item, quantity) in yields {
                        if player
                            .inventory
                            .add_item(&catalogs.items, item, quantity)
                            .is_ok()
                        {
                            granted.push(ItemStack { item, quantity });
                        } else {
                            logging::log_game(&format!(
                                "harvest lost, inventory full: player {} item {} x{}",
                                player_id.0, item.0, quantity
                            ));
                        }
                    }
                    replies.push(Message::GatherResult {
                        success: true,
                        yields: granted,
                        destroyed,
                        reason: String::new(),
                    });
                    replies.push(inventory_update_message(&player.inventory));
                    world_updates.push(if destroyed {
                        Message::ResourceDestroyed { node }
                    } else {
                        Message::ResourceHealth { node, health }
                    });
                    logging::log_game(&format!(
                        "player {} gathered node {} (destroyed: {})",
                        player_id.0, node.0, destroyed
                    ));
                }
            }
        }
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
    for message in &world_updates {
        broadcast(state, transport, message, None);
    }
}

fn handle_craft_request(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    recipe: crate::catalog::recipes::RecipeId,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let mut replies: Vec<Message> = Vec::new();
    {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        let Ok(mut crafting) = state.crafting.lock() else {
            return;
        };
        match crafting.start(&catalogs.recipes, player_id, recipe, &mut player.inventory) {
            Ok(_) => {
                replies.push(Message::CraftResponse {
                    success: true,
                    reason: String::new(),
                });
                replies.push(queue_update_message(crafting.queue(player_id)));
                replies.push(inventory_update_message(&player.inventory));
                logging::log_game(&format!(
                    "player {} queued recipe {}",
                    player_id.0, recipe.0
                ));
            }
            Err(err) => {
                replies.push(Message::CraftResponse {
                    success: false,
                    reason: err.reason().to_string(),
                });
            }
        }
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
}

fn handle_craft_cancel(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    index: usize,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let mut replies: Vec<Message> = Vec::new();
    {
        let Ok(mut crafting) = state.crafting.lock() else {
            return;
        };
        if crafting.cancel(player_id, index) {
            replies.push(Message::CraftResponse {
                success: true,
                reason: String::new(),
            });
        } else {
            replies.push(Message::CraftResponse {
                success: false,
                reason: "nothing to cancel".to_string(),
            });
        }
        replies.push(queue_update_message(crafting.queue(player_id)));
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
}

/// Kill context carried from an attack into the shared death path.
#[derive(Debug, Clone)]
pub struct KillContext {
    pub killer_name: String,
    pub weapon: ItemTypeId,
    pub headshot: bool,
    pub distance: f32,
}

fn handle_attack(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    request: combat::AttackRequest,
    now: Instant,
) {
    let Some(attacker_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let (resolution, kill_context, attacker_name) = {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let resolution =
            combat::resolve_attack(&catalogs.items, &mut players, attacker_id, request);
        let attacker_name = players
            .get(attacker_id)
            .map(|player| player.name.clone())
            .unwrap_or_default();
        let kill_context = if resolution.killed {
            Some(KillContext {
                killer_name: attacker_name.clone(),
                weapon: request.weapon,
                headshot: resolution.headshot,
                distance: resolution.distance,
            })
        } else {
            None
        };
        (resolution, kill_context, attacker_name)
    };

    send_message(
        transport,
        addr,
        &Message::AttackConfirm {
            success: resolution.success,
            damage: resolution.damage,
            headshot: resolution.headshot,
            killed: resolution.killed,
            reason: resolution.reason.to_string(),
        },
    );
    if !resolution.success {
        return;
    }

    broadcast(
        state,
        transport,
        &Message::HitEvent {
            attacker: attacker_id.0,
            victim: request.victim.0,
            damage: resolution.damage,
            headshot: resolution.headshot,
            position: request.hit_position,
        },
        None,
    );
    logging::log_combat(&format!(
        "{} hit player {} for {:.1} (headshot: {}, killed: {})",
        attacker_name, request.victim.0, resolution.damage, resolution.headshot, resolution.killed
    ));
    let victim_addr = state
        .sessions
        .lock()
        .ok()
        .and_then(|sessions| sessions.addr_of(request.victim));
    if let Some(stats_addr) = victim_addr {
        let stats = state
            .players
            .lock()
            .ok()
            .and_then(|players| players.get(request.victim).map(|player| player.stats));
        if let Some(stats) = stats {
            send_message(transport, stats_addr, &stats_update_message(&stats));
        }
    }

    if kill_context.is_some() {
        finish_death(state, transport, request.victim, kill_context, now);
    }
}

/// One-shot death handling shared by combat kills and survival-stat
/// deaths. The first caller claims the flag, drops a loot bag from the
/// victim's inventory and announces the death; later callers no-op.
pub fn finish_death(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    victim_id: PlayerId,
    kill_context: Option<KillContext>,
    now: Instant,
) {
    let snapshot = {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(victim) = players.get_mut(victim_id) else {
            return;
        };
        if !victim.stats.claim_death_handling() {
            return;
        }
        let stacks: Vec<ItemStack> = victim
            .inventory
            .occupied()
            .into_iter()
            .map(|(_, stack)| stack)
            .collect();
        victim.inventory.clear();
        Some((victim.name.clone(), victim.position, stacks, victim.stats))
    };
    let Some((name, position, stacks, stats)) = snapshot else {
        return;
    };

    if let Ok(mut crafting) = state.crafting.lock() {
        crafting.drop_player(victim_id);
    }

    let container = match state.loot.lock() {
        Ok(mut loot) => loot.spawn(position, name.clone(), stacks, now),
        Err(_) => None,
    };

    broadcast(
        state,
        transport,
        &Message::PlayerDeath {
            player_id: victim_id.0,
            position,
        },
        None,
    );
    if let Some(context) = kill_context {
        broadcast(
            state,
            transport,
            &Message::DeathEvent {
                victim: victim_id.0,
                killer_name: context.killer_name.clone(),
                weapon: context.weapon,
                headshot: context.headshot,
                distance: context.distance,
            },
            None,
        );
        logging::log_combat(&format!(
            "{} killed player {} with item {} at {:.1}m (headshot: {})",
            context.killer_name, victim_id.0, context.weapon.0, context.distance, context.headshot
        ));
    } else {
        logging::log_game(&format!("player {} ({}) died of exposure", victim_id.0, name));
    }
    if let Some(container_id) = container {
        let message = match state.loot.lock() {
            Ok(loot) => loot.get(container_id).map(|bag| Message::LootSpawned {
                container: container_id.0,
                position: bag.position,
                owner_name: bag.owner_name.clone(),
            }),
            Err(_) => None,
        };
        if let Some(message) = message {
            broadcast(state, transport, &message, None);
        }
    }

    let victim_addr = state
        .sessions
        .lock()
        .ok()
        .and_then(|sessions| sessions.addr_of(victim_id));
    if let Some(victim_addr) = victim_addr {
        send_message(transport, victim_addr, &stats_update_message(&stats));
        send_message(
            transport,
            victim_addr,
            &Message::InventoryUpdate {
                slots: vec![None; crate::entities::inventory::SLOT_COUNT],
                selected_hotbar: 0,
            },
        );
        send_message(transport, victim_addr, &queue_update_message(&[]));
    }
}

fn handle_reload(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    weapon: ItemTypeId,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let catalogs = state.catalogs();
    let outcome = {
        let Ok(players) = state.players.lock() else {
            return;
        };
        combat::resolve_reload(&catalogs.items, &players, player_id, weapon)
    };
    let reply = match outcome {
        combat::ReloadOutcome::Reloaded { ammo_remaining } => Message::ReloadResponse {
            success: true,
            ammo_remaining,
            reason: String::new(),
        },
        combat::ReloadOutcome::Failed(reason) => Message::ReloadResponse {
            success: false,
            ammo_remaining: 0,
            reason: reason.to_string(),
        },
    };
    send_message(transport, addr, &reply);
}

fn handle_respawn(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    _now: Instant,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let respawned = {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        if !player.stats.is_dead {
            None
        } else {
            player.stats.respawn();
            player.position = state.roll_spawn_position();
            player.rotation = Rotation::default();
            Some((
                player.position,
                player.stats,
                player.name.clone(),
                inventory_update_message(&player.inventory),
            ))
        }
    };
    let Some((position, stats, name, inventory_update)) = respawned else {
        return;
    };
    send_message(
        transport,
        addr,
        &Message::RespawnAck {
            position,
            health: stats.health,
            hunger: stats.hunger,
            thirst: stats.thirst,
            temperature: stats.temperature,
        },
    );
    send_message(transport, addr, &inventory_update);
    broadcast(
        state,
        transport,
        &Message::PlayerSpawn {
            player_id: player_id.0,
            name,
            position,
            rotation: Rotation::default(),
        },
        Some(addr),
    );
    logging::log_game(&format!("player {} respawned", player_id.0));
}

fn handle_open_loot(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    container: u32,
) {
    let reply = {
        let Ok(loot) = state.loot.lock() else {
            return;
        };
        match loot.get(crate::loot::ContainerId(container)) {
            Some(bag) => Message::LootContents {
                container,
                items: bag.items.clone(),
            },
            None => Message::LootRemoved { container },
        }
    };
    send_message(transport, addr, &reply);
}

fn handle_loot_withdraw(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
    container: u32,
    slot: usize,
    quantity: u16,
) {
    let Some(player_id) = session_player(state, addr) else {
        return;
    };
    let container_id = crate::loot::ContainerId(container);
    let catalogs = state.catalogs();
    let mut replies: Vec<Message> = Vec::new();
    let mut removed = false;
    {
        let Ok(mut players) = state.players.lock() else {
            return;
        };
        let Some(player) = players.get_mut(player_id) else {
            return;
        };
        let Ok(mut loot) = state.loot.lock() else {
            return;
        };
        match loot.withdraw(
            &catalogs.items,
            container_id,
            slot,
            quantity,
            &mut player.inventory,
        ) {
            WithdrawOutcome::Withdrawn {
                item,
                container_removed,
            } => {
                replies.push(inventory_update_message(&player.inventory));
                if container_removed {
                    removed = true;
                } else if let Some(bag) = loot.get(container_id) {
                    replies.push(Message::LootContents {
                        container,
                        items: bag.items.clone(),
                    });
                }
                logging::log_game(&format!(
                    "player {} looted item {} x{} from container {}",
                    player_id.0, item.item.0, item.quantity, container
                ));
            }
            WithdrawOutcome::InventoryFull => {
                replies.push(Message::ItemUseResult {
                    success: false,
                    slot: slot as u8,
                    item: ItemTypeId(0),
                    reason: "inventory full".to_string(),
                });
            }
            WithdrawOutcome::UnknownContainer => {
                replies.push(Message::LootRemoved { container });
            }
            WithdrawOutcome::EmptySlot => {
                if let Some(bag) = loot.get(container_id) {
                    replies.push(Message::LootContents {
                        container,
                        items: bag.items.clone(),
                    });
                }
            }
        }
    }
    for message in &replies {
        send_message(transport, addr, message);
    }
    if removed {
        broadcast(state, transport, &Message::LootRemoved { container }, None);
    }
}

pub fn handle_disconnect(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    addr: SocketAddr,
) {
    let session = match state.sessions.lock() {
        Ok(mut sessions) => sessions.remove(addr),
        Err(_) => None,
    };
    let Some(session) = session else {
        return;
    };
    if let Ok(mut transport) = transport.lock() {
        transport.forget(addr);
    }
    let Some(player_id) = session.player_id else {
        logging::log_net(&format!("peer disconnected: {}", addr));
        return;
    };
    if let Ok(mut players) = state.players.lock() {
        if let Some(player) = players.get_mut(player_id) {
            player.connected = false;
        }
    }
    // Craft queues keep running while the player is away; the record and
    // its queue survive the disconnect.
    if session.stage == SessionStage::Ready {
        broadcast(
            state,
            transport,
            &Message::PlayerDespawn {
                player_id: player_id.0,
            },
            None,
        );
    }
    logging::log_game(&format!("player {} disconnected", player_id.0));
}
