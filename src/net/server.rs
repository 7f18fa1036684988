use crate::catalog::items::ItemCatalog;
use crate::catalog::loadout::StarterLoadout;
use crate::catalog::recipes::RecipeBook;
use crate::crafting::CraftingState;
use crate::entities::player::{PlayerId, PlayerMap};
use crate::loot::LootStore;
use crate::net::protocol::{Message, NodeSnapshot};
use crate::net::session::{self, SessionMap};
use crate::net::transport::UdpTransport;
use crate::persistence::autosave::{autosave_players, AutosaveConfig, AutosaveState};
use crate::persistence::store::SaveStore;
use crate::telemetry::logging;
use crate::world::position::Vec3;
use crate::world::resources::{ResourceRng, ResourceWorld};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const PUMP_IDLE: Duration = Duration::from_millis(5);
const TRANSPORT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
const STAT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const CRAFT_TICK_INTERVAL: Duration = Duration::from_millis(500);
const RESOURCE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const LOOT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerSignal {
    Running,
    Shutdown,
}

#[derive(Debug)]
pub struct ServerControl {
    signal: AtomicU8,
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            signal: AtomicU8::new(ServerSignal::Running as u8),
        }
    }

    pub fn request_shutdown(&self) {
        self.signal
            .store(ServerSignal::Shutdown as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.signal.load(Ordering::SeqCst) == ServerSignal::Running as u8
    }
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct GameServerConfig {
    pub root: PathBuf,
    pub bind_addr: String,
    pub autosave_interval_seconds: u64,
    pub spawn_radius: f32,
}

/// Immutable lookup catalogs, shared by reference count. A reload builds
/// a fresh set and swaps the whole value; readers keep whatever set they
/// fetched until their next fetch.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub items: Arc<ItemCatalog>,
    pub recipes: Arc<RecipeBook>,
    pub loadout: Arc<StarterLoadout>,
}

impl Catalogs {
    fn load(root: &std::path::Path) -> Result<Self, String> {
        Ok(Self {
            items: Arc::new(ItemCatalog::load(root)?),
            recipes: Arc::new(RecipeBook::load(root)?),
            loadout: Arc::new(StarterLoadout::load(root)?),
        })
    }
}

/// All authoritative world state, one mutex per arena. Lock order where
/// several are held is players, then resources or crafting or loot,
/// never the other direction.
#[derive(Debug)]
pub struct ServerState {
    pub root: PathBuf,
    pub spawn_radius: f32,
    catalogs: Mutex<Catalogs>,
    pub players: Mutex<PlayerMap>,
    pub resources: Mutex<ResourceWorld>,
    pub loot: Mutex<LootStore>,
    pub crafting: Mutex<CraftingState>,
    pub sessions: Mutex<SessionMap>,
    pub spawn_rng: Mutex<ResourceRng>,
}

impl ServerState {
    pub fn load(config: &GameServerConfig) -> Result<Self, String> {
        let catalogs = Catalogs::load(&config.root)?;

        let store = SaveStore::from_root(&config.root);
        let loaded = store.load_players()?;
        let mut players = PlayerMap::new();
        let loaded_count = loaded.len();
        players.replace_all(loaded);

        let resources = ResourceWorld::spawn(config.spawn_radius, ResourceRng::from_time());
        logging::log_game(&format!(
            "world loaded: items={}, recipes={}, players={}, resources={}",
            catalogs.items.len(),
            catalogs.recipes.len(),
            loaded_count,
            resources.len()
        ));

        Ok(Self {
            root: config.root.clone(),
            spawn_radius: config.spawn_radius,
            catalogs: Mutex::new(catalogs),
            players: Mutex::new(players),
            resources: Mutex::new(resources),
            loot: Mutex::new(LootStore::new()),
            crafting: Mutex::new(CraftingState::new()),
            sessions: Mutex::new(SessionMap::new()),
            spawn_rng: Mutex::new(ResourceRng::from_time()),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::catalog::items::default_catalog;
        use crate::catalog::recipes::default_recipe_book;
        Self {
            root: std::env::temp_dir(),
            spawn_radius: 50.0,
            catalogs: Mutex::new(Catalogs {
                items: Arc::new(default_catalog()),
                recipes: Arc::new(default_recipe_book()),
                loadout: Arc::new(StarterLoadout::default_loadout()),
            }),
            players: Mutex::new(PlayerMap::new()),
            resources: Mutex::new(ResourceWorld::spawn(50.0, ResourceRng::from_seed(7))),
            loot: Mutex::new(LootStore::new()),
            crafting: Mutex::new(CraftingState::new()),
            sessions: Mutex::new(SessionMap::new()),
            spawn_rng: Mutex::new(ResourceRng::from_seed(11)),
        }
    }

    /// Current catalog set. Cheap Arc clones; holders are unaffected by a
    /// concurrent reload.
    pub fn catalogs(&self) -> Catalogs {
        self.catalogs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rebuilds the catalogs from disk and swaps them in wholesale. In-flight
    /// handlers finish on the set they already fetched.
    pub fn reload_catalogs(&self) -> Result<(), String> {
        let fresh = Catalogs::load(&self.root)?;
        logging::log_game(&format!(
            "catalogs reloaded: items={}, recipes={}",
            fresh.items.len(),
            fresh.recipes.len()
        ));
        *self
            .catalogs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
        Ok(())
    }

    pub fn roll_spawn_position(&self) -> Vec3 {
        match self.spawn_rng.lock() {
            Ok(mut rng) => Vec3 {
                x: rng.roll_coord(self.spawn_radius),
                y: 0.0,
                z: rng.roll_coord(self.spawn_radius),
            },
            Err(_) => Vec3::default(),
        }
    }
}

pub fn run_game_server(
    config: GameServerConfig,
    control: Arc<ServerControl>,
) -> Result<(), String> {
    let state = Arc::new(ServerState::load(&config)?);
    let transport = Arc::new(Mutex::new(UdpTransport::bind(&config.bind_addr)?));
    let local_addr = transport
        .lock()
        .map_err(|_| "transport lock poisoned".to_string())?
        .local_addr()?;
    logging::log_game(&format!("game server listening on {}", local_addr));
    println!("ember: game server listening on {}", local_addr);

    let mut handles = Vec::new();
    handles.push(spawn_survival_loop(
        Arc::clone(&state),
        Arc::clone(&transport),
        Arc::clone(&control),
    ));
    handles.push(spawn_craft_loop(
        Arc::clone(&state),
        Arc::clone(&transport),
        Arc::clone(&control),
    ));
    handles.push(spawn_resource_loop(
        Arc::clone(&state),
        Arc::clone(&transport),
        Arc::clone(&control),
    ));
    handles.push(spawn_loot_loop(
        Arc::clone(&state),
        Arc::clone(&transport),
        Arc::clone(&control),
    ));
    if let Some(handle) = spawn_autosave_loop(&config, Arc::clone(&state), Arc::clone(&control)) {
        handles.push(handle);
    }

    run_pump_loop(&state, &transport, &control);

    for handle in handles {
        let _ = handle.join();
    }

    let store = SaveStore::from_root(&state.root);
    let report = match state.players.lock() {
        Ok(players) => autosave_players(&players, &store),
        Err(_) => {
            logging::log_error("final save skipped (players lock poisoned)");
            return Err("players lock poisoned".to_string());
        }
    };
    if let Some(err) = report.error {
        logging::log_error(&format!("final save failed: {}", err));
        return Err(err);
    }
    logging::log_save(&format!(
        "final save completed (players: {})",
        report.saved_players
    ));
    println!("ember: shutdown, saved {} players", report.saved_players);
    Ok(())
}

fn run_pump_loop(
    state: &Arc<ServerState>,
    transport: &Arc<Mutex<UdpTransport>>,
    control: &Arc<ServerControl>,
) {
    let mut last_sweep = Instant::now();
    while control.is_running() {
        let now = Instant::now();
        let events = match transport.lock() {
            Ok(mut transport) => transport.poll(now),
            Err(_) => {
                logging::log_error("transport lock poisoned");
                return;
            }
        };
        let idle = events.is_empty();
        for event in events {
            session::handle_event(state, transport, event, now);
        }
        if now.duration_since(last_sweep) >= TRANSPORT_SWEEP_INTERVAL {
            last_sweep = now;
            let dropped = match transport.lock() {
                Ok(mut transport) => transport.sweep(now),
                Err(_) => return,
            };
            for event in dropped {
                session::handle_event(state, transport, event, now);
            }
        }
        if idle {
            thread::sleep(PUMP_IDLE);
        }
    }
}

/// Ticks survival stats once a second and pushes each player their own
/// stat snapshot every other tick, plus a damage notice whenever the
/// environment hurt them. Deaths found here route through the same
/// one-shot path as combat kills.
fn spawn_survival_loop(
    state: Arc<ServerState>,
    transport: Arc<Mutex<UdpTransport>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_tick = Instant::now();
        let mut broadcast_tick = false;
        while control.is_running() {
            thread::sleep(Duration::from_millis(100));
            let now = Instant::now();
            if now.duration_since(last_tick) < STAT_TICK_INTERVAL {
                continue;
            }
            let dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;
            broadcast_tick = !broadcast_tick;

            let (deaths, snapshots) = collect_survival_updates(&state, dt, broadcast_tick);
            for id in deaths {
                session::finish_death(&state, &transport, id, None, now);
            }
            for (id, message) in snapshots {
                let addr = state
                    .sessions
                    .lock()
                    .ok()
                    .and_then(|sessions| sessions.addr_of(id));
                if let Some(addr) = addr {
                    session::send_message(&transport, addr, &message);
                }
            }
        }
    })
}

/// Runs one survival tick over every connected player. Returns the ids
/// that died this tick and the per-player messages to deliver, a damage
/// notice for anyone the environment hurt plus stat snapshots.
fn collect_survival_updates(
    state: &ServerState,
    dt: f32,
    broadcast_tick: bool,
) -> (Vec<PlayerId>, Vec<(PlayerId, Message)>) {
    let mut deaths: Vec<PlayerId> = Vec::new();
    let mut snapshots: Vec<(PlayerId, Message)> = Vec::new();
    let Ok(mut players) = state.players.lock() else {
        return (deaths, snapshots);
    };
    for player in players.iter_mut() {
        if !player.connected {
            continue;
        }
        let outcome = player.stats.tick(dt);
        if outcome.died {
            deaths.push(player.id);
        }
        if outcome.damage_taken > 0.0 {
            snapshots.push((
                player.id,
                Message::DamageNotice {
                    amount: outcome.damage_taken,
                    source: outcome.cause.to_string(),
                },
            ));
        }
        if broadcast_tick || outcome.died {
            snapshots.push((player.id, session::stats_update_message(&player.stats)));
        }
    }
    (deaths, snapshots)
}

/// Advances craft queues and delivers finished items. A completion that
/// does not fit the inventory is dropped and logged.
fn spawn_craft_loop(
    state: Arc<ServerState>,
    transport: Arc<Mutex<UdpTransport>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_tick = Instant::now();
        while control.is_running() {
            thread::sleep(Duration::from_millis(100));
            let now = Instant::now();
            if now.duration_since(last_tick) < CRAFT_TICK_INTERVAL {
                continue;
            }
            let dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;

            let catalogs = state.catalogs();
            let mut deliveries: Vec<(PlayerId, Vec<Message>)> = Vec::new();
            {
                let Ok(mut players) = state.players.lock() else {
                    continue;
                };
                let Ok(mut crafting) = state.crafting.lock() else {
                    continue;
                };
                let completions = crafting.tick(dt);
                for completion in completions {
                    let Some(recipe) = catalogs.recipes.get(completion.recipe) else {
                        continue;
                    };
                    let Some(player) = players.get_mut(completion.player) else {
                        continue;
                    };
                    let mut messages = Vec::new();
                    match player.inventory.add_item(
                        &catalogs.items,
                        recipe.result_item,
                        recipe.result_quantity,
                    ) {
                        Ok(()) => {
                            messages.push(Message::CraftComplete {
                                recipe: recipe.id,
                                item: recipe.result_item,
                                quantity: recipe.result_quantity,
                            });
                            messages.push(session::inventory_update_message(&player.inventory));
                            logging::log_game(&format!(
                                "player {} crafted {} x{}",
                                completion.player.0, recipe.name, recipe.result_quantity
                            ));
                        }
                        Err(_) => {
                            logging::log_game(&format!(
                                "craft output lost, inventory full: player {} recipe {}",
                                completion.player.0, recipe.id.0
                            ));
                        }
                    }
                    let snapshot: Vec<_> = crafting.queue(completion.player).to_vec();
                    messages.push(Message::CraftQueueUpdate {
                        entries: snapshot
                            .iter()
                            .map(|entry| crate::net::protocol::QueueEntrySnapshot {
                                recipe: entry.recipe,
                                elapsed: entry.elapsed,
                                required: entry.required,
                            })
                            .collect(),
                    });
                    deliveries.push((completion.player, messages));
                }
            }
            for (player, messages) in deliveries {
                let addr = state
                    .sessions
                    .lock()
                    .ok()
                    .and_then(|sessions| sessions.addr_of(player));
                if let Some(addr) = addr {
                    for message in &messages {
                        session::send_message(&transport, addr, message);
                    }
                }
            }
        }
    })
}

fn spawn_resource_loop(
    state: Arc<ServerState>,
    transport: Arc<Mutex<UdpTransport>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_sweep = Instant::now();
        while control.is_running() {
            thread::sleep(Duration::from_millis(250));
            let now = Instant::now();
            if now.duration_since(last_sweep) < RESOURCE_SWEEP_INTERVAL {
                continue;
            }
            last_sweep = now;
            let revived: Vec<Message> = {
                let Ok(mut resources) = state.resources.lock() else {
                    continue;
                };
                let ids = resources.respawn_sweep(now);
                ids.iter()
                    .filter_map(|&id| resources.get(id))
                    .map(|node| Message::ResourceRespawned {
                        node: NodeSnapshot::from_node(node),
                    })
                    .collect()
            };
            for message in &revived {
                session::broadcast(&state, &transport, message, None);
            }
            if !revived.is_empty() {
                logging::log_game(&format!("respawned {} resource nodes", revived.len()));
            }
        }
    })
}

fn spawn_loot_loop(
    state: Arc<ServerState>,
    transport: Arc<Mutex<UdpTransport>>,
    control: Arc<ServerControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_sweep = Instant::now();
        while control.is_running() {
            thread::sleep(Duration::from_millis(250));
            let now = Instant::now();
            if now.duration_since(last_sweep) < LOOT_SWEEP_INTERVAL {
                continue;
            }
            last_sweep = now;
            let expired = {
                let Ok(mut loot) = state.loot.lock() else {
                    continue;
                };
                loot.expire_sweep(now)
            };
            for container in expired {
                session::broadcast(
                    &state,
                    &transport,
                    &Message::LootRemoved {
                        container: container.0,
                    },
                    None,
                );
                logging::log_game(&format!("loot container {} expired", container.0));
            }
        }
    })
}

fn spawn_autosave_loop(
    config: &GameServerConfig,
    state: Arc<ServerState>,
    control: Arc<ServerControl>,
) -> Option<thread::JoinHandle<()>> {
    if config.autosave_interval_seconds == 0 {
        return None;
    }
    let interval = config.autosave_interval_seconds.max(1);
    let store = SaveStore::from_root(&config.root);
    logging::log_save(&format!("autosave enabled: interval={}s", interval));
    println!("ember: autosave enabled (interval={}s)", interval);
    Some(thread::spawn(move || {
        let mut autosave = AutosaveState::new(
            AutosaveConfig {
                interval_seconds: interval,
            },
            Instant::now(),
        );
        while control.is_running() {
            thread::sleep(Duration::from_millis(250));
            let now = Instant::now();
            if !autosave.due(now) {
                continue;
            }
            let report = match state.players.lock() {
                Ok(players) => autosave_players(&players, &store),
                Err(_) => {
                    logging::log_error("autosave failed (players lock poisoned)");
                    autosave.mark_saved(now);
                    continue;
                }
            };
            if let Some(err) = report.error {
                logging::log_error(&format!("autosave failed: {}", err));
                eprintln!("ember: autosave failed: {}", err);
            } else {
                logging::log_save(&format!(
                    "autosave completed (players: {})",
                    report.saved_players
                ));
            }
            autosave.mark_saved(now);
        }
    }))
}
