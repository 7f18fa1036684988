pub mod catalog;
pub mod combat;
mod config;
pub mod crafting;
pub mod entities;
pub mod loot;
mod net;
pub mod persistence;
pub mod telemetry;
pub mod world;

pub use net::packet::{PacketReader, PacketWriter};
pub use net::protocol::{DeliveryMode, Message};
pub use net::server::{run_game_server, GameServerConfig, ServerControl};

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root)?;

    let control = std::sync::Arc::new(ServerControl::new());
    let server_config = GameServerConfig {
        root: config.root.clone(),
        bind_addr: config.bind_addr.clone(),
        autosave_interval_seconds: config.autosave_interval_seconds,
        spawn_radius: config.spawn_radius,
    };
    println!("ember: starting");
    println!("- root: {}", config.root.display());
    println!("- bind: {}", config.bind_addr);
    println!("- autosave: {}s", config.autosave_interval_seconds);
    println!("- spawn radius: {}", config.spawn_radius);

    run_game_server(server_config, control)
}
