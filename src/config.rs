use std::path::Path;
use std::path::PathBuf;

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub bind_addr: String,
    pub autosave_interval_seconds: u64,
    pub spawn_radius: f32,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: ember <data-root> [bind_addr]".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let bind_addr = if args.len() > 2 {
            args[2].clone()
        } else {
            std::env::var("EMBER_BIND_ADDR")
                .ok()
                .and_then(|value| {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .unwrap_or_else(|| "0.0.0.0:7777".to_string())
        };
        let autosave_interval_seconds = match std::env::var("EMBER_AUTOSAVE_SECS") {
            Ok(value) => value.trim().parse::<u64>().map_err(|_| {
                format!("EMBER_AUTOSAVE_SECS expects seconds, got '{}'", value)
            })?,
            Err(_) => 60,
        };
        let spawn_radius = match std::env::var("EMBER_SPAWN_RADIUS") {
            Ok(value) => {
                let radius = value.trim().parse::<f32>().map_err(|_| {
                    format!("EMBER_SPAWN_RADIUS expects a number, got '{}'", value)
                })?;
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(format!(
                        "EMBER_SPAWN_RADIUS must be positive, got '{}'",
                        value
                    ));
                }
                radius
            }
            Err(_) => 200.0,
        };
        Ok(Self {
            root,
            bind_addr,
            autosave_interval_seconds,
            spawn_radius,
        })
    }
}
