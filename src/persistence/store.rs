use crate::catalog::items::ItemTypeId;
use crate::entities::inventory::{Inventory, ItemStack, SLOT_COUNT};
use crate::entities::player::{Player, PlayerId};
use crate::world::position::{Rotation, Vec3};
use std::fs;
use std::path::{Path, PathBuf};

const SAVE_HEADER: &str = "# ember player save v1";

#[derive(Debug, Clone)]
pub struct SaveStore {
    root: PathBuf,
}

impl SaveStore {
    pub fn from_root(root: &Path) -> Self {
        Self {
            root: root.join("save"),
        }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loads every player record. A missing file is a fresh world, a
    /// corrupt primary falls back to the backup written by the last save,
    /// and a corrupt backup yields an empty world rather than an error.
    pub fn load_players(&self) -> Result<Vec<Player>, String> {
        let path = self.players_path();
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return match self.load_players_from_backup() {
                    Ok(fallback) => Ok(fallback),
                    Err(backup_err) => {
                        crate::telemetry::logging::log_error(&format!(
                            "save backup unusable, starting with an empty world: {}",
                            backup_err
                        ));
                        Ok(Vec::new())
                    }
                };
            }
            Err(err) => {
                return Err(format!(
                    "player save read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        match parse_players(&data) {
            Ok(players) => Ok(players),
            Err(err) => {
                crate::telemetry::logging::log_error(&format!(
                    "save parse failed for {}, trying backup: {}",
                    path.display(),
                    err
                ));
                match self.load_players_from_backup() {
                    Ok(fallback) => Ok(fallback),
                    Err(backup_err) => {
                        crate::telemetry::logging::log_error(&format!(
                            "save backup unusable, starting with an empty world: {}",
                            backup_err
                        ));
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    /// Writes all records in one pass, keeping the previous file as a
    /// backup so a crash mid-write never loses the last good save.
    pub fn save_players<'a>(
        &self,
        players: impl Iterator<Item = &'a Player>,
    ) -> Result<usize, String> {
        fs::create_dir_all(&self.root).map_err(|err| {
            format!(
                "save dir create failed for {}: {}",
                self.root.display(),
                err
            )
        })?;
        let path = self.players_path();
        let backup_path = self.players_backup_path();
        let mut count = 0usize;
        let mut out = String::new();
        out.push_str(SAVE_HEADER);
        out.push('\n');
        for player in players {
            out.push('\n');
            serialize_player(&mut out, player);
            count += 1;
        }
        if path.exists() {
            fs::copy(&path, &backup_path).map_err(|err| {
                format!(
                    "player save backup failed for {}: {}",
                    backup_path.display(),
                    err
                )
            })?;
        }
        fs::write(&path, out)
            .map_err(|err| format!("player save write failed for {}: {}", path.display(), err))?;
        Ok(count)
    }

    fn players_path(&self) -> PathBuf {
        self.root.join("players.sav")
    }

    fn players_backup_path(&self) -> PathBuf {
        self.root.join("players.sav#")
    }

    fn load_players_from_backup(&self) -> Result<Vec<Player>, String> {
        let backup_path = self.players_backup_path();
        let data = match fs::read_to_string(&backup_path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(format!(
                    "player backup read failed for {}: {}",
                    backup_path.display(),
                    err
                ))
            }
        };
        parse_players(&data)
    }
}

fn serialize_player(out: &mut String, player: &Player) {
    out.push_str(&format!("player = {}\n", player.id.0));
    out.push_str(&format!("name = {}\n", escape_string(&player.name)));
    out.push_str(&format!(
        "position = {},{},{}\n",
        player.position.x, player.position.y, player.position.z
    ));
    out.push_str(&format!(
        "rotation = {},{}\n",
        player.rotation.yaw, player.rotation.pitch
    ));
    out.push_str(&format!("health = {}\n", player.stats.health));
    out.push_str(&format!("hunger = {}\n", player.stats.hunger));
    out.push_str(&format!("thirst = {}\n", player.stats.thirst));
    out.push_str(&format!("temperature = {}\n", player.stats.temperature));
    out.push_str(&format!(
        "dead = {}\n",
        if player.stats.is_dead { 1 } else { 0 }
    ));
    out.push_str(&format!(
        "selected_hotbar = {}\n",
        player.inventory.selected_hotbar()
    ));
    for (index, slot) in player.inventory.slots().iter().enumerate() {
        if let Some(stack) = slot {
            out.push_str(&format!(
                "slot = {},{},{}\n",
                index, stack.item.0, stack.quantity
            ));
        }
    }
}

#[derive(Debug, Default)]
struct PlayerEntry {
    id: Option<PlayerId>,
    name: Option<String>,
    position: Option<Vec3>,
    rotation: Option<Rotation>,
    health: Option<f32>,
    hunger: Option<f32>,
    thirst: Option<f32>,
    temperature: Option<f32>,
    dead: Option<bool>,
    selected_hotbar: Option<u8>,
    slots: Vec<(usize, ItemStack)>,
}

impl PlayerEntry {
    fn has_data(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }

    fn into_player(self, line_no: usize) -> Result<Player, String> {
        let id = self
            .id
            .ok_or_else(|| format!("players.sav missing player id at line {}", line_no))?;
        let name = self.name.ok_or_else(|| {
            format!(
                "players.sav missing name for player {} at line {}",
                id.0, line_no
            )
        })?;
        let position = self.position.unwrap_or_default();
        let mut player = Player::new(id, name, position);
        player.rotation = self.rotation.unwrap_or_default();
        if let Some(health) = self.health {
            player.stats.health = health;
        }
        if let Some(hunger) = self.hunger {
            player.stats.hunger = hunger;
        }
        if let Some(thirst) = self.thirst {
            player.stats.thirst = thirst;
        }
        if let Some(temperature) = self.temperature {
            player.stats.temperature = temperature;
        }
        if self.dead.unwrap_or(false) {
            player.stats.is_dead = true;
            // A dead record from disk had its loot dropped before the save.
            player.stats.death_handled = true;
        }
        let mut inventory = Inventory::default();
        for (index, stack) in self.slots {
            if index >= SLOT_COUNT {
                return Err(format!(
                    "players.sav slot index {} out of range for player {}",
                    index, id.0
                ));
            }
            inventory.set_slot(index, Some(stack));
        }
        if let Some(selected) = self.selected_hotbar {
            inventory.select_hotbar(selected);
        }
        player.inventory = inventory;
        Ok(player)
    }
}

fn parse_players(data: &str) -> Result<Vec<Player>, String> {
    let mut players: Vec<Player> = Vec::new();
    let mut entry = PlayerEntry::default();
    let mut last_line = 1usize;

    let flush = |entry: &mut PlayerEntry,
                     players: &mut Vec<Player>,
                     line_no: usize|
     -> Result<(), String> {
        if !entry.has_data() {
            return Ok(());
        }
        let record = std::mem::take(entry).into_player(line_no)?;
        if players.iter().any(|existing| existing.id == record.id) {
            return Err(format!(
                "players.sav duplicate player id {} at line {}",
                record.id.0, line_no
            ));
        }
        players.push(record);
        Ok(())
    };

    for (idx, raw_line) in data.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            flush(&mut entry, &mut players, last_line)?;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let (key, value) = split_kv(line, line_no)?;
        if key.eq_ignore_ascii_case("player") {
            flush(&mut entry, &mut players, last_line)?;
            entry.id = Some(PlayerId(parse_u32(value, "player", line_no)?));
            last_line = line_no;
            continue;
        }

        match key {
            "name" => {
                entry.name = Some(parse_string(value, line_no)?);
            }
            "position" => {
                let [x, y, z] = parse_f32_list::<3>(value, "position", line_no)?;
                entry.position = Some(Vec3 { x, y, z });
            }
            "rotation" => {
                let [yaw, pitch] = parse_f32_list::<2>(value, "rotation", line_no)?;
                entry.rotation = Some(Rotation { yaw, pitch });
            }
            "health" => entry.health = Some(parse_f32(value, "health", line_no)?),
            "hunger" => entry.hunger = Some(parse_f32(value, "hunger", line_no)?),
            "thirst" => entry.thirst = Some(parse_f32(value, "thirst", line_no)?),
            "temperature" => {
                entry.temperature = Some(parse_f32(value, "temperature", line_no)?)
            }
            "dead" => entry.dead = Some(parse_bool(value, "dead", line_no)?),
            "selected_hotbar" => {
                entry.selected_hotbar =
                    Some(parse_u32(value, "selected_hotbar", line_no)? as u8)
            }
            "slot" => {
                let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                if parts.len() != 3 {
                    return Err(format!(
                        "players.sav slot expects index,item,quantity at line {}, got '{}'",
                        line_no, value
                    ));
                }
                let index = parse_u32(parts[0], "slot index", line_no)? as usize;
                let item = ItemTypeId(parse_u32(parts[1], "slot item", line_no)? as u16);
                let quantity = parse_u32(parts[2], "slot quantity", line_no)? as u16;
                entry.slots.push((index, ItemStack { item, quantity }));
            }
            other => {
                return Err(format!(
                    "players.sav unknown field '{}' at line {}",
                    other, line_no
                ));
            }
        }
        last_line = line_no;
    }

    flush(&mut entry, &mut players, last_line)?;
    Ok(players)
}

fn split_kv(line: &str, line_no: usize) -> Result<(&str, &str), String> {
    let (key, value) = line.split_once('=').ok_or_else(|| {
        format!(
            "players.sav expected key=value at line {}, got '{}'",
            line_no, line
        )
    })?;
    Ok((key.trim(), value.trim()))
}

fn parse_bool(value: &str, label: &str, line_no: usize) -> Result<bool, String> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!(
            "{} expects 0 or 1 at line {}, got '{}'",
            label, line_no, other
        )),
    }
}

fn parse_u32(value: &str, label: &str, line_no: usize) -> Result<u32, String> {
    value.parse::<u32>().map_err(|_| {
        format!(
            "{} expects unsigned int at line {}, got '{}'",
            label, line_no, value
        )
    })
}

fn parse_f32(value: &str, label: &str, line_no: usize) -> Result<f32, String> {
    let parsed = value.parse::<f32>().map_err(|_| {
        format!(
            "{} expects a number at line {}, got '{}'",
            label, line_no, value
        )
    })?;
    if !parsed.is_finite() {
        return Err(format!(
            "{} expects a finite number at line {}, got '{}'",
            label, line_no, value
        ));
    }
    Ok(parsed)
}

fn parse_f32_list<const N: usize>(
    value: &str,
    label: &str,
    line_no: usize,
) -> Result<[f32; N], String> {
    let mut out = [0.0f32; N];
    let mut parts = value.split(',').map(str::trim);
    for slot in out.iter_mut() {
        let part = parts.next().ok_or_else(|| {
            format!(
                "{} expects {} comma-separated numbers at line {}, got '{}'",
                label, N, line_no, value
            )
        })?;
        *slot = parse_f32(part, label, line_no)?;
    }
    if parts.next().is_some() {
        return Err(format!(
            "{} expects {} comma-separated numbers at line {}, got '{}'",
            label, N, line_no, value
        ));
    }
    Ok(out)
}

fn parse_string(value: &str, line_no: usize) -> Result<String, String> {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        unescape_string(&value[1..value.len() - 1])
            .map_err(|err| format!("name parse failed at line {}: {}", line_no, err))
    } else {
        Ok(value.to_string())
    }
}

fn escape_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn unescape_string(input: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            return Err("invalid escape: trailing backslash".to_string());
        };
        match next {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            other => {
                return Err(format!("invalid escape '\\{}'", other));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player() -> Player {
        let mut player = Player::new(
            PlayerId(7),
            "dax \"the\" bold".to_string(),
            Vec3 {
                x: 10.5,
                y: 0.0,
                z: -3.25,
            },
        );
        player.rotation = Rotation {
            yaw: 90.0,
            pitch: -5.0,
        };
        player.stats.health = 61.5;
        player.stats.hunger = 40.0;
        player.stats.thirst = 22.0;
        player.stats.temperature = 31.0;
        player.inventory.set_slot(
            0,
            Some(ItemStack {
                item: ItemTypeId(201),
                quantity: 1,
            }),
        );
        player.inventory.set_slot(
            5,
            Some(ItemStack {
                item: ItemTypeId(100),
                quantity: 450,
            }),
        );
        player.inventory.select_hotbar(5);
        player
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let player = sample_player();
        let mut out = String::new();
        out.push_str(SAVE_HEADER);
        out.push_str("\n\n");
        serialize_player(&mut out, &player);

        let loaded = parse_players(&out).expect("parse");
        assert_eq!(loaded.len(), 1);
        let restored = &loaded[0];
        assert_eq!(restored.id, player.id);
        assert_eq!(restored.name, player.name);
        assert_eq!(restored.position, player.position);
        assert_eq!(restored.rotation, player.rotation);
        assert_eq!(restored.stats.health, player.stats.health);
        assert_eq!(restored.stats.is_dead, false);
        assert_eq!(restored.inventory.selected_hotbar(), 5);
        assert_eq!(
            restored.inventory.slot(0),
            Some(&ItemStack {
                item: ItemTypeId(201),
                quantity: 1,
            })
        );
        assert_eq!(
            restored.inventory.slot(5),
            Some(&ItemStack {
                item: ItemTypeId(100),
                quantity: 450,
            })
        );
        assert_eq!(restored.inventory.slot(1), None);
    }

    #[test]
    fn parse_handles_multiple_records_and_comments() {
        let data = "\
# ember player save v1

player = 1
name = \"ada\"
position = 0,0,0
health = 100

player = 2
name = \"bo\"
position = 1,2,3
dead = 1
";
        let players = parse_players(data).expect("parse");
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "ada");
        assert!(!players[0].stats.is_dead);
        assert!(players[1].stats.is_dead);
        assert!(players[1].stats.death_handled);
    }

    #[test]
    fn parse_rejects_duplicate_ids() {
        let data = "player = 1\nname = a\n\nplayer = 1\nname = b\n";
        assert!(parse_players(data).is_err());
    }

    #[test]
    fn parse_rejects_out_of_range_slot() {
        let data = "player = 1\nname = a\nslot = 24,100,5\n";
        assert!(parse_players(data).is_err());
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = SaveStore::new(std::env::temp_dir().join("ember-missing-save-test"));
        let players = store.load_players().expect("load");
        assert!(players.is_empty());
    }

    #[test]
    fn corrupt_save_without_backup_loads_empty() {
        let dir = std::env::temp_dir().join(format!(
            "ember-corrupt-save-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("dir");
        fs::write(
            dir.join("players.sav"),
            "player = 1\nname = a\nbogus_field = 3\n",
        )
        .expect("write");

        let store = SaveStore::new(&dir);
        let players = store.load_players().expect("load");
        assert!(players.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_save_falls_back_to_backup() {
        let dir = std::env::temp_dir().join(format!(
            "ember-backup-save-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let store = SaveStore::new(&dir);
        let player = sample_player();
        store.save_players([&player].into_iter()).expect("save");
        store.save_players([&player].into_iter()).expect("resave");
        fs::write(dir.join("players.sav"), "player = oops\n").expect("scribble");

        let players = store.load_players().expect("load");
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, player.id);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_then_load_round_trips_on_disk() {
        let dir = std::env::temp_dir().join(format!(
            "ember-save-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let store = SaveStore::new(&dir);
        let player = sample_player();
        let count = store.save_players([&player].into_iter()).expect("save");
        assert_eq!(count, 1);
        // Second save moves the first file into the backup slot.
        let count = store.save_players([&player].into_iter()).expect("resave");
        assert_eq!(count, 1);
        assert!(dir.join("players.sav#").exists());
        let loaded = store.load_players().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, player.name);
        let _ = fs::remove_dir_all(&dir);
    }
}
