use crate::catalog::items::ItemTypeId;
use crate::telemetry::logging;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One-time grant for brand-new players. Legacy name-keyed loadouts are
/// migrated to id-keyed entries by whoever edits the file, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarterLoadout {
    pub grants: Vec<(ItemTypeId, u16)>,
}

impl StarterLoadout {
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("loadout.yaml");
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                logging::log_game(&format!(
                    "starter loadout missing at {}, writing defaults",
                    path.display()
                ));
                let file = LoadoutFile::default_loadout();
                if let Err(err) = file.write(&path) {
                    logging::log_error(&format!("starter loadout write failed: {}", err));
                }
                return Ok(file.into_loadout());
            }
            Err(err) => {
                return Err(format!(
                    "starter loadout read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        match serde_yaml::from_str::<LoadoutFile>(&data) {
            Ok(file) => Ok(file.into_loadout()),
            Err(err) => {
                logging::log_error(&format!(
                    "starter loadout invalid at {}, using defaults: {}",
                    path.display(),
                    err
                ));
                Ok(LoadoutFile::default_loadout().into_loadout())
            }
        }
    }

    pub fn default_loadout() -> Self {
        LoadoutFile::default_loadout().into_loadout()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadoutFile {
    grants: Vec<GrantEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GrantEntry {
    item: u16,
    quantity: u16,
}

impl LoadoutFile {
    fn into_loadout(self) -> StarterLoadout {
        StarterLoadout {
            grants: self
                .grants
                .into_iter()
                .filter(|grant| grant.quantity > 0)
                .map(|grant| (ItemTypeId(grant.item), grant.quantity))
                .collect(),
        }
    }

    fn write(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("catalog dir create failed: {}", err))?;
        }
        let data = serde_yaml::to_string(self)
            .map_err(|err| format!("starter loadout serialize failed: {}", err))?;
        fs::write(path, data).map_err(|err| format!("starter loadout write failed: {}", err))
    }

    fn default_loadout() -> Self {
        Self {
            grants: vec![
                GrantEntry {
                    item: 210,
                    quantity: 1,
                },
                GrantEntry {
                    item: 3,
                    quantity: 2,
                },
                GrantEntry {
                    item: 1,
                    quantity: 3,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loadout_has_rock() {
        let loadout = StarterLoadout::default_loadout();
        assert!(loadout
            .grants
            .iter()
            .any(|&(item, qty)| item == ItemTypeId(210) && qty == 1));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir =
            std::env::temp_dir().join(format!("ember-loadout-corrupt-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("dir");
        fs::write(dir.join("loadout.yaml"), "grants: [[[").expect("write");

        let loadout = StarterLoadout::load(&dir).expect("load");
        assert!(!loadout.grants.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_quantity_grants_are_dropped() {
        let file = LoadoutFile {
            grants: vec![
                GrantEntry {
                    item: 100,
                    quantity: 0,
                },
                GrantEntry {
                    item: 101,
                    quantity: 5,
                },
            ],
        };
        let loadout = file.into_loadout();
        assert_eq!(loadout.grants, vec![(ItemTypeId(101), 5)]);
    }
}
