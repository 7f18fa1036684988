use crate::telemetry::logging;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemTypeId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCategory {
    Consumable,
    Resource,
    Tool,
    Building,
    Clothing,
}

impl ItemCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemCategory::Consumable => "consumable",
            ItemCategory::Resource => "resource",
            ItemCategory::Tool => "tool",
            ItemCategory::Building => "building",
            ItemCategory::Clothing => "clothing",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "consumable" => Some(ItemCategory::Consumable),
            "resource" => Some(ItemCategory::Resource),
            "tool" => Some(ItemCategory::Tool),
            "building" => Some(ItemCategory::Building),
            "clothing" => Some(ItemCategory::Clothing),
            _ => None,
        }
    }
}

/// Per-use restore amounts for consumable items.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConsumableEffect {
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Hatchet,
    Pickaxe,
    Weapon,
}

impl ToolKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "hatchet" => Some(ToolKind::Hatchet),
            "pickaxe" => Some(ToolKind::Pickaxe),
            "weapon" => Some(ToolKind::Weapon),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ToolKind::Hatchet => "hatchet",
            ToolKind::Pickaxe => "pickaxe",
            ToolKind::Weapon => "weapon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolProfile {
    pub kind: ToolKind,
    pub damage: f32,
    pub ammo: Option<ItemTypeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDefinition {
    pub id: ItemTypeId,
    pub name: String,
    pub category: ItemCategory,
    pub max_stack: u16,
    pub consumable: Option<ConsumableEffect>,
    pub tool: Option<ToolProfile>,
}

impl ItemDefinition {
    pub fn is_consumable(&self) -> bool {
        self.consumable.is_some()
    }
}

/// Immutable item lookup built once at boot. A reload builds a fresh
/// catalog and the orchestrator swaps the shared `Arc` wholesale.
#[derive(Debug, Default)]
pub struct ItemCatalog {
    items: HashMap<ItemTypeId, ItemDefinition>,
}

impl ItemCatalog {
    pub fn get(&self, id: ItemTypeId) -> Option<&ItemDefinition> {
        self.items.get(&id)
    }

    pub fn max_stack(&self, id: ItemTypeId) -> u16 {
        self.items.get(&id).map(|def| def.max_stack).unwrap_or(1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn from_definitions(defs: Vec<ItemDefinition>) -> Result<Self, String> {
        let mut items = HashMap::with_capacity(defs.len());
        for def in defs {
            if def.max_stack == 0 {
                return Err(format!("item {} has zero max stack", def.id.0));
            }
            if items.insert(def.id, def).is_some() {
                return Err("duplicate item id in catalog".to_string());
            }
        }
        Ok(Self { items })
    }

    /// Loads `items.yaml` under the data root. A missing file is replaced
    /// by the built-in default catalog, which is also written back out so
    /// operators have something to edit. An unparseable file falls back to
    /// the defaults without touching the operator's file.
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("items.yaml");
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                logging::log_game(&format!(
                    "item catalog missing at {}, writing defaults",
                    path.display()
                ));
                let file = ItemCatalogFile::default_catalog();
                if let Err(err) = file.write(&path) {
                    logging::log_error(&format!("item catalog write failed: {}", err));
                }
                return file.into_catalog();
            }
            Err(err) => {
                return Err(format!(
                    "item catalog read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        let parsed = serde_yaml::from_str::<ItemCatalogFile>(&data)
            .map_err(|err| err.to_string())
            .and_then(ItemCatalogFile::into_catalog);
        match parsed {
            Ok(catalog) => Ok(catalog),
            Err(err) => {
                logging::log_error(&format!(
                    "item catalog invalid at {}, using defaults: {}",
                    path.display(),
                    err
                ));
                ItemCatalogFile::default_catalog().into_catalog()
            }
        }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.values()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemCatalogFile {
    items: Vec<ItemEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemEntry {
    id: u16,
    name: String,
    category: String,
    max_stack: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore: Option<RestoreEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    damage: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ammo: Option<u16>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RestoreEntry {
    #[serde(default)]
    health: f32,
    #[serde(default)]
    hunger: f32,
    #[serde(default)]
    thirst: f32,
}

impl ItemCatalogFile {
    fn into_catalog(self) -> Result<ItemCatalog, String> {
        let mut defs = Vec::with_capacity(self.items.len());
        for entry in self.items {
            let category = ItemCategory::parse(&entry.category).ok_or_else(|| {
                format!("item {} has unknown category '{}'", entry.id, entry.category)
            })?;
            let consumable = entry.restore.map(|restore| ConsumableEffect {
                health: restore.health,
                hunger: restore.hunger,
                thirst: restore.thirst,
            });
            if consumable.is_some() && category != ItemCategory::Consumable {
                return Err(format!(
                    "item {} has restore amounts but category '{}'",
                    entry.id, entry.category
                ));
            }
            let tool = match entry.tool.as_deref() {
                Some(raw) => {
                    let kind = ToolKind::parse(raw)
                        .ok_or_else(|| format!("item {} has unknown tool '{}'", entry.id, raw))?;
                    Some(ToolProfile {
                        kind,
                        damage: entry.damage.unwrap_or(10.0),
                        ammo: entry.ammo.map(ItemTypeId),
                    })
                }
                None => None,
            };
            defs.push(ItemDefinition {
                id: ItemTypeId(entry.id),
                name: entry.name,
                category,
                max_stack: entry.max_stack,
                consumable,
                tool,
            });
        }
        ItemCatalog::from_definitions(defs)
    }

    fn write(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("catalog dir create failed: {}", err))?;
        }
        let data = serde_yaml::to_string(self)
            .map_err(|err| format!("item catalog serialize failed: {}", err))?;
        fs::write(path, data).map_err(|err| format!("item catalog write failed: {}", err))
    }

    fn default_catalog() -> Self {
        fn plain(id: u16, name: &str, category: &str, max_stack: u16) -> ItemEntry {
            ItemEntry {
                id,
                name: name.to_string(),
                category: category.to_string(),
                max_stack,
                restore: None,
                tool: None,
                damage: None,
                ammo: None,
            }
        }
        fn consumable(id: u16, name: &str, max_stack: u16, health: f32, hunger: f32, thirst: f32) -> ItemEntry {
            ItemEntry {
                restore: Some(RestoreEntry {
                    health,
                    hunger,
                    thirst,
                }),
                ..plain(id, name, "consumable", max_stack)
            }
        }
        fn tool(id: u16, name: &str, kind: ToolKind, damage: f32, ammo: Option<u16>) -> ItemEntry {
            ItemEntry {
                tool: Some(kind.as_str().to_string()),
                damage: Some(damage),
                ammo,
                ..plain(id, name, "tool", 1)
            }
        }
        Self {
            items: vec![
                consumable(1, "Cooked Meat", 10, 5.0, 30.0, 0.0),
                consumable(2, "Water Jug", 5, 0.0, 0.0, 40.0),
                consumable(3, "Bandage", 10, 20.0, 0.0, 0.0),
                plain(100, "Wood", "resource", 1000),
                plain(101, "Stone", "resource", 1000),
                plain(102, "Metal Ore", "resource", 1000),
                plain(103, "Sulfur Ore", "resource", 1000),
                tool(201, "Hatchet", ToolKind::Hatchet, 25.0, None),
                tool(202, "Pickaxe", ToolKind::Pickaxe, 25.0, None),
                tool(210, "Rock", ToolKind::Weapon, 10.0, None),
                tool(211, "Bow", ToolKind::Weapon, 40.0, Some(212)),
                plain(212, "Arrow", "resource", 64),
                plain(300, "Wooden Wall", "building", 100),
                plain(400, "Cloth Shirt", "clothing", 1),
            ],
        }
    }
}

/// Built-in catalog used by tests and as the missing-file fallback.
pub fn default_catalog() -> ItemCatalog {
    ItemCatalogFile::default_catalog()
        .into_catalog()
        .expect("default catalog is valid")
}
