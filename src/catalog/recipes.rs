use crate::catalog::items::ItemTypeId;
use crate::telemetry::logging;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipeId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingredient {
    pub item: ItemTypeId,
    pub quantity: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub result_item: ItemTypeId,
    pub result_quantity: u16,
    pub craft_seconds: f32,
    pub ingredients: Vec<Ingredient>,
    pub workbench_tier: Option<u8>,
}

/// Static recipe lookup, loaded once and swapped wholesale on reload.
#[derive(Debug, Default)]
pub struct RecipeBook {
    recipes: HashMap<RecipeId, Recipe>,
}

impl RecipeBook {
    pub fn get(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn from_recipes(recipes: Vec<Recipe>) -> Result<Self, String> {
        let mut map = HashMap::with_capacity(recipes.len());
        for recipe in recipes {
            if recipe.result_quantity == 0 {
                return Err(format!("recipe {} yields nothing", recipe.id.0));
            }
            if recipe.craft_seconds <= 0.0 {
                return Err(format!("recipe {} has no craft time", recipe.id.0));
            }
            if map.insert(recipe.id, recipe).is_some() {
                return Err("duplicate recipe id in catalog".to_string());
            }
        }
        Ok(Self { recipes: map })
    }

    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("recipes.yaml");
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                logging::log_game(&format!(
                    "recipe catalog missing at {}, writing defaults",
                    path.display()
                ));
                let file = RecipeFile::default_recipes();
                if let Err(err) = file.write(&path) {
                    logging::log_error(&format!("recipe catalog write failed: {}", err));
                }
                return file.into_book();
            }
            Err(err) => {
                return Err(format!(
                    "recipe catalog read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        let parsed = serde_yaml::from_str::<RecipeFile>(&data)
            .map_err(|err| err.to_string())
            .and_then(RecipeFile::into_book);
        match parsed {
            Ok(book) => Ok(book),
            Err(err) => {
                logging::log_error(&format!(
                    "recipe catalog invalid at {}, using defaults: {}",
                    path.display(),
                    err
                ));
                RecipeFile::default_recipes().into_book()
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipeFile {
    recipes: Vec<RecipeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipeEntry {
    id: u16,
    name: String,
    result: u16,
    quantity: u16,
    seconds: f32,
    ingredients: Vec<IngredientEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workbench: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IngredientEntry {
    item: u16,
    quantity: u16,
}

impl RecipeFile {
    fn into_book(self) -> Result<RecipeBook, String> {
        let recipes = self
            .recipes
            .into_iter()
            .map(|entry| Recipe {
                id: RecipeId(entry.id),
                name: entry.name,
                result_item: ItemTypeId(entry.result),
                result_quantity: entry.quantity,
                craft_seconds: entry.seconds,
                ingredients: entry
                    .ingredients
                    .into_iter()
                    .map(|ing| Ingredient {
                        item: ItemTypeId(ing.item),
                        quantity: ing.quantity,
                    })
                    .collect(),
                workbench_tier: entry.workbench,
            })
            .collect();
        RecipeBook::from_recipes(recipes)
    }

    fn write(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("catalog dir create failed: {}", err))?;
        }
        let data = serde_yaml::to_string(self)
            .map_err(|err| format!("recipe catalog serialize failed: {}", err))?;
        fs::write(path, data).map_err(|err| format!("recipe catalog write failed: {}", err))
    }

    fn default_recipes() -> Self {
        fn entry(
            id: u16,
            name: &str,
            result: u16,
            quantity: u16,
            seconds: f32,
            ingredients: &[(u16, u16)],
            workbench: Option<u8>,
        ) -> RecipeEntry {
            RecipeEntry {
                id,
                name: name.to_string(),
                result,
                quantity,
                seconds,
                ingredients: ingredients
                    .iter()
                    .map(|&(item, quantity)| IngredientEntry { item, quantity })
                    .collect(),
                workbench,
            }
        }
        Self {
            recipes: vec![
                entry(1, "Hatchet", 201, 1, 10.0, &[(100, 50), (101, 25)], None),
                entry(2, "Pickaxe", 202, 1, 10.0, &[(100, 50), (101, 25)], None),
                entry(3, "Bandage", 3, 1, 5.0, &[(400, 1)], None),
                entry(4, "Bow", 211, 1, 20.0, &[(100, 100)], None),
                entry(5, "Arrow", 212, 8, 6.0, &[(100, 10), (101, 5)], None),
                entry(6, "Wooden Wall", 300, 1, 15.0, &[(100, 200)], Some(1)),
            ],
        }
    }
}

/// Built-in recipe book used by tests and as the missing-file fallback.
pub fn default_recipe_book() -> RecipeBook {
    RecipeFile::default_recipes()
        .into_book()
        .expect("default recipes are valid")
}
