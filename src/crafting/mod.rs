use crate::catalog::recipes::{RecipeBook, RecipeId};
use crate::entities::inventory::Inventory;
use crate::entities::player::PlayerId;
use std::collections::HashMap;

pub const QUEUE_CAP: usize = 5;

/// One in-progress craft. Ingredients were deducted when it was queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CraftQueueEntry {
    pub recipe: RecipeId,
    pub elapsed: f32,
    pub required: f32,
}

impl CraftQueueEntry {
    pub fn progress(&self) -> f32 {
        if self.required <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.required).clamp(0.0, 1.0)
    }

    pub fn remaining(&self) -> f32 {
        (self.required - self.elapsed).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CraftStartError {
    UnknownRecipe,
    QueueFull,
    MissingIngredients,
}

impl CraftStartError {
    pub fn reason(self) -> &'static str {
        match self {
            CraftStartError::UnknownRecipe => "unknown recipe",
            CraftStartError::QueueFull => "crafting queue is full",
            CraftStartError::MissingIngredients => "insufficient resources",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CraftCompletion {
    pub player: PlayerId,
    pub recipe: RecipeId,
}

/// Per-player craft queues, owned here and keyed by player id so the
/// player record itself stays free of a second lock.
#[derive(Debug, Default)]
pub struct CraftingState {
    queues: HashMap<PlayerId, Vec<CraftQueueEntry>>,
}

impl CraftingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, player: PlayerId) -> &[CraftQueueEntry] {
        self.queues.get(&player).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Verifies and deducts ingredients atomically, then appends the
    /// entry. On any failure the inventory is untouched.
    pub fn start(
        &mut self,
        book: &RecipeBook,
        player: PlayerId,
        recipe_id: RecipeId,
        inventory: &mut Inventory,
    ) -> Result<CraftQueueEntry, CraftStartError> {
        let recipe = book.get(recipe_id).ok_or(CraftStartError::UnknownRecipe)?;
        let queue = self.queues.entry(player).or_default();
        if queue.len() >= QUEUE_CAP {
            return Err(CraftStartError::QueueFull);
        }
        for ingredient in &recipe.ingredients {
            if inventory.count_of(ingredient.item) < u32::from(ingredient.quantity) {
                return Err(CraftStartError::MissingIngredients);
            }
        }
        for ingredient in &recipe.ingredients {
            let removed = inventory.remove_item(ingredient.item, ingredient.quantity);
            debug_assert!(removed, "ingredient count verified above");
        }
        let entry = CraftQueueEntry {
            recipe: recipe_id,
            elapsed: 0.0,
            required: recipe.craft_seconds,
        };
        queue.push(entry);
        Ok(entry)
    }

    /// Removes an in-progress entry by index. Consumed ingredients are
    /// not refunded.
    pub fn cancel(&mut self, player: PlayerId, index: usize) -> bool {
        let Some(queue) = self.queues.get_mut(&player) else {
            return false;
        };
        if index >= queue.len() {
            return false;
        }
        queue.remove(index);
        if queue.is_empty() {
            self.queues.remove(&player);
        }
        true
    }

    pub fn drop_player(&mut self, player: PlayerId) {
        self.queues.remove(&player);
    }

    /// Advances each player's queue head by `dt` seconds and pops
    /// completed entries. The caller grants the results.
    pub fn tick(&mut self, dt: f32) -> Vec<CraftCompletion> {
        let mut completions = Vec::new();
        self.queues.retain(|&player, queue| {
            if let Some(head) = queue.first_mut() {
                head.elapsed += dt;
                if head.elapsed >= head.required {
                    let entry = queue.remove(0);
                    completions.push(CraftCompletion {
                        player,
                        recipe: entry.recipe,
                    });
                }
            }
            !queue.is_empty()
        });
        completions
    }

    pub fn players_with_queues(&self) -> Vec<PlayerId> {
        self.queues.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::items::{default_catalog, ItemTypeId};
    use crate::catalog::recipes::default_recipe_book;

    const WOOD: ItemTypeId = ItemTypeId(100);
    const STONE: ItemTypeId = ItemTypeId(101);
    const HATCHET_RECIPE: RecipeId = RecipeId(1);

    fn stocked_inventory() -> Inventory {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.add_item(&catalog, WOOD, 200).expect("wood");
        inv.add_item(&catalog, STONE, 100).expect("stone");
        inv
    }

    #[test]
    fn start_deducts_ingredients_immediately() {
        let book = default_recipe_book();
        let mut state = CraftingState::new();
        let mut inv = stocked_inventory();
        state
            .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
            .expect("start");
        assert_eq!(inv.count_of(WOOD), 150);
        assert_eq!(inv.count_of(STONE), 75);
        assert_eq!(state.queue(PlayerId(1)).len(), 1);
    }

    #[test]
    fn unaffordable_start_never_mutates_inventory() {
        let book = default_recipe_book();
        let catalog = default_catalog();
        let mut state = CraftingState::new();
        let mut inv = Inventory::default();
        inv.add_item(&catalog, WOOD, 1).expect("wood");
        let err = state
            .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
            .expect_err("missing stone");
        assert_eq!(err, CraftStartError::MissingIngredients);
        assert_eq!(inv.count_of(WOOD), 1);
        assert!(state.queue(PlayerId(1)).is_empty());
    }

    #[test]
    fn queue_cap_is_enforced() {
        let book = default_recipe_book();
        let catalog = default_catalog();
        let mut state = CraftingState::new();
        let mut inv = Inventory::default();
        inv.add_item(&catalog, WOOD, 1000).expect("wood");
        inv.add_item(&catalog, STONE, 1000).expect("stone");
        for _ in 0..QUEUE_CAP {
            state
                .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
                .expect("start");
        }
        let before = inv.count_of(WOOD);
        let err = state
            .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
            .expect_err("full");
        assert_eq!(err, CraftStartError::QueueFull);
        assert_eq!(inv.count_of(WOOD), before);
    }

    #[test]
    fn tick_completes_the_head_in_order() {
        let book = default_recipe_book();
        let mut state = CraftingState::new();
        let mut inv = stocked_inventory();
        state
            .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
            .expect("first");
        state
            .start(&book, PlayerId(1), RecipeId(2), &mut inv)
            .expect("second");

        // Hatchet takes 10s; the second entry must not advance meanwhile.
        assert!(state.tick(9.9).is_empty());
        let done = state.tick(0.2);
        assert_eq!(
            done,
            vec![CraftCompletion {
                player: PlayerId(1),
                recipe: HATCHET_RECIPE,
            }]
        );
        let queue = state.queue(PlayerId(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].elapsed, 0.0);
    }

    #[test]
    fn cancel_removes_entry_only() {
        let book = default_recipe_book();
        let mut state = CraftingState::new();
        let mut inv = stocked_inventory();
        state
            .start(&book, PlayerId(1), HATCHET_RECIPE, &mut inv)
            .expect("start");
        assert!(state.cancel(PlayerId(1), 0));
        assert!(state.queue(PlayerId(1)).is_empty());
        assert!(!state.cancel(PlayerId(1), 0));
    }

    #[test]
    fn progress_fraction_is_clamped() {
        let entry = CraftQueueEntry {
            recipe: RecipeId(1),
            elapsed: 15.0,
            required: 10.0,
        };
        assert_eq!(entry.progress(), 1.0);
        assert_eq!(entry.remaining(), 0.0);
    }
}
