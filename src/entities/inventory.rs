use crate::catalog::items::{ConsumableEffect, ItemCatalog, ItemTypeId};

pub const SLOT_COUNT: usize = 24;
pub const HOTBAR_SLOTS: usize = 6;

/// One occupied inventory slot. Quantity is strictly positive and bounded
/// by the item definition's max stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStack {
    pub item: ItemTypeId,
    pub quantity: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryError {
    ZeroQuantity,
    UnknownItem,
    InsufficientSpace,
    InvalidSlot,
    EmptySlot,
    NotConsumable,
    SameSlot,
}

impl InventoryError {
    pub fn reason(self) -> &'static str {
        match self {
            InventoryError::ZeroQuantity => "quantity must be positive",
            InventoryError::UnknownItem => "unknown item",
            InventoryError::InsufficientSpace => "not enough inventory space",
            InventoryError::InvalidSlot => "invalid inventory slot",
            InventoryError::EmptySlot => "slot is empty",
            InventoryError::NotConsumable => "item cannot be consumed",
            InventoryError::SameSlot => "cannot move item onto itself",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    selected_hotbar: u8,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT],
            selected_hotbar: 0,
        }
    }
}

impl Inventory {
    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(|entry| entry.as_ref())
    }

    pub fn set_slot(&mut self, index: usize, stack: Option<ItemStack>) {
        if let Some(entry) = self.slots.get_mut(index) {
            *entry = stack.filter(|stack| stack.quantity > 0);
        }
    }

    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    pub fn selected_hotbar(&self) -> u8 {
        self.selected_hotbar
    }

    pub fn select_hotbar(&mut self, index: u8) -> bool {
        if (index as usize) < HOTBAR_SLOTS {
            self.selected_hotbar = index;
            return true;
        }
        false
    }

    pub fn count_of(&self, item: ItemTypeId) -> u32 {
        self.slots
            .iter()
            .filter_map(|entry| entry.as_ref())
            .filter(|stack| stack.item == item)
            .fold(0u32, |acc, stack| acc + u32::from(stack.quantity))
    }

    pub fn holds(&self, item: ItemTypeId) -> bool {
        self.count_of(item) > 0
    }

    /// Snapshot of occupied slots, used for loot bags and persistence.
    pub fn occupied(&self) -> Vec<(usize, ItemStack)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.map(|stack| (index, stack)))
            .collect()
    }

    pub fn clear(&mut self) {
        for entry in &mut self.slots {
            *entry = None;
        }
    }

    fn free_capacity_for(&self, catalog: &ItemCatalog, item: ItemTypeId) -> u32 {
        let max_stack = u32::from(catalog.max_stack(item));
        self.slots
            .iter()
            .map(|entry| match entry {
                Some(stack) if stack.item == item => {
                    max_stack.saturating_sub(u32::from(stack.quantity))
                }
                Some(_) => 0,
                None => max_stack,
            })
            .sum()
    }

    /// Tops up partial stacks left-to-right, then fills empty slots.
    /// All-or-nothing: when the remainder cannot be placed the inventory is
    /// left untouched and `InsufficientSpace` is returned.
    pub fn add_item(
        &mut self,
        catalog: &ItemCatalog,
        item: ItemTypeId,
        quantity: u16,
    ) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        let definition = catalog.get(item).ok_or(InventoryError::UnknownItem)?;
        if self.free_capacity_for(catalog, item) < u32::from(quantity) {
            return Err(InventoryError::InsufficientSpace);
        }

        let max_stack = definition.max_stack;
        let mut remaining = quantity;
        for entry in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = entry {
                if stack.item == item && stack.quantity < max_stack {
                    let take = remaining.min(max_stack - stack.quantity);
                    stack.quantity += take;
                    remaining -= take;
                }
            }
        }
        for entry in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if entry.is_none() {
                let take = remaining.min(max_stack);
                *entry = Some(ItemStack {
                    item,
                    quantity: take,
                });
                remaining -= take;
            }
        }
        debug_assert_eq!(remaining, 0);
        Ok(())
    }

    /// Walks all matching slots removing up to `quantity`. Returns whether
    /// the full amount was removed.
    pub fn remove_item(&mut self, item: ItemTypeId, quantity: u16) -> bool {
        let mut remaining = quantity;
        for entry in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = entry {
                if stack.item == item {
                    let take = remaining.min(stack.quantity);
                    stack.quantity -= take;
                    remaining -= take;
                    if stack.quantity == 0 {
                        *entry = None;
                    }
                }
            }
        }
        remaining == 0
    }

    /// Decrements a consumable stack by one and returns the item and its
    /// restore effect. The policy of when consumption happens lives in the
    /// request dispatcher, not here.
    pub fn consume(
        &mut self,
        catalog: &ItemCatalog,
        slot: usize,
    ) -> Result<(ItemTypeId, ConsumableEffect), InventoryError> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(InventoryError::InvalidSlot)?;
        let stack = entry.as_mut().ok_or(InventoryError::EmptySlot)?;
        let definition = catalog.get(stack.item).ok_or(InventoryError::UnknownItem)?;
        let effect = definition.consumable.ok_or(InventoryError::NotConsumable)?;
        let item = stack.item;
        stack.quantity -= 1;
        if stack.quantity == 0 {
            *entry = None;
        }
        Ok((item, effect))
    }

    /// Merges same-item stacks (overflow stays in the source) or swaps.
    pub fn move_item(
        &mut self,
        catalog: &ItemCatalog,
        from: usize,
        to: usize,
    ) -> Result<(), InventoryError> {
        if from == to {
            return Err(InventoryError::SameSlot);
        }
        if from >= self.slots.len() || to >= self.slots.len() {
            return Err(InventoryError::InvalidSlot);
        }
        let source = self.slots[from].ok_or(InventoryError::EmptySlot)?;

        match self.slots[to] {
            Some(dest) if dest.item == source.item => {
                let max_stack = catalog.max_stack(source.item);
                let space = max_stack.saturating_sub(dest.quantity);
                let moved = source.quantity.min(space);
                if let Some(dest) = self.slots[to].as_mut() {
                    dest.quantity += moved;
                }
                let left = source.quantity - moved;
                self.slots[from] = if left > 0 {
                    Some(ItemStack {
                        item: source.item,
                        quantity: left,
                    })
                } else {
                    None
                };
            }
            _ => self.slots.swap(from, to),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::items::default_catalog;

    const WOOD: ItemTypeId = ItemTypeId(100);
    const STONE: ItemTypeId = ItemTypeId(101);
    const MEAT: ItemTypeId = ItemTypeId(1);
    const HATCHET: ItemTypeId = ItemTypeId(201);

    #[test]
    fn add_to_empty_inventory_uses_one_slot() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.add_item(&catalog, WOOD, 50).expect("add");
        assert_eq!(inv.slot(0), Some(&ItemStack { item: WOOD, quantity: 50 }));
        assert_eq!(inv.count_of(WOOD), 50);
    }

    #[test]
    fn add_tops_up_partial_stacks_before_empty_slots() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: MEAT, quantity: 8 }));
        inv.add_item(&catalog, MEAT, 5).expect("add");
        // Max stack for meat is 10: slot 0 fills to 10, remainder opens slot 1.
        assert_eq!(inv.slot(0).map(|s| s.quantity), Some(10));
        assert_eq!(inv.slot(1).map(|s| s.quantity), Some(3));
    }

    #[test]
    fn add_fails_whole_when_space_is_insufficient() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        // Fill every slot with unsplittable hatchets.
        for index in 0..SLOT_COUNT {
            inv.set_slot(index, Some(ItemStack { item: HATCHET, quantity: 1 }));
        }
        let err = inv.add_item(&catalog, WOOD, 1).expect_err("full");
        assert_eq!(err, InventoryError::InsufficientSpace);
        assert_eq!(inv.count_of(WOOD), 0);
    }

    #[test]
    fn add_overflowing_partial_fill_is_rolled_back() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        for index in 1..SLOT_COUNT {
            inv.set_slot(index, Some(ItemStack { item: HATCHET, quantity: 1 }));
        }
        inv.set_slot(0, Some(ItemStack { item: MEAT, quantity: 5 }));
        // Capacity left for meat is 5; 6 must not partially land.
        let err = inv.add_item(&catalog, MEAT, 6).expect_err("overflow");
        assert_eq!(err, InventoryError::InsufficientSpace);
        assert_eq!(inv.count_of(MEAT), 5);
    }

    #[test]
    fn remove_walks_multiple_stacks() {
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: MEAT, quantity: 10 }));
        inv.set_slot(3, Some(ItemStack { item: MEAT, quantity: 4 }));
        assert!(inv.remove_item(MEAT, 12));
        assert_eq!(inv.count_of(MEAT), 2);
        assert!(!inv.remove_item(MEAT, 5));
        assert_eq!(inv.count_of(MEAT), 0);
    }

    #[test]
    fn consume_decrements_and_frees_slot() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(2, Some(ItemStack { item: MEAT, quantity: 1 }));
        let (item, effect) = inv.consume(&catalog, 2).expect("consume");
        assert_eq!(item, MEAT);
        assert_eq!(effect.hunger, 30.0);
        assert_eq!(inv.slot(2), None);
    }

    #[test]
    fn consume_rejects_non_consumable_and_empty() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: WOOD, quantity: 5 }));
        assert_eq!(
            inv.consume(&catalog, 0).expect_err("wood"),
            InventoryError::NotConsumable
        );
        assert_eq!(
            inv.consume(&catalog, 1).expect_err("empty"),
            InventoryError::EmptySlot
        );
        assert_eq!(inv.count_of(WOOD), 5);
    }

    #[test]
    fn move_merges_with_overflow_left_in_source() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: MEAT, quantity: 7 }));
        inv.set_slot(1, Some(ItemStack { item: MEAT, quantity: 6 }));
        inv.move_item(&catalog, 0, 1).expect("merge");
        assert_eq!(inv.slot(1).map(|s| s.quantity), Some(10));
        assert_eq!(inv.slot(0).map(|s| s.quantity), Some(3));
    }

    #[test]
    fn move_swaps_different_items() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: WOOD, quantity: 5 }));
        inv.set_slot(4, Some(ItemStack { item: STONE, quantity: 9 }));
        inv.move_item(&catalog, 0, 4).expect("swap");
        assert_eq!(inv.slot(0).map(|s| s.item), Some(STONE));
        assert_eq!(inv.slot(4).map(|s| s.item), Some(WOOD));
    }

    #[test]
    fn move_onto_itself_is_rejected() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: WOOD, quantity: 5 }));
        assert_eq!(
            inv.move_item(&catalog, 0, 0).expect_err("self move"),
            InventoryError::SameSlot
        );
    }

    #[test]
    fn moves_never_change_totals() {
        let catalog = default_catalog();
        let mut inv = Inventory::default();
        inv.set_slot(0, Some(ItemStack { item: MEAT, quantity: 9 }));
        inv.set_slot(1, Some(ItemStack { item: MEAT, quantity: 9 }));
        inv.set_slot(2, Some(ItemStack { item: WOOD, quantity: 70 }));
        let meat_before = inv.count_of(MEAT);
        let wood_before = inv.count_of(WOOD);
        for (from, to) in [(0, 1), (1, 2), (2, 0), (0, 5), (5, 1)] {
            let _ = inv.move_item(&catalog, from, to);
        }
        assert_eq!(inv.count_of(MEAT), meat_before);
        assert_eq!(inv.count_of(WOOD), wood_before);
    }

    #[test]
    fn hotbar_selection_is_bounded() {
        let mut inv = Inventory::default();
        assert!(inv.select_hotbar(5));
        assert_eq!(inv.selected_hotbar(), 5);
        assert!(!inv.select_hotbar(6));
        assert_eq!(inv.selected_hotbar(), 5);
    }
}
