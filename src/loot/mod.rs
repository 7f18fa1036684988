use crate::catalog::items::ItemCatalog;
use crate::entities::inventory::{Inventory, ItemStack};
use crate::world::position::Vec3;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const LOOT_EXPIRY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u32);

/// Ownerless dropped-loot bag. Created from a dying player's inventory
/// snapshot; anyone may withdraw.
#[derive(Debug, Clone)]
pub struct LootContainer {
    pub id: ContainerId,
    pub position: Vec3,
    pub owner_name: String,
    pub created_at: Instant,
    pub items: Vec<ItemStack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    Withdrawn {
        item: ItemStack,
        container_removed: bool,
    },
    UnknownContainer,
    EmptySlot,
    InventoryFull,
}

#[derive(Debug, Default)]
pub struct LootStore {
    containers: HashMap<ContainerId, LootContainer>,
    next_id: u32,
}

impl LootStore {
    pub fn new() -> Self {
        Self {
            containers: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, id: ContainerId) -> Option<&LootContainer> {
        self.containers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LootContainer> {
        self.containers.values()
    }

    /// Builds a container from occupied inventory stacks. An empty
    /// snapshot produces no container.
    pub fn spawn(
        &mut self,
        position: Vec3,
        owner_name: String,
        items: Vec<ItemStack>,
        now: Instant,
    ) -> Option<ContainerId> {
        let items: Vec<ItemStack> = items.into_iter().filter(|stack| stack.quantity > 0).collect();
        if items.is_empty() {
            return None;
        }
        let id = ContainerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.containers.insert(
            id,
            LootContainer {
                id,
                position,
                owner_name,
                created_at: now,
                items,
            },
        );
        Some(id)
    }

    /// Clamps the request to what is available, adds to the requester's
    /// inventory first, and only removes from the container when the add
    /// succeeded. A full inventory leaves the container untouched.
    pub fn withdraw(
        &mut self,
        catalog: &ItemCatalog,
        id: ContainerId,
        slot: usize,
        quantity: u16,
        inventory: &mut Inventory,
    ) -> WithdrawOutcome {
        let Some(container) = self.containers.get_mut(&id) else {
            return WithdrawOutcome::UnknownContainer;
        };
        let Some(stack) = container.items.get_mut(slot) else {
            return WithdrawOutcome::EmptySlot;
        };
        let take = quantity.min(stack.quantity);
        if take == 0 {
            return WithdrawOutcome::EmptySlot;
        }
        if inventory.add_item(catalog, stack.item, take).is_err() {
            return WithdrawOutcome::InventoryFull;
        }
        let withdrawn = ItemStack {
            item: stack.item,
            quantity: take,
        };
        stack.quantity -= take;
        if stack.quantity == 0 {
            container.items.remove(slot);
        }
        let container_removed = container.items.is_empty();
        if container_removed {
            self.containers.remove(&id);
        }
        WithdrawOutcome::Withdrawn {
            item: withdrawn,
            container_removed,
        }
    }

    /// GCs containers older than the expiry window.
    pub fn expire_sweep(&mut self, now: Instant) -> Vec<ContainerId> {
        let mut expired = Vec::new();
        self.containers.retain(|&id, container| {
            if now.duration_since(container.created_at) >= LOOT_EXPIRY {
                expired.push(id);
                false
            } else {
                true
            }
        });
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::items::{default_catalog, ItemTypeId};

    const WOOD: ItemTypeId = ItemTypeId(100);
    const MEAT: ItemTypeId = ItemTypeId(1);
    const HATCHET: ItemTypeId = ItemTypeId(201);

    fn store_with_bag(items: Vec<ItemStack>) -> (LootStore, ContainerId) {
        let mut store = LootStore::new();
        let id = store
            .spawn(Vec3::default(), "victim".to_string(), items, Instant::now())
            .expect("container");
        (store, id)
    }

    #[test]
    fn empty_snapshot_creates_no_container() {
        let mut store = LootStore::new();
        assert_eq!(
            store.spawn(Vec3::default(), "ghost".to_string(), Vec::new(), Instant::now()),
            None
        );
        assert!(store.is_empty());
    }

    #[test]
    fn withdraw_clamps_to_available() {
        let catalog = default_catalog();
        let (mut store, id) = store_with_bag(vec![ItemStack {
            item: WOOD,
            quantity: 30,
        }]);
        let mut inv = Inventory::default();
        let outcome = store.withdraw(&catalog, id, 0, 100, &mut inv);
        assert_eq!(
            outcome,
            WithdrawOutcome::Withdrawn {
                item: ItemStack {
                    item: WOOD,
                    quantity: 30,
                },
                container_removed: true,
            }
        );
        assert_eq!(inv.count_of(WOOD), 30);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn full_inventory_leaves_container_untouched() {
        let catalog = default_catalog();
        let (mut store, id) = store_with_bag(vec![ItemStack {
            item: WOOD,
            quantity: 30,
        }]);
        let mut inv = Inventory::default();
        for index in 0..crate::entities::inventory::SLOT_COUNT {
            inv.set_slot(
                index,
                Some(ItemStack {
                    item: HATCHET,
                    quantity: 1,
                }),
            );
        }
        let outcome = store.withdraw(&catalog, id, 0, 10, &mut inv);
        assert_eq!(outcome, WithdrawOutcome::InventoryFull);
        assert_eq!(store.get(id).expect("container").items[0].quantity, 30);
        assert_eq!(inv.count_of(WOOD), 0);
    }

    #[test]
    fn withdrawal_conserves_items() {
        let catalog = default_catalog();
        let (mut store, id) = store_with_bag(vec![
            ItemStack {
                item: WOOD,
                quantity: 50,
            },
            ItemStack {
                item: MEAT,
                quantity: 4,
            },
        ]);
        let mut inv = Inventory::default();
        let mut taken: u32 = 0;
        for _ in 0..10 {
            match store.withdraw(&catalog, id, 0, 10, &mut inv) {
                WithdrawOutcome::Withdrawn { item, container_removed } => {
                    taken += u32::from(item.quantity);
                    if container_removed {
                        break;
                    }
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(taken, 54);
        assert_eq!(inv.count_of(WOOD), 50);
        assert_eq!(inv.count_of(MEAT), 4);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn expiry_sweep_removes_old_containers() {
        let now = Instant::now();
        let mut store = LootStore::new();
        let old = store
            .spawn(
                Vec3::default(),
                "old".to_string(),
                vec![ItemStack {
                    item: WOOD,
                    quantity: 1,
                }],
                now,
            )
            .expect("old bag");
        let fresh = store
            .spawn(
                Vec3::default(),
                "fresh".to_string(),
                vec![ItemStack {
                    item: WOOD,
                    quantity: 1,
                }],
                now + LOOT_EXPIRY / 2,
            )
            .expect("fresh bag");
        let expired = store.expire_sweep(now + LOOT_EXPIRY);
        assert_eq!(expired, vec![old]);
        assert!(store.get(fresh).is_some());
    }
}
