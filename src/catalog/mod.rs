pub mod items;
pub mod loadout;
pub mod recipes;
