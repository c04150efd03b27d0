//! Tracks which character archetypes are currently held by connected players.
//!
//! Claims are advisory: two players may hold the same archetype at once. The
//! tracker only answers which archetypes are in use, counting holders so that
//! an archetype stays in use until its last holder releases it.

use log::warn;
use shared::CharacterType;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct CharacterSlots {
    holders: HashMap<CharacterType, usize>,
}

impl CharacterSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new holder. Returns true when the archetype was already
    /// claimed by someone else.
    pub fn claim(&mut self, character: CharacterType) -> bool {
        let count = self.holders.entry(character).or_insert(0);
        *count += 1;
        *count > 1
    }

    /// Drops one holder. Releasing an unclaimed archetype is a no-op.
    pub fn release(&mut self, character: CharacterType) {
        match self.holders.get_mut(&character) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.holders.remove(&character);
            }
            None => warn!("Release of unclaimed character {}", character),
        }
    }

    pub fn is_in_use(&self, character: CharacterType) -> bool {
        self.holders.contains_key(&character)
    }

    pub fn holders(&self, character: CharacterType) -> usize {
        self.holders.get(&character).copied().unwrap_or(0)
    }

    /// In-use archetypes, each listed once, in declaration order.
    pub fn used(&self) -> Vec<CharacterType> {
        CharacterType::ALL
            .into_iter()
            .filter(|c| self.is_in_use(*c))
            .collect()
    }

    pub fn available(&self) -> Vec<CharacterType> {
        CharacterType::ALL
            .into_iter()
            .filter(|c| !self.is_in_use(*c))
            .collect()
    }
}
