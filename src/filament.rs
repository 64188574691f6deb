//! Filament catalog and AMS slot assignment.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::HttpClient;

pub const AMS_SLOTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filament {
    pub id: String,
    pub name: String,
    pub material: String,
    /// `#rrggbb`.
    #[serde(alias = "color")]
    pub color_hex: String,
    #[serde(default)]
    pub price_per_gram: f64,
    #[serde(default = "in_stock_default")]
    pub in_stock: bool,
}

fn in_stock_default() -> bool {
    true
}

impl Filament {
    pub fn rgb(&self) -> Option<[u8; 3]> {
        parse_hex_color(&self.color_hex)
    }
}

pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

pub async fn list_filaments(client: &HttpClient) -> Result<Vec<Filament>, ApiError> {
    client.get_json("/filaments").await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("AMS slot {0} does not exist; slots are numbered 1 to 4")]
pub struct InvalidSlot(pub u8);

/// Four filament positions, numbered 1..=4.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmsSlots {
    slots: [Option<String>; AMS_SLOTS],
}

/// What the UI shows for one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotDisplay {
    Empty { slot: u8 },
    Loaded { slot: u8, filament: Filament },
    /// The id is not in the fetched catalog (retired or not loaded yet).
    Unknown { slot: u8, filament_id: String },
}

impl AmsSlots {
    fn index(slot: u8) -> Result<usize, InvalidSlot> {
        match slot {
            1..=4 => Ok(usize::from(slot - 1)),
            _ => Err(InvalidSlot(slot)),
        }
    }

    pub fn get(&self, slot: u8) -> Result<Option<&str>, InvalidSlot> {
        Ok(self.slots[Self::index(slot)?].as_deref())
    }

    pub fn assign(&mut self, slot: u8, filament_id: Option<String>) -> Result<(), InvalidSlot> {
        self.slots[Self::index(slot)?] = filament_id;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Ids in slot order, skipping empty slots.
    pub fn assigned(&self) -> impl Iterator<Item = (u8, &str)> {
        self.slots
            .iter()
            .zip(1u8..)
            .filter_map(|(id, slot)| id.as_deref().map(|id| (slot, id)))
    }

    pub fn resolve(&self, catalog: &[Filament]) -> Vec<SlotDisplay> {
        self.slots
            .iter()
            .zip(1u8..)
            .map(|(id, slot)| match id {
                None => SlotDisplay::Empty { slot },
                Some(id) => match catalog.iter().find(|f| &f.id == id) {
                    Some(f) => SlotDisplay::Loaded {
                        slot,
                        filament: f.clone(),
                    },
                    None => SlotDisplay::Unknown {
                        slot,
                        filament_id: id.clone(),
                    },
                },
            })
            .collect()
    }
}
