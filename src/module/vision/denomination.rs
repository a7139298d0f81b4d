//! Rupiah banknote classes
//!

use serde::Serialize;

/// Banknote classes in the model's output order.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Denomination {
    Seribu,
    DuaRibu,
    LimaRibu,
    SepuluhRibu,
    DuaPuluhRibu,
    LimaPuluhRibu,
    SeratusRibu,
}

/// All classes, indexed by model output position.
pub const DENOMINATIONS: [Denomination; 7] = [
    Denomination::Seribu,
    Denomination::DuaRibu,
    Denomination::LimaRibu,
    Denomination::SepuluhRibu,
    Denomination::DuaPuluhRibu,
    Denomination::LimaPuluhRibu,
    Denomination::SeratusRibu,
];

/// Denomination methods
///
impl Denomination {
    pub fn from_index(i: usize) -> Option<Denomination> {
        DENOMINATIONS.get(i).copied()
    }
    pub fn to_index(&self) -> usize {
        match self {
            Denomination::Seribu => 0,
            Denomination::DuaRibu => 1,
            Denomination::LimaRibu => 2,
            Denomination::SepuluhRibu => 3,
            Denomination::DuaPuluhRibu => 4,
            Denomination::LimaPuluhRibu => 5,
            Denomination::SeratusRibu => 6,
        }
    }
    /// Display string announced to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Denomination::Seribu => "Seribu Rupiah",
            Denomination::DuaRibu => "Dua Ribu Rupiah",
            Denomination::LimaRibu => "Lima Ribu Rupiah",
            Denomination::SepuluhRibu => "Sepuluh Ribu Rupiah",
            Denomination::DuaPuluhRibu => "Dua Puluh Ribu Rupiah",
            Denomination::LimaPuluhRibu => "Lima Puluh Ribu Rupiah",
            Denomination::SeratusRibu => "Seratus Ribu Rupiah",
        }
    }
    /// Face value in rupiah.
    pub fn value(&self) -> u32 {
        match self {
            Denomination::Seribu => 1_000,
            Denomination::DuaRibu => 2_000,
            Denomination::LimaRibu => 5_000,
            Denomination::SepuluhRibu => 10_000,
            Denomination::DuaPuluhRibu => 20_000,
            Denomination::LimaPuluhRibu => 50_000,
            Denomination::SeratusRibu => 100_000,
        }
    }
    /// Reverse lookup by face value.
    pub fn from_value(value: u32) -> Option<Denomination> {
        DENOMINATIONS.iter().copied().find(|d| d.value() == value)
    }
}
