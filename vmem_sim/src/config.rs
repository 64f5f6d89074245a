use serde::Deserialize;

use crate::error::SimError;
use crate::modules::allocation::{
    AllocationStrategyModule, BestFitStrategy, ContiguousPlacement, FirstFitStrategy,
    NextFitStrategy, QuickFitStrategy, WorstFitStrategy,
};
use crate::util::{div_ceil, parse_byte_size};

/// Fallback seed when the environment document does not carry `rng_seed`.
/// Keeping it fixed makes repeated runs of the same setup comparable.
pub const DEFAULT_RNG_SEED: u64 = 0x5eed_0f_f1ce;

/// Width of the simulated virtual address space. The width fixes the page
/// table entry size and therefore the fan-out of every table level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualAddressWidth {
    Bits16,
    Bits32,
    Bits64,
}

impl VirtualAddressWidth {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "16-bit" => Some(Self::Bits16),
            "32-bit" => Some(Self::Bits32),
            "64-bit" => Some(Self::Bits64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bits16 => "16-bit",
            Self::Bits32 => "32-bit",
            Self::Bits64 => "64-bit",
        }
    }

    /// Size of one page table entry in bytes.
    pub fn entry_size(&self) -> u64 {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Highest representable virtual address.
    pub fn va_limit(&self) -> u128 {
        match self {
            Self::Bits16 => u16::MAX as u128,
            Self::Bits32 => u32::MAX as u128,
            Self::Bits64 => u64::MAX as u128,
        }
    }

    /// Hex digits used when exporting virtual addresses.
    pub fn hex_digits(&self) -> usize {
        match self {
            Self::Bits16 => 4,
            Self::Bits32 => 8,
            Self::Bits64 => 16,
        }
    }
}

/// Physical memory placement policy for data pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    FirstFit,
    NextFit,
    BestFit,
    WorstFit,
    QuickFit,
    Contiguous,
}

impl AllocationPolicy {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "First Fit" => Some(Self::FirstFit),
            "Next Fit" => Some(Self::NextFit),
            "Best Fit" => Some(Self::BestFit),
            "Worst Fit" => Some(Self::WorstFit),
            "Quick Fit" => Some(Self::QuickFit),
            "Contiguous" => Some(Self::Contiguous),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstFit => "First Fit",
            Self::NextFit => "Next Fit",
            Self::BestFit => "Best Fit",
            Self::WorstFit => "Worst Fit",
            Self::QuickFit => "Quick Fit",
            Self::Contiguous => "Contiguous",
        }
    }

    /// Instantiates the strategy implementing this policy.
    pub fn strategy(&self) -> Box<dyn AllocationStrategyModule> {
        match self {
            Self::FirstFit => Box::new(FirstFitStrategy),
            Self::NextFit => Box::new(NextFitStrategy),
            Self::BestFit => Box::new(BestFitStrategy),
            Self::WorstFit => Box::new(WorstFitStrategy),
            Self::QuickFit => Box::new(QuickFitStrategy::new()),
            Self::Contiguous => Box::new(ContiguousPlacement),
        }
    }
}

/// Resolved simulator configuration. All sizes are in bytes; everything
/// else is derived on demand so the config stays a plain value type.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub ram_size_bytes: u64,
    pub page_size_bytes: u64,
    pub tlb_size_bytes: u64,
    pub tlb_enabled: bool,
    pub virtual_address_width: VirtualAddressWidth,
    pub rom_size_bytes: u64,
    pub swap_percent: u32,
    pub allocation_policy: AllocationPolicy,
    pub rng_seed: u64,
}

impl SimConfig {
    pub fn total_frames(&self) -> u64 {
        self.ram_size_bytes / self.page_size_bytes
    }

    /// Frames reserved for page table nodes, roughly 1% of RAM.
    pub fn table_frame_limit(&self) -> u64 {
        div_ceil(self.total_frames(), 100)
    }

    pub fn data_frames(&self) -> u64 {
        self.total_frames() - self.table_frame_limit()
    }

    pub fn swap_frames(&self) -> u64 {
        (self.rom_size_bytes * self.swap_percent as u64 / 100) / self.page_size_bytes
    }

    pub fn swap_size_bytes(&self) -> u64 {
        self.swap_frames() * self.page_size_bytes
    }

    pub fn entry_size(&self) -> u64 {
        self.virtual_address_width.entry_size()
    }

    pub fn entries_per_table(&self) -> u64 {
        self.page_size_bytes / self.entry_size()
    }

    /// RAM usable for data and table frames after the bookkeeping cut.
    pub fn effective_ram_bytes(&self) -> u64 {
        (self.ram_size_bytes as f64 * 0.99) as u64
    }

    /// Number of TLB slots. A disabled TLB has capacity 0, which turns
    /// every insert into a no-op.
    pub fn tlb_capacity(&self) -> usize {
        if !self.tlb_enabled {
            return 0;
        }
        ((self.tlb_size_bytes / self.entry_size()).max(1)) as usize
    }

    /// Loads the environment document from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        let descriptor: EnvironmentDescriptor =
            serde_json::from_str(text).map_err(|e| SimError::MalformedDescriptor {
                details: e.to_string(),
            })?;
        Self::from_descriptor(&descriptor)
    }

    pub fn from_descriptor(descriptor: &EnvironmentDescriptor) -> Result<Self, SimError> {
        let ram_size_gb = descriptor.ram_size_gb.as_u64("ram_size_gb")?;
        let page_size_kb = descriptor.page_size_kb.as_u64("page_size_kb")?;
        let tlb_size = descriptor.tlb_size.as_u64("tlb_size")?;

        let ram_size_bytes = ram_size_gb * 1024 * 1024 * 1024;
        let page_size_bytes = page_size_kb * 1024;
        if ram_size_bytes == 0 {
            return Err(malformed("ram_size_gb must be positive"));
        }
        if page_size_bytes == 0 || !page_size_bytes.is_power_of_two() {
            return Err(malformed("page_size_kb must be a positive power of two"));
        }

        let virtual_address_width = VirtualAddressWidth::parse(&descriptor.virtual_address_size)
            .ok_or_else(|| {
                malformed(&format!(
                    "unknown virtual_address_size {:?}",
                    descriptor.virtual_address_size
                ))
            })?;
        let allocation_policy =
            AllocationPolicy::parse(&descriptor.allocation_type).ok_or_else(|| {
                malformed(&format!(
                    "unknown allocation_type {:?}",
                    descriptor.allocation_type
                ))
            })?;

        let rom_size_bytes = parse_byte_size(&descriptor.rom_size)
            .ok_or_else(|| malformed(&format!("unreadable rom_size {:?}", descriptor.rom_size)))?;
        if rom_size_bytes == 0 {
            return Err(malformed("rom_size must be positive"));
        }
        if descriptor.swap_percent > 100 {
            return Err(malformed("swap_percent must lie in [0, 100]"));
        }
        if page_size_bytes <= virtual_address_width.entry_size() {
            return Err(malformed("page size must exceed the entry size"));
        }

        Ok(SimConfig {
            ram_size_bytes,
            page_size_bytes,
            tlb_size_bytes: tlb_size,
            tlb_enabled: descriptor.tlb_enabled,
            virtual_address_width,
            rom_size_bytes,
            swap_percent: descriptor.swap_percent,
            allocation_policy,
            rng_seed: descriptor.rng_seed.unwrap_or(DEFAULT_RNG_SEED),
        })
    }
}

fn malformed(details: &str) -> SimError {
    SimError::MalformedDescriptor {
        details: details.to_string(),
    }
}

/// Raw shape of `environment.json`. Unknown fields are ignored, missing
/// required fields fail the load. The numeric fields historically arrive
/// as strings from some frontends, so both encodings are accepted.
#[derive(Debug, Deserialize)]
pub struct EnvironmentDescriptor {
    pub ram_size_gb: NumberOrString,
    pub page_size_kb: NumberOrString,
    pub tlb_size: NumberOrString,
    pub tlb_enabled: bool,
    pub virtual_address_size: String,
    pub rom_size: String,
    pub swap_percent: u32,
    pub allocation_type: String,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    pub fn as_u64(&self, field: &str) -> Result<u64, SimError> {
        match self {
            NumberOrString::Number(value) => Ok(*value),
            NumberOrString::Text(text) => text.trim().parse().map_err(|_| {
                malformed(&format!("field {} holds a non-numeric string", field))
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_config() -> SimConfig {
        SimConfig {
            ram_size_bytes: 1024 * 1024 * 1024,
            page_size_bytes: 4096,
            tlb_size_bytes: 64,
            tlb_enabled: true,
            virtual_address_width: VirtualAddressWidth::Bits32,
            rom_size_bytes: 32 * 1024 * 1024 * 1024,
            swap_percent: 50,
            allocation_policy: AllocationPolicy::FirstFit,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }

    #[test]
    fn test_derived_quantities() {
        let config = base_config();
        assert_eq!(config.total_frames(), 262144);
        assert_eq!(config.table_frame_limit(), 2622);
        assert_eq!(config.data_frames(), 262144 - 2622);
        assert_eq!(config.entries_per_table(), 1024);
        assert_eq!(config.swap_frames(), 4 * 1024 * 1024);
        assert_eq!(config.tlb_capacity(), 16);
    }

    #[test]
    fn test_tlb_capacity_disabled_and_minimum() {
        let mut config = base_config();
        config.tlb_enabled = false;
        assert_eq!(config.tlb_capacity(), 0);

        config.tlb_enabled = true;
        config.tlb_size_bytes = 1; // below one entry, clamped up
        assert_eq!(config.tlb_capacity(), 1);
    }

    #[test]
    fn test_environment_document_round_trip() {
        let text = r#"{
            "ram_size_gb": "1",
            "page_size_kb": 4,
            "tlb_size": "64",
            "tlb_enabled": true,
            "virtual_address_size": "32-bit",
            "rom_size": "32 GB",
            "swap_percent": 50,
            "allocation_type": "Best Fit",
            "ignored_by_the_core": 7
        }"#;
        let config = SimConfig::from_json(text).unwrap();
        assert_eq!(config.ram_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.page_size_bytes, 4096);
        assert_eq!(config.allocation_policy, AllocationPolicy::BestFit);
        assert_eq!(config.virtual_address_width, VirtualAddressWidth::Bits32);
        assert_eq!(config.rng_seed, DEFAULT_RNG_SEED);
    }

    #[test]
    fn test_missing_field_fails_the_load() {
        let text = r#"{ "ram_size_gb": 1 }"#;
        match SimConfig::from_json(text) {
            Err(SimError::MalformedDescriptor { .. }) => {}
            other => panic!("expected a malformed descriptor error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_out_of_range_swap_percent() {
        let text = r#"{
            "ram_size_gb": 1,
            "page_size_kb": 4,
            "tlb_size": 64,
            "tlb_enabled": false,
            "virtual_address_size": "32-bit",
            "rom_size": "32 GB",
            "swap_percent": 101,
            "allocation_type": "First Fit"
        }"#;
        assert!(SimConfig::from_json(text).is_err());
    }
}
