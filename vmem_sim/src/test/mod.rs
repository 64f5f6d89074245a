use crate::config::{AllocationPolicy, SimConfig, VirtualAddressWidth, DEFAULT_RNG_SEED};
use crate::modules::page_table::Claim;
use crate::process::{ProcessDescriptor, ProcessType};
use crate::simulator::Simulator;


pub(crate) const GIB: u64 = 1024 * 1024 * 1024;
pub(crate) const MIB: u64 = 1024 * 1024;

/// 1 GiB RAM, 4 KiB pages, 32-bit addresses; the literal setup most of
/// the scenarios run on.
pub(crate) fn gib_config(policy: AllocationPolicy) -> SimConfig {
    SimConfig {
        ram_size_bytes: GIB,
        page_size_bytes: 4096,
        tlb_size_bytes: 64,
        tlb_enabled: false,
        virtual_address_width: VirtualAddressWidth::Bits32,
        rom_size_bytes: 32 * GIB,
        swap_percent: 0,
        allocation_policy: policy,
        rng_seed: DEFAULT_RNG_SEED,
    }
}

pub(crate) fn process(id: &str, size_bytes: u64) -> ProcessDescriptor {
    ProcessDescriptor {
        id: id.to_string(),
        name: format!("{}-proc", id),
        size_bytes,
        kind: ProcessType::User,
        has_priority: false,
        stopped: false,
    }
}

/// Frame conservation across pools and claims: nothing leaks, nothing is
/// counted twice.
pub(crate) fn assert_conservation(sim: &Simulator) {
    let config = sim.config();

    let claimed_ram: u64 = sim.tables().map(|table| table.ram_claims().len() as u64).sum();
    assert_eq!(
        sim.data_pool().len() as u64 + sim.table_pool().len() as u64 + claimed_ram,
        config.total_frames(),
        "RAM frames leaked or doubled"
    );

    let claimed_swap: u64 = sim
        .tables()
        .map(|table| table.swap_claims().len() as u64)
        .sum();
    assert_eq!(
        sim.swap_pool().len() as u64 + claimed_swap,
        config.swap_frames(),
        "swap frames leaked or doubled"
    );

    // claims are disjoint from their pools
    for table in sim.tables() {
        for (&frame, claim) in table.ram_claims() {
            match claim {
                Claim::Table { .. } => assert!(!sim.table_pool().contains(frame)),
                _ => assert!(!sim.data_pool().contains(frame)),
            }
        }
        for &frame in table.swap_claims().keys() {
            assert!(!sim.swap_pool().contains(frame));
        }
    }
}
