use std::collections::BTreeMap;

use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::access_pattern;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::modules::allocation::AllocationContext;
use crate::modules::frame_pool::{FrameId, FramePool, PoolKind};
use crate::modules::page_table::{PageTable, PageTableError};
use crate::modules::tlb::{Tlb, TLB_STATUS_ACTIVE};
use crate::process::ProcessDescriptor;
use crate::results::{
    PageFaultStats, PageTableReport, PidValue, ProcessSeries, RamSample, SimulationReport,
    SimulationResults, StepValue, TimeSeries, TlbStats,
};
use crate::util::div_ceil;

/// Steps of the synthetic access trace.
pub const SIMULATION_DURATION: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Active,
    Inactive,
    Deleted,
}

impl ProcessStatus {
    pub fn flag(&self) -> i32 {
        match self {
            ProcessStatus::Active => 1,
            ProcessStatus::Inactive => 0,
            ProcessStatus::Deleted => 2,
        }
    }
}

/// Everything the driver tracks per process: the table, the run counters
/// and the per-step sample buffers.
struct ProcessSlot {
    table: PageTable,
    top_level_frame: FrameId,
    status: ProcessStatus,
    last_executed_page: i64,
    hits: u64,
    misses: u64,
    hit_rate: f64,
    faults: u64,
    series_hits: Vec<StepValue<u64>>,
    series_misses: Vec<StepValue<u64>>,
    series_hit_rate: Vec<StepValue<f64>>,
    series_faults: Vec<StepValue<u64>>,
}

impl ProcessSlot {
    fn new(table: PageTable) -> Self {
        let top_level_frame = table.top_level_frame();
        Self {
            table,
            top_level_frame,
            status: ProcessStatus::Active,
            last_executed_page: 0,
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
            faults: 0,
            series_hits: Vec::new(),
            series_misses: Vec::new(),
            series_hit_rate: Vec::new(),
            series_faults: Vec::new(),
        }
    }

    fn clear_run_state(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.hit_rate = 0.0;
        self.faults = 0;
        self.series_hits.clear();
        self.series_misses.clear();
        self.series_hit_rate.clear();
        self.series_faults.clear();
    }

    fn update_hit_rate(&mut self) {
        let consultations = self.hits + self.misses;
        self.hit_rate = if consultations == 0 {
            0.0
        } else {
            self.hits as f64 / consultations as f64
        };
    }

    fn record_step(&mut self, step: u32) {
        self.series_hits.push(StepValue {
            step,
            value: self.hits,
        });
        self.series_misses.push(StepValue {
            step,
            value: self.misses,
        });
        self.series_hit_rate.push(StepValue {
            step,
            value: self.hit_rate,
        });
        self.series_faults.push(StepValue {
            step,
            value: self.faults,
        });
    }
}

/// The simulation driver.
///
/// Owns the three frame pools, the per-process page tables and the TLB;
/// everything mutates through its methods, single-threaded. A run is
/// `set_processes` followed by `simulate` and `export_results`; the state
/// survives between runs so descriptor changes reconcile against the
/// previous tables.
pub struct Simulator {
    config: SimConfig,
    processes: Vec<ProcessDescriptor>,
    data_pool: FramePool,
    table_pool: FramePool,
    swap_pool: FramePool,
    page_tables: BTreeMap<String, ProcessSlot>,
    tlb: Tlb,
    alloc_ctx: AllocationContext,
    rng: SmallRng,
    total_hits: u64,
    total_misses: u64,
    total_faults: u64,
    ram_series: Vec<RamSample>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let data_pool = FramePool::new(
            PoolKind::DataRam,
            config.table_frame_limit()..config.total_frames(),
        );
        let table_pool = FramePool::new(PoolKind::TableRam, 0..config.table_frame_limit());
        let swap_pool = FramePool::new(PoolKind::Swap, 0..config.swap_frames());
        let tlb = Tlb::new(config.tlb_capacity());
        let alloc_ctx = AllocationContext::new(config.table_frame_limit());
        let rng = SmallRng::seed_from_u64(config.rng_seed);

        Self {
            config,
            processes: Vec::new(),
            data_pool,
            table_pool,
            swap_pool,
            page_tables: BTreeMap::new(),
            tlb,
            alloc_ctx,
            rng,
            total_hits: 0,
            total_misses: 0,
            total_faults: 0,
            ram_series: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn set_processes(&mut self, processes: Vec<ProcessDescriptor>) {
        self.processes = processes;
    }

    pub fn data_pool(&self) -> &FramePool {
        &self.data_pool
    }

    pub fn table_pool(&self) -> &FramePool {
        &self.table_pool
    }

    pub fn swap_pool(&self) -> &FramePool {
        &self.swap_pool
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn page_table(&self, pid: &str) -> Option<&PageTable> {
        self.page_tables.get(pid).map(|slot| &slot.table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &PageTable> {
        self.page_tables.values().map(|slot| &slot.table)
    }

    /// Translation passthrough, 1-based page numbers.
    pub fn frame_number(&self, pid: &str, page_number: u64) -> Option<FrameId> {
        self.page_tables
            .get(pid)
            .and_then(|slot| slot.table.lookup(page_number))
    }

    fn pages_of(&self, descriptor: &ProcessDescriptor) -> u64 {
        div_ceil(descriptor.size_bytes, self.config.page_size_bytes)
    }

    /// Runs the full trace. Fatal configuration problems abort with an
    /// error; per-process problems skip the process and the run goes on.
    pub fn simulate(&mut self) -> Result<(), SimError> {
        self.rng = SmallRng::seed_from_u64(self.config.rng_seed);
        self.tlb.clear();
        self.total_hits = 0;
        self.total_misses = 0;
        self.total_faults = 0;
        self.ram_series.clear();
        for slot in self.page_tables.values_mut() {
            slot.clear_run_state();
        }

        self.reconcile_processes();

        // which active processes fit the address width
        let va_limit = self.config.virtual_address_width.va_limit();
        let page_size = self.config.page_size_bytes;
        let mut eligible: Vec<(String, u64, u64)> = Vec::new();
        for descriptor in self.processes.iter().filter(|d| !d.stopped) {
            let num_pages = self.pages_of(descriptor);
            let last_byte = num_pages as u128 * page_size as u128;
            if last_byte > va_limit + 1 {
                warn!(
                    "{}",
                    SimError::AddressWidthExceeded {
                        process_id: descriptor.id.clone(),
                        last_byte,
                        va_limit,
                    }
                );
                continue;
            }
            eligible.push((descriptor.id.clone(), num_pages, descriptor.size_bytes));
        }

        let required: u64 = eligible.iter().map(|(_, _, size)| *size).sum();
        let available = self.config.effective_ram_bytes() + self.config.swap_size_bytes();
        if required > available {
            return Err(SimError::CapacityExceeded {
                required_bytes: required,
                available_bytes: available,
            });
        }

        // canonical pool contents; only safe while nothing is claimed
        if self.page_tables.is_empty() {
            self.reset_pools();
        }

        let footprint: u64 = eligible
            .iter()
            .map(|(_, num_pages, _)| {
                PageTable::estimated_size_bytes(
                    *num_pages,
                    self.config.entries_per_table(),
                    self.config.entry_size(),
                )
            })
            .sum();
        let footprint_limit = self.config.ram_size_bytes / 100;
        if footprint > footprint_limit {
            return Err(SimError::TableFootprintExceeded {
                required_bytes: footprint,
                limit_bytes: footprint_limit,
            });
        }

        // bootstrap the tables that do not exist yet
        let frame_percent = (100.0 / eligible.len().max(1) as f64 - 2.0).max(1.0);
        let mut strategy = self.config.allocation_policy.strategy();
        for (pid, num_pages, _) in &eligible {
            if self.page_tables.contains_key(pid) {
                continue;
            }
            let mut table = PageTable::new(pid, *num_pages, &self.config, frame_percent);
            match table.allocate(
                strategy.as_mut(),
                &mut self.alloc_ctx,
                &mut self.data_pool,
                &mut self.table_pool,
                &mut self.swap_pool,
                &mut self.rng,
            ) {
                Ok(()) => {
                    self.page_tables.insert(pid.clone(), ProcessSlot::new(table));
                }
                Err(reason) => {
                    warn!(
                        "{}",
                        SimError::AllocationFailure {
                            process_id: pid.clone(),
                            details: reason.to_string(),
                        }
                    );
                    table.free_frames(&mut self.data_pool, &mut self.table_pool);
                    table.free_swap_frames(&mut self.swap_pool);
                }
            }
        }

        let traced: Vec<String> = eligible
            .iter()
            .map(|(pid, _, _)| pid.clone())
            .filter(|pid| {
                self.page_tables
                    .get(pid)
                    .map(|slot| slot.status == ProcessStatus::Active)
                    .unwrap_or(false)
            })
            .collect();
        info!(
            "simulating {} steps for {} processes ({})",
            SIMULATION_DURATION,
            traced.len(),
            self.config.allocation_policy.as_str()
        );

        for step in 0..SIMULATION_DURATION {
            for pid in &traced {
                self.step_process(pid);
            }
            for pid in &traced {
                if let Some(slot) = self.page_tables.get_mut(pid) {
                    slot.record_step(step);
                }
            }
            self.ram_series.push(RamSample {
                step,
                frames_used: self.config.total_frames() - self.data_pool.len() as u64,
            });
        }
        Ok(())
    }

    /// One process, one step: the coin flip, the page choice and the
    /// TLB, lookup and fault sequence, in that order.
    fn step_process(&mut self, pid: &str) {
        let slot = match self.page_tables.get_mut(pid) {
            Some(slot) => slot,
            None => return,
        };

        if self.rng.gen_bool(0.5) {
            return;
        }

        let max_page = slot.table.num_pages().saturating_sub(1);
        let page = access_pattern::next_page(
            slot.last_executed_page.max(0) as u64,
            max_page,
            &mut self.rng,
        );
        slot.last_executed_page = page as i64;
        let virtual_address = page * self.config.page_size_bytes;
        let is_write = self.rng.gen_bool(0.5);
        let page_number = page + 1;

        if self.config.tlb_enabled {
            if let Some(frame) = self.tlb.get_frame(pid, page_number) {
                slot.hits += 1;
                self.total_hits += 1;
                slot.update_hit_rate();
                debug!(
                    "process {}: {} {:#x} -> frame {} (tlb hit)",
                    pid,
                    if is_write { "write" } else { "read" },
                    virtual_address,
                    frame
                );
                return;
            }
        }

        let frame = match slot.table.lookup(page_number) {
            Some(frame) => Some(frame),
            None => {
                slot.faults += 1;
                self.total_faults += 1;
                match slot.table.handle_page_fault(
                    page_number,
                    &mut self.data_pool,
                    &mut self.swap_pool,
                    &mut self.rng,
                ) {
                    Ok(_) => slot.table.lookup(page_number),
                    Err(PageTableError::PoolsExhausted { page }) => {
                        warn!(
                            "{}",
                            SimError::FrameExhaustion {
                                process_id: pid.to_string(),
                                page_number: page,
                            }
                        );
                        None
                    }
                    Err(reason) => {
                        warn!("process {}: {}", pid, reason);
                        None
                    }
                }
            }
        };

        let frame = match frame {
            Some(frame) => frame,
            None => return,
        };
        debug!(
            "process {}: {} {:#x} -> frame {}",
            pid,
            if is_write { "write" } else { "read" },
            virtual_address,
            frame
        );

        if self.config.tlb_enabled {
            self.tlb.insert(
                pid,
                page_number,
                virtual_address,
                frame,
                TLB_STATUS_ACTIVE,
            );
            slot.misses += 1;
            self.total_misses += 1;
            slot.update_hit_rate();
        }
    }

    /// Reclaims every table whose process disappeared from the
    /// descriptors or was stopped: frames go back to their pools, the
    /// TLB forgets the process, the slot is dropped.
    fn reconcile_processes(&mut self) {
        let keep: Vec<String> = self
            .processes
            .iter()
            .filter(|descriptor| !descriptor.stopped)
            .map(|descriptor| descriptor.id.clone())
            .collect();

        let gone: Vec<String> = self
            .page_tables
            .keys()
            .filter(|pid| !keep.contains(*pid))
            .cloned()
            .collect();

        for pid in gone {
            if let Some(mut slot) = self.page_tables.remove(&pid) {
                slot.status = ProcessStatus::Deleted;
                debug!("process {}: reclaiming (now {:?})", pid, slot.status);
                slot.table
                    .free_frames(&mut self.data_pool, &mut self.table_pool);
                slot.table.free_swap_frames(&mut self.swap_pool);
                self.tlb.remove_process(&pid);
            }
        }
    }

    fn reset_pools(&mut self) {
        self.data_pool = FramePool::new(
            PoolKind::DataRam,
            self.config.table_frame_limit()..self.config.total_frames(),
        );
        self.table_pool = FramePool::new(PoolKind::TableRam, 0..self.config.table_frame_limit());
        self.swap_pool = FramePool::new(PoolKind::Swap, 0..self.config.swap_frames());
    }

    /// Forgets everything: tables, TLB, counters, placement state. The
    /// pools return to their canonical contents.
    pub fn reset(&mut self) {
        for (_, mut slot) in std::mem::take(&mut self.page_tables) {
            slot.table
                .free_frames(&mut self.data_pool, &mut self.table_pool);
            slot.table.free_swap_frames(&mut self.swap_pool);
        }
        self.reset_pools();
        self.tlb.clear();
        self.alloc_ctx.reset();
        self.total_hits = 0;
        self.total_misses = 0;
        self.total_faults = 0;
        self.ram_series.clear();
        self.rng = SmallRng::seed_from_u64(self.config.rng_seed);
    }

    /// Snapshots counters and tables into the result document. Processes
    /// appear in descriptor order.
    pub fn export_results(&self) -> SimulationResults {
        let mut tlb_stats = TlbStats {
            hits: Vec::new(),
            misses: Vec::new(),
            hit_rate: Vec::new(),
            total_hits: self.total_hits,
            total_misses: self.total_misses,
        };
        let mut page_faults = PageFaultStats {
            per_process: Vec::new(),
            total_faults: self.total_faults,
        };
        let mut time_series = TimeSeries {
            tlb_hits: Vec::new(),
            tlb_misses: Vec::new(),
            tlb_hit_rate: Vec::new(),
            page_faults: Vec::new(),
            ram_usage: self.ram_series.clone(),
        };
        let mut page_tables = Vec::new();

        for descriptor in &self.processes {
            let slot = match self.page_tables.get(&descriptor.id) {
                Some(slot) => slot,
                None => continue,
            };
            let pid = descriptor.id.clone();

            tlb_stats.hits.push(PidValue {
                pid: pid.clone(),
                value: slot.hits,
            });
            tlb_stats.misses.push(PidValue {
                pid: pid.clone(),
                value: slot.misses,
            });
            tlb_stats.hit_rate.push(PidValue {
                pid: pid.clone(),
                value: slot.hit_rate,
            });
            page_faults.per_process.push(PidValue {
                pid: pid.clone(),
                value: slot.faults,
            });

            time_series.tlb_hits.push(ProcessSeries {
                pid: pid.clone(),
                samples: slot.series_hits.clone(),
            });
            time_series.tlb_misses.push(ProcessSeries {
                pid: pid.clone(),
                samples: slot.series_misses.clone(),
            });
            time_series.tlb_hit_rate.push(ProcessSeries {
                pid: pid.clone(),
                samples: slot.series_hit_rate.clone(),
            });
            time_series.page_faults.push(ProcessSeries {
                pid: pid.clone(),
                samples: slot.series_faults.clone(),
            });

            if slot.status == ProcessStatus::Active {
                page_tables.push(PageTableReport {
                    process_id: pid,
                    base_address: slot.top_level_frame,
                    table: slot.table.export_table(),
                    flag: slot.status.flag(),
                    last_executed_page: slot.last_executed_page,
                });
            }
        }

        SimulationResults {
            tlb_stats,
            page_faults,
            time_series,
            page_tables,
        }
    }

    /// Convenience wrapper for the drivers: run and fold the outcome into
    /// the on-disk report shape.
    pub fn run(&mut self) -> SimulationReport {
        match self.simulate() {
            Ok(()) => SimulationReport::completed(self.export_results()),
            Err(reason) => SimulationReport::failed(reason),
        }
    }

    /// Renders every active table through `debug!`, one aligned row per
    /// page.
    pub fn log_page_tables(&self) {
        debug!("page tables for all active processes:");
        debug!(
            "| {:<12} | {:>12} | {:>18} | {:>18} | {:>8} |",
            "Process ID", "Page Number", "Virtual Address", "Physical Frame", "In RAM"
        );
        for (pid, slot) in &self.page_tables {
            if slot.status != ProcessStatus::Active {
                continue;
            }
            for row in slot.table.export_table() {
                debug!(
                    "| {:<12} | {:>12} | {:>18} | {:>18} | {:>8} |",
                    pid,
                    row.page_number,
                    row.virtual_address,
                    row.physical_frame,
                    if row.in_ram { 1 } else { 0 }
                );
            }
        }
    }
}
