use serde::Serialize;

use crate::modules::frame_pool::FrameId;
use crate::modules::page_table::PageMapping;

/// One per-process summary value.
#[derive(Debug, Clone, Serialize)]
pub struct PidValue<T: Serialize> {
    pub pid: String,
    pub value: T,
}

/// One time-series sample.
#[derive(Debug, Clone, Serialize)]
pub struct StepValue<T: Serialize> {
    pub step: u32,
    pub value: T,
}

/// The samples of one process over the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSeries<T: Serialize> {
    pub pid: String,
    pub samples: Vec<StepValue<T>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TlbStats {
    pub hits: Vec<PidValue<u64>>,
    pub misses: Vec<PidValue<u64>>,
    pub hit_rate: Vec<PidValue<f64>>,
    pub total_hits: u64,
    pub total_misses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFaultStats {
    pub per_process: Vec<PidValue<u64>>,
    pub total_faults: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RamSample {
    pub step: u32,
    pub frames_used: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeSeries {
    pub tlb_hits: Vec<ProcessSeries<u64>>,
    pub tlb_misses: Vec<ProcessSeries<u64>>,
    pub tlb_hit_rate: Vec<ProcessSeries<f64>>,
    pub page_faults: Vec<ProcessSeries<u64>>,
    pub ram_usage: Vec<RamSample>,
}

/// Exported state of one process's page table.
#[derive(Debug, Clone, Serialize)]
pub struct PageTableReport {
    pub process_id: String,
    /// Frame of the root node, the process's table base address.
    pub base_address: FrameId,
    pub table: Vec<PageMapping>,
    pub flag: i32,
    pub last_executed_page: i64,
}

/// The full result document of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResults {
    pub tlb_stats: TlbStats,
    pub page_faults: PageFaultStats,
    pub time_series: TimeSeries,
    pub page_tables: Vec<PageTableReport>,
}

/// What gets written to disk: the results, a capacity-style error, or the
/// watchdog verdict.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SimulationReport {
    Completed(Box<SimulationResults>),
    Failed { error: String },
    TimedOut { status: String },
}

impl SimulationReport {
    pub fn completed(results: SimulationResults) -> Self {
        SimulationReport::Completed(Box::new(results))
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        SimulationReport::Failed {
            error: error.to_string(),
        }
    }

    pub fn timed_out() -> Self {
        SimulationReport::TimedOut {
            status: "timeout".to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_report_serializes_to_a_single_field() {
        let report = SimulationReport::failed("too much memory requested");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "error": "too much memory requested" })
        );
    }

    #[test]
    fn test_timeout_report_shape() {
        let json = serde_json::to_value(SimulationReport::timed_out()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "timeout" }));
    }
}
