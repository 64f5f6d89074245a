use log::info;
use serde::Deserialize;

use crate::config::NumberOrString;
use crate::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    User,
    System,
}

impl ProcessType {
    fn parse(input: &str) -> Self {
        match input.trim() {
            "System" => Self::System,
            _ => Self::User,
        }
    }
}

/// One process as the environment describes it. The engine itself only
/// consumes `id`, `size_bytes` and `stopped`; the rest travels through for
/// reporting.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub kind: ProcessType,
    pub has_priority: bool,
    pub stopped: bool,
}

impl ProcessDescriptor {
    /// Loads `processes.json` (a JSON array) into descriptors.
    pub fn list_from_json(text: &str) -> Result<Vec<ProcessDescriptor>, SimError> {
        let records: Vec<ProcessRecord> =
            serde_json::from_str(text).map_err(|e| SimError::MalformedDescriptor {
                details: e.to_string(),
            })?;

        let mut descriptors = Vec::with_capacity(records.len());
        for record in records {
            let size_gb = record.size_gb.as_u64("size_gb")?;
            descriptors.push(ProcessDescriptor {
                id: record.id,
                name: record.name,
                size_bytes: size_gb * 1024 * 1024 * 1024,
                kind: ProcessType::parse(&record.kind),
                has_priority: record.has_priority,
                stopped: record.is_process_stop,
            });
        }

        for descriptor in &descriptors {
            info!(
                "process {} ({}): {} bytes, {:?}, priority: {}, stopped: {}",
                descriptor.id,
                descriptor.name,
                descriptor.size_bytes,
                descriptor.kind,
                descriptor.has_priority,
                descriptor.stopped
            );
        }
        Ok(descriptors)
    }
}

/// Raw shape of one `processes.json` element. `virtual_address` is a hex
/// string some frontends attach; the core ignores it.
#[derive(Debug, Deserialize)]
struct ProcessRecord {
    id: String,
    name: String,
    size_gb: NumberOrString,
    #[serde(rename = "type")]
    kind: String,
    has_priority: bool,
    is_process_stop: bool,
    #[serde(default)]
    #[allow(unused)]
    virtual_address: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_list_parsing() {
        let text = r#"[
            {
                "id": "p1",
                "name": "editor",
                "size_gb": 2,
                "type": "User",
                "has_priority": false,
                "is_process_stop": false,
                "virtual_address": "0x1000"
            },
            {
                "id": "p2",
                "name": "daemon",
                "size_gb": "1",
                "type": "System",
                "has_priority": true,
                "is_process_stop": true
            }
        ]"#;

        let list = ProcessDescriptor::list_from_json(text).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "p1");
        assert_eq!(list[0].size_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(list[0].kind, ProcessType::User);
        assert!(!list[0].stopped);
        assert_eq!(list[1].kind, ProcessType::System);
        assert!(list[1].stopped);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let text = r#"[ { "id": "p1" } ]"#;
        assert!(ProcessDescriptor::list_from_json(text).is_err());
    }
}
