//! Serializable status reports for the store and its previews.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Point-in-time view of the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub instance_count: usize,
    pub max_instances: usize,
    pub total_memory_bytes: usize,
    pub per_instance_memory_cap: usize,
    /// Most recently used first.
    pub instances: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub project_name: String,
    #[serde(rename = "age_ms", serialize_with = "as_millis")]
    pub age: Duration,
    #[serde(rename = "idle_ms", serialize_with = "as_millis")]
    pub idle_time: Duration,
    pub memory_usage: usize,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_durations_as_millis() {
        let status = ManagerStatus {
            instance_count: 1,
            max_instances: 3,
            total_memory_bytes: 4,
            per_instance_memory_cap: 10,
            instances: vec![InstanceStatus {
                id: "p1".to_string(),
                project_name: "Proj".to_string(),
                age: Duration::from_millis(1500),
                idle_time: Duration::from_millis(250),
                memory_usage: 4,
            }],
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["instances"][0]["age_ms"], 1500);
        assert_eq!(value["instances"][0]["idle_ms"], 250);
        assert_eq!(value["instance_count"], 1);
    }
}
