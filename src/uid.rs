use uuid::Uuid;
use web_time::{SystemTime, UNIX_EPOCH};

/// Source of unique DICOM identifiers for one conversion run.
///
/// The orchestrator allocates one series UID per run and one instance UID per
/// slice. Implementations must be safe to call from multiple worker threads
/// and must never hand out the same instance UID twice within a process.
/// Tests can inject a deterministic implementation.
pub trait UidAllocator: Send + Sync {
    fn new_series_uid(&self) -> String;
    fn new_instance_uid(&self) -> String;
}

// Suffix arc under the freely registrable 1.2.826.0.1 tree.
const UID_ROOT: &str = "1.2.826.0.1.3680043.10.1543";

/// Default allocator: `<root>.<epoch millis>.<random 64-bit component>`.
///
/// The timestamp separates processes started at different times, the random
/// component separates calls within a process, keeping the whole UID inside
/// the 64-character limit of the UI value representation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UidGenerator;

impl UidGenerator {
    pub fn new() -> Self {
        Self
    }

    fn generate(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let random = Uuid::new_v4().as_u128() as u64;
        format!("{UID_ROOT}.{millis}.{random}")
    }
}

impl UidAllocator for UidGenerator {
    fn new_series_uid(&self) -> String {
        self.generate()
    }

    fn new_instance_uid(&self) -> String {
        self.generate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn uids_fit_the_ui_value_representation() {
        let uid = UidGenerator::new().new_instance_uid();
        assert!(uid.len() <= 64, "{uid} exceeds 64 characters");
        assert!(uid.chars().all(|c| c.is_ascii_digit() || c == '.'));
        assert!(uid.starts_with(UID_ROOT));
    }

    #[test]
    fn instance_uids_do_not_repeat() {
        let generator = UidGenerator::new();
        let uids: HashSet<_> = (0..1000).map(|_| generator.new_instance_uid()).collect();
        assert_eq!(uids.len(), 1000);
    }
}
