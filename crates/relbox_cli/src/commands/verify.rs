//! Verify command implementation.

use relbox_codec::FlatBufferReader;
use relbox_store::{read_snapshot, Tables};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt records.
    pub corrupt_records: usize,
    /// Number of links checked.
    pub links_checked: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            records_checked: 0,
            valid_records: 0,
            corrupt_records: 0,
            links_checked: 0,
            errors: Vec::new(),
        }
    }

    /// Returns true if nothing was flagged.
    pub fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying snapshot at {}", path.display());
    println!();

    let tables = read_snapshot(path)?;
    let result = verify_tables(&tables);
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Snapshot verification passed");
        Ok(())
    } else {
        println!("✗ Snapshot verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every record and link of `tables`.
pub fn verify_tables(tables: &Tables) -> VerifyResult {
    let mut result = VerifyResult::new();

    for (entity_type, table) in &tables.entities {
        for (id, data) in &table.rows {
            result.records_checked += 1;

            if *id == 0 || *id > table.last_id {
                result.errors.push(format!(
                    "Record {entity_type}/{id} outside the id sequence (last id {})",
                    table.last_id
                ));
            }

            match FlatBufferReader::new(data).and_then(|reader| reader.fields()) {
                Ok(_) => result.valid_records += 1,
                Err(e) => {
                    result
                        .errors
                        .push(format!("Malformed record {entity_type}/{id}: {e}"));
                    result.corrupt_records += 1;
                }
            }
        }
    }

    for (relation, links) in &tables.links {
        for &(source, target) in links {
            result.links_checked += 1;
            if source == 0 || target == 0 {
                result.errors.push(format!(
                    "Link {source} -> {target} in relation {relation} uses id 0"
                ));
            }
        }
    }

    result
}

fn print_result(result: &VerifyResult) {
    println!(
        "  Records checked: {}, valid: {}, corrupt: {}",
        result.records_checked, result.valid_records, result.corrupt_records
    );
    println!("  Links checked: {}", result.links_checked);
    for error in &result.errors {
        println!("    ERROR: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use relbox_codec::{property_slot, FlatBufferBuilder};
    use relbox_store::EntityTable;

    fn record(id: u64) -> Bytes {
        let mut builder = FlatBufferBuilder::new();
        builder.collect(id, property_slot(1)).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn well_formed_tables_pass() {
        let mut tables = Tables::default();
        let mut table = EntityTable {
            last_id: 2,
            ..Default::default()
        };
        table.rows.insert(1, record(1));
        table.rows.insert(2, record(2));
        tables.entities.insert(1, table);
        tables.links.entry(1).or_default().insert((1, 2));

        let result = verify_tables(&tables);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.valid_records, 2);
        assert_eq!(result.links_checked, 1);
    }

    #[test]
    fn broken_records_and_links_are_reported() {
        let mut tables = Tables::default();
        let mut table = EntityTable {
            last_id: 1,
            ..Default::default()
        };
        table.rows.insert(1, Bytes::from_static(&[0xFF; 3]));
        table.rows.insert(5, record(5));
        tables.entities.insert(4, table);
        tables.links.entry(2).or_default().insert((0, 9));

        let result = verify_tables(&tables);
        assert!(!result.is_ok());
        assert_eq!(result.corrupt_records, 1);
        assert_eq!(result.valid_records, 1);
        assert_eq!(result.errors.len(), 3);
    }
}
