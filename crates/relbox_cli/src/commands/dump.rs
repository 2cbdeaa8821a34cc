//! Dump command implementation.
//!
//! Records carry no type information, so each present field is printed as
//! its raw inline bytes plus the integer reading of its width.

use relbox_codec::{FlatBufferReader, PropertyId, RawField};
use relbox_store::{read_snapshot, EntityTypeId, Id, Tables};
use serde::Serialize;
use std::path::Path;

/// One dumped record.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Record id.
    pub id: Id,
    /// Record size in bytes.
    pub size: usize,
    /// Present fields in slot order.
    pub fields: Vec<DumpedField>,
}

/// One present field of a record.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DumpedField {
    /// Property id.
    pub property_id: PropertyId,
    /// Vtable slot.
    pub slot: u16,
    /// Inline bytes as lowercase hex.
    pub hex: String,
    /// Little-endian integer value for 1, 2, 4 and 8 byte fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

impl From<RawField<'_>> for DumpedField {
    fn from(field: RawField<'_>) -> Self {
        let value = match field.bytes.len() {
            1 | 2 | 4 | 8 => {
                let mut le = [0u8; 8];
                le[..field.bytes.len()].copy_from_slice(field.bytes);
                Some(u64::from_le_bytes(le))
            }
            _ => None,
        };
        Self {
            property_id: field.property_id,
            slot: field.slot,
            hex: field.bytes.iter().map(|b| format!("{b:02x}")).collect(),
            value,
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    entity_type: EntityTypeId,
    id: Option<Id>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let tables = read_snapshot(path)?;
    let records = dump_records(&tables, entity_type, id, limit)?;
    tracing::debug!(entity_type, records = records.len(), "records decoded");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(entity_type, &records),
    }

    Ok(())
}

/// Decodes the records of one entity type.
///
/// With `id` set only that record is returned, and it is an error if it
/// does not exist.
pub fn dump_records(
    tables: &Tables,
    entity_type: EntityTypeId,
    id: Option<Id>,
    limit: Option<usize>,
) -> Result<Vec<DumpedRecord>, Box<dyn std::error::Error>> {
    let table = tables
        .entities
        .get(&entity_type)
        .ok_or_else(|| format!("No records of entity type {entity_type}"))?;

    let rows: Vec<_> = match id {
        Some(id) => {
            let data = table
                .rows
                .get(&id)
                .ok_or_else(|| format!("No record {entity_type}/{id}"))?;
            vec![(id, data)]
        }
        None => table
            .rows
            .iter()
            .map(|(id, data)| (*id, data))
            .take(limit.unwrap_or(usize::MAX))
            .collect(),
    };

    rows.into_iter()
        .map(|(id, data)| {
            let reader = FlatBufferReader::new(data)?;
            Ok(DumpedRecord {
                id,
                size: data.len(),
                fields: reader.fields()?.into_iter().map(DumpedField::from).collect(),
            })
        })
        .collect()
}

fn print_text_output(entity_type: EntityTypeId, records: &[DumpedRecord]) {
    println!("Entity type {entity_type}: {} record(s)", records.len());
    for record in records {
        println!();
        println!("#{} ({} bytes)", record.id, record.size);
        for field in &record.fields {
            match field.value {
                Some(value) => println!(
                    "  property {:>3} (slot {:>3}): {} = {}",
                    field.property_id, field.slot, field.hex, value
                ),
                None => println!(
                    "  property {:>3} (slot {:>3}): {}",
                    field.property_id, field.slot, field.hex
                ),
            }
        }
    }
}
