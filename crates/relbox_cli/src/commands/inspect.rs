//! Inspect command implementation.

use relbox_store::{read_snapshot, EntityTypeId, Id, RelationId, Tables};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Records over all entity types.
    pub record_count: usize,
    /// Links over all standalone relations.
    pub link_count: usize,
    /// Per-type statistics (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityTypeStats>>,
    /// Per-relation link counts.
    pub relations: Vec<RelationStats>,
}

/// Statistics for a single entity type.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EntityTypeStats {
    /// Entity type id.
    pub id: EntityTypeId,
    /// Number of records.
    pub record_count: usize,
    /// Highest id handed out.
    pub last_id: Id,
    /// Total record size in bytes.
    pub data_size: usize,
}

/// Link count of a single standalone relation.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RelationStats {
    /// Relation id.
    pub id: RelationId,
    /// Number of links.
    pub link_count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_types: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot found at {}", path.display()).into());
    }

    let file_size = std::fs::metadata(path)?.len();
    let tables = read_snapshot(path)?;
    tracing::debug!(path = %path.display(), file_size, "snapshot loaded");

    let mut result = analyze(&tables, show_types);
    result.path = path.display().to_string();
    result.file_size = file_size;

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Summarizes loaded tables. Path and file size are left empty.
pub fn analyze(tables: &Tables, collect_types: bool) -> InspectResult {
    let entity_types: Vec<EntityTypeStats> = tables
        .entities
        .iter()
        .map(|(id, table)| EntityTypeStats {
            id: *id,
            record_count: table.rows.len(),
            last_id: table.last_id,
            data_size: table.rows.values().map(|data| data.len()).sum(),
        })
        .collect();

    let relations: Vec<RelationStats> = tables
        .links
        .iter()
        .map(|(id, links)| RelationStats {
            id: *id,
            link_count: links.len(),
        })
        .collect();

    InspectResult {
        path: String::new(),
        file_size: 0,
        record_count: entity_types.iter().map(|t| t.record_count).sum(),
        link_count: relations.iter().map(|r| r.link_count).sum(),
        entity_types: collect_types.then_some(entity_types),
        relations,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("relbox Snapshot Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Records: {}", result.record_count);
    println!("Links:   {}", result.link_count);

    if let Some(types) = &result.entity_types {
        println!();
        println!("Entity types:");
        for t in types {
            println!(
                "  [{}] {} records, last id {}, {}",
                t.id,
                t.record_count,
                t.last_id,
                format_size(t.data_size as u64)
            );
        }
    }

    if !result.relations.is_empty() {
        println!();
        println!("Relations:");
        for r in &result.relations {
            println!("  [{}] {} links", r.id, r.link_count);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use relbox_store::EntityTable;

    fn tables() -> Tables {
        let mut tables = Tables::default();
        let mut authors = EntityTable {
            last_id: 3,
            ..Default::default()
        };
        authors.rows.insert(1, Bytes::from_static(&[0; 12]));
        authors.rows.insert(3, Bytes::from_static(&[0; 20]));
        tables.entities.insert(1, authors);
        tables.links.entry(7).or_default().extend([(1, 2), (1, 3), (3, 2)]);
        tables
    }

    #[test]
    fn analyze_counts_records_and_links() {
        let result = analyze(&tables(), true);
        assert_eq!(result.record_count, 2);
        assert_eq!(result.link_count, 3);
        assert_eq!(
            result.entity_types.unwrap(),
            vec![EntityTypeStats {
                id: 1,
                record_count: 2,
                last_id: 3,
                data_size: 32,
            }]
        );
        assert_eq!(result.relations, vec![RelationStats { id: 7, link_count: 3 }]);
    }

    #[test]
    fn per_type_details_are_optional() {
        let result = analyze(&tables(), false);
        assert!(result.entity_types.is_none());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("entity_types").is_none());
        assert_eq!(json["record_count"], 2);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
