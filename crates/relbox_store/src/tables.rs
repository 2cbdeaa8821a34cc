//! Plain table state shared by the memory backend and snapshot files.

use crate::backend::{EntityTypeId, Id, RelationId};
use crate::error::StoreResult;
use bytes::Bytes;
use relbox_codec::FlatBufferReader;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Records of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTable {
    /// Highest id ever handed out or stored. Never decreases across
    /// commits; an aborted write leaves the committed value as it was.
    pub last_id: Id,
    /// Finished flat tables by id.
    pub rows: BTreeMap<Id, Bytes>,
}

/// All records and links of a store at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tables {
    /// Record tables by entity type.
    pub entities: BTreeMap<EntityTypeId, EntityTable>,
    /// Standalone relation links as `(source, target)` pairs.
    pub links: BTreeMap<RelationId, BTreeSet<(Id, Id)>>,
}

impl Tables {
    pub(crate) fn next_id(&mut self, entity_type: EntityTypeId, id: Id) -> Id {
        let table = self.entities.entry(entity_type).or_default();
        if id == 0 {
            table.last_id += 1;
            table.last_id
        } else {
            table.last_id = table.last_id.max(id);
            id
        }
    }

    pub(crate) fn put(&mut self, entity_type: EntityTypeId, id: Id, data: Bytes) {
        let table = self.entities.entry(entity_type).or_default();
        table.last_id = table.last_id.max(id);
        table.rows.insert(id, data);
    }

    pub(crate) fn get(&self, entity_type: EntityTypeId, id: Id) -> Option<Bytes> {
        self.entities
            .get(&entity_type)
            .and_then(|t| t.rows.get(&id))
            .cloned()
    }

    pub(crate) fn get_all(&self, entity_type: EntityTypeId) -> Vec<(Id, Bytes)> {
        self.entities
            .get(&entity_type)
            .map(|t| t.rows.iter().map(|(id, data)| (*id, data.clone())).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, entity_type: EntityTypeId) -> u64 {
        self.entities
            .get(&entity_type)
            .map_or(0, |t| t.rows.len() as u64)
    }

    pub(crate) fn remove(&mut self, entity_type: EntityTypeId, id: Id) -> bool {
        self.entities
            .get_mut(&entity_type)
            .is_some_and(|t| t.rows.remove(&id).is_some())
    }

    pub(crate) fn remove_all(&mut self, entity_type: EntityTypeId) -> u64 {
        self.entities.get_mut(&entity_type).map_or(0, |t| {
            let removed = t.rows.len() as u64;
            t.rows.clear();
            removed
        })
    }

    pub(crate) fn add_link(&mut self, relation: RelationId, source: Id, target: Id) {
        self.links
            .entry(relation)
            .or_default()
            .insert((source, target));
    }

    pub(crate) fn remove_link(&mut self, relation: RelationId, source: Id, target: Id) -> bool {
        self.links
            .get_mut(&relation)
            .is_some_and(|l| l.remove(&(source, target)))
    }

    pub(crate) fn targets_of(&self, relation: RelationId, source: Id) -> Vec<Id> {
        self.links
            .get(&relation)
            .map(|l| {
                l.range((source, Id::MIN)..=(source, Id::MAX))
                    .map(|&(_, target)| target)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn sources_of(&self, relation: RelationId, target: Id) -> Vec<Id> {
        let mut sources: Vec<Id> = self
            .links
            .get(&relation)
            .map(|l| {
                l.iter()
                    .filter(|&&(_, t)| t == target)
                    .map(|&(source, _)| source)
                    .collect()
            })
            .unwrap_or_default();
        sources.sort_unstable();
        sources
    }

    pub(crate) fn backlinks(
        &self,
        entity_type: EntityTypeId,
        slot: u16,
        target: Id,
    ) -> StoreResult<Vec<Id>> {
        if target == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.entities.get(&entity_type) else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        for (id, data) in &table.rows {
            let reader = FlatBufferReader::new(data)?;
            if reader.read_id(slot)? == target {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}
