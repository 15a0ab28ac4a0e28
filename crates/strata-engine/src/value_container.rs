use std::io::{self, Read, Write};
use std::sync::Arc;

use strata_core::FileId;
use strata_storage::{read_varint, write_varint, DataExternalizer};

/// For one key, the values stored under it and the set of input files that
/// contributed each value.
#[derive(Debug, Clone)]
pub struct ValueContainer<V> {
    entries: Vec<(V, Vec<FileId>)>,
}

impl<V> Default for ValueContainer<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V: Eq> ValueContainer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value_count(&self) -> usize {
        self.entries.len()
    }

    /// Associates `input` with `value`, deduplicating the id within the value.
    pub fn add(&mut self, input: FileId, value: V) {
        if let Some((_, ids)) = self.entries.iter_mut().find(|(v, _)| *v == value) {
            if !ids.contains(&input) {
                ids.push(input);
            }
            return;
        }
        self.entries.push((value, vec![input]));
    }

    /// Removes `input` from every value association; values left without
    /// inputs are dropped.
    pub fn remove_associated(&mut self, input: FileId) {
        for (_, ids) in &mut self.entries {
            ids.retain(|id| *id != input);
        }
        self.entries.retain(|(_, ids)| !ids.is_empty());
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(v, _)| v)
    }

    pub fn input_ids(&self, value: &V) -> &[FileId] {
        self.entries
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_associated(&self, value: &V, input: FileId) -> bool {
        self.input_ids(value).contains(&input)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&V, &[FileId])> {
        self.entries.iter().map(|(v, ids)| (v, ids.as_slice()))
    }
}

/// Wire format: varint value count, then per value the payload via the
/// extension's value externalizer, a varint id count, and the ids as varints.
pub struct ContainerExternalizer<V> {
    values: Arc<dyn DataExternalizer<V>>,
}

impl<V> ContainerExternalizer<V> {
    pub fn new(values: Arc<dyn DataExternalizer<V>>) -> Self {
        Self { values }
    }
}

impl<V: Eq + Send + Sync> DataExternalizer<ValueContainer<V>> for ContainerExternalizer<V> {
    fn save(&self, out: &mut dyn Write, container: &ValueContainer<V>) -> io::Result<()> {
        write_varint(out, container.entries.len() as u64)?;
        for (value, ids) in &container.entries {
            self.values.save(out, value)?;
            write_varint(out, ids.len() as u64)?;
            for id in ids {
                write_varint(out, u64::from(id.to_raw()))?;
            }
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<ValueContainer<V>> {
        let value_count = read_varint(input)? as usize;
        let mut entries = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let value = self.values.read(input)?;
            let id_count = read_varint(input)? as usize;
            let mut ids = Vec::with_capacity(id_count);
            for _ in 0..id_count {
                let raw = read_varint(input)?;
                let raw = u32::try_from(raw).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "file id out of range")
                })?;
                ids.push(FileId::from_raw(raw));
            }
            entries.push((value, ids));
        }
        Ok(ValueContainer { entries })
    }
}
