// Copyright (c) 2024-present Arclight Animation contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Animation graph datasets: the flat clip table a graph samples from.
//!
//! A graph definition never references clips directly; its clip nodes carry
//! *data slot* indices into a dataset. This keeps logic (the graph) separate
//! from data (the clips), so one compiled graph can drive different clip sets.

use crate::{clip::AnimationClip, error::GraphError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::Arc,
};

/// Magic prefix of a serialized dataset descriptor.
pub const DATASET_MAGIC: &[u8; 4] = b"agds";

/// The dataset block compiled into a graph definition: the dataset's asset id
/// plus the asset id expected in every slot. Used to validate that the dataset
/// supplied at instance construction is the one the graph was compiled
/// against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetDescriptor {
    /// Asset id of the dataset.
    pub asset_id: u64,
    /// Asset id expected in each data slot, in slot order.
    pub clip_ids: Vec<u64>,
}

impl DatasetDescriptor {
    /// Reads a descriptor from its wire form: magic, u64 asset id, u32 clip
    /// count, then one u64 asset id per clip, all little-endian.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, GraphError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != DATASET_MAGIC {
            return Err(GraphError::InvalidDefinition(format!(
                "bad dataset magic {magic:?}"
            )));
        }
        let asset_id = reader.read_u64::<LittleEndian>()?;
        let clip_count = reader.read_u32::<LittleEndian>()?;
        let mut clip_ids = Vec::with_capacity(clip_count as usize);
        for _ in 0..clip_count {
            clip_ids.push(reader.read_u64::<LittleEndian>()?);
        }
        Ok(Self { asset_id, clip_ids })
    }

    /// Writes the descriptor in its wire form.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(DATASET_MAGIC)?;
        writer.write_u64::<LittleEndian>(self.asset_id)?;
        writer.write_u32::<LittleEndian>(self.clip_ids.len() as u32)?;
        for id in &self.clip_ids {
            writer.write_u64::<LittleEndian>(*id)?;
        }
        Ok(())
    }
}

/// A loaded dataset: the clip behind every data slot of a graph.
#[derive(Debug)]
pub struct AnimationGraphDataset {
    asset_id: u64,
    clips: Vec<Arc<AnimationClip>>,
}

impl AnimationGraphDataset {
    /// Creates a dataset from loaded clips, in slot order.
    pub fn new(asset_id: u64, clips: Vec<Arc<AnimationClip>>) -> Self {
        Self { asset_id, clips }
    }

    /// Asset id of the dataset.
    #[inline]
    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    /// Number of data slots.
    #[inline]
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Resolves a data slot to its clip.
    #[inline]
    pub fn clip(&self, data_slot: u32) -> Option<&Arc<AnimationClip>> {
        self.clips.get(data_slot as usize)
    }

    /// Builds the descriptor this dataset satisfies.
    pub fn descriptor(&self) -> DatasetDescriptor {
        DatasetDescriptor {
            asset_id: self.asset_id,
            clip_ids: self.clips.iter().map(|c| c.asset_id()).collect(),
        }
    }

    /// Checks the dataset against the descriptor compiled into a definition.
    pub fn validate(&self, descriptor: &DatasetDescriptor) -> Result<(), GraphError> {
        if self.asset_id != descriptor.asset_id {
            return Err(GraphError::DatasetMismatch(format!(
                "dataset asset id {} != descriptor asset id {}",
                self.asset_id, descriptor.asset_id
            )));
        }
        if self.clips.len() != descriptor.clip_ids.len() {
            return Err(GraphError::DatasetMismatch(format!(
                "dataset has {} clips, descriptor expects {}",
                self.clips.len(),
                descriptor.clip_ids.len()
            )));
        }
        for (slot, (clip, expected)) in
            self.clips.iter().zip(descriptor.clip_ids.iter()).enumerate()
        {
            if clip.asset_id() != *expected {
                return Err(GraphError::DatasetMismatch(format!(
                    "slot {slot} holds clip {} but descriptor expects {expected}",
                    clip.asset_id()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{math::Transform, skeleton::Skeleton};

    fn clip(asset_id: u64) -> Arc<AnimationClip> {
        let skeleton = Arc::new(
            Skeleton::new(
                vec![("root".to_string(), None)],
                vec![Transform::identity()],
            )
            .unwrap(),
        );
        Arc::new(AnimationClip::new(asset_id, skeleton, Vec::new(), 30))
    }

    #[test]
    fn descriptor_round_trips_through_bytes() {
        let descriptor = DatasetDescriptor {
            asset_id: 42,
            clip_ids: vec![1, 2, 3],
        };
        let mut bytes = Vec::new();
        descriptor.write(&mut bytes).unwrap();
        let read = DatasetDescriptor::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, descriptor);
    }

    #[test]
    fn validate_catches_slot_mismatches() {
        let dataset = AnimationGraphDataset::new(42, vec![clip(1), clip(2)]);
        assert!(dataset.validate(&dataset.descriptor()).is_ok());

        let wrong = DatasetDescriptor {
            asset_id: 42,
            clip_ids: vec![1, 9],
        };
        assert!(matches!(
            dataset.validate(&wrong),
            Err(GraphError::DatasetMismatch(_))
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = b"nope\0\0\0\0";
        assert!(matches!(
            DatasetDescriptor::read(&mut bytes.as_slice()),
            Err(GraphError::InvalidDefinition(_))
        ));
    }
}
