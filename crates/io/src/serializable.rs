//! The [`Serializable`] trait and array helpers.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// A value with a deterministic binary layout.
pub trait Serializable {
    /// Exact encoded size in bytes.
    fn size(&self) -> usize;

    /// Writes the value to `writer`.
    fn serialize(&self, writer: &mut BinaryWriter);

    /// Reads a value from `reader`.
    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self>
    where
        Self: Sized;
}

/// Whole-buffer conveniences for [`Serializable`] values.
pub trait SerializableExt: Serializable {
    /// Encodes the value into a fresh byte vector.
    fn to_array(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer);
        writer.into_bytes()
    }

    /// Decodes a value from a byte slice, requiring the whole slice.
    fn from_array(data: &[u8]) -> IoResult<Self>
    where
        Self: Sized,
    {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(crate::IoError::invalid_data("trailing bytes after value"));
        }
        Ok(value)
    }
}

impl<T: Serializable> SerializableExt for T {}

/// Helpers for length-prefixed collections.
pub mod helper {
    use super::Serializable;
    use crate::{BinaryWriter, IoResult, MemoryReader};

    /// Writes a var-int count followed by each element.
    pub fn serialize_array<T: Serializable>(items: &[T], writer: &mut BinaryWriter) {
        writer.write_var_int(items.len() as u64);
        for item in items {
            item.serialize(writer);
        }
    }

    /// Reads a var-int count (bounded by `max`) followed by that many elements.
    pub fn deserialize_array<T: Serializable>(
        reader: &mut MemoryReader<'_>,
        max: usize,
    ) -> IoResult<Vec<T>> {
        let count = reader.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::deserialize(reader)?);
        }
        Ok(items)
    }

    /// Encoded size of a var-int.
    pub fn get_var_size(value: u64) -> usize {
        if value < 0xFD {
            1
        } else if value <= 0xFFFF {
            3
        } else if value <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }

    /// Encoded size of a var-bytes field.
    pub fn get_var_bytes_size(data: &[u8]) -> usize {
        get_var_size(data.len() as u64) + data.len()
    }

    /// Encoded size of a length-prefixed array.
    pub fn get_array_size<T: Serializable>(items: &[T]) -> usize {
        get_var_size(items.len() as u64) + items.iter().map(Serializable::size).sum::<usize>()
    }
}
