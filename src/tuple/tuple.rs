use crate::common::{Result, StrataError};

/// A row of fixed-width integer columns.
///
/// The executors above the storage core work over uniform i32 columns;
/// richer schemas and value types are the catalog layer's concern and
/// out of scope here. On disk a tuple is the little-endian
/// concatenation of its columns, so arity is recoverable from length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    values: Vec<i32>,
}

impl Tuple {
    pub fn new(values: Vec<i32>) -> Self {
        Self { values }
    }

    pub fn value(&self, column: usize) -> i32 {
        self.values[column]
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Concatenates two rows, as a join output.
    pub fn join(&self, other: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend_from_slice(&other.values);
        Tuple::new(values)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.values.len() * 4);
        for value in &self.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Tuple> {
        if bytes.len() % 4 != 0 {
            return Err(StrataError::Corrupted(format!(
                "tuple length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        Ok(Tuple { values })
    }
}
