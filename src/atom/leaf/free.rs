use std::fmt;

use crate::{
    atom::util::DebugEllipsis,
    writer::{SerializeAtomData, WriteError},
};

pub const FREE: &[u8; 4] = b"free";
pub const SKIP: &[u8; 4] = b"skip";
pub const WIDE: &[u8; 4] = b"wide";

/// Free space; only its length is kept, content is written back as zeros
#[derive(Default, Clone, PartialEq, Eq)]
pub struct FreeAtom {
    /// Size of the free space data
    pub data_size: u64,
}

impl FreeAtom {
    pub fn new(data_size: u64) -> Self {
        Self { data_size }
    }
}

impl fmt::Debug for FreeAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeAtom")
            .field("data_size", &self.data_size)
            .field("data", &DebugEllipsis(None))
            .finish()
    }
}

impl SerializeAtomData for FreeAtom {
    fn atom_data_bytes(&self, _version: u8) -> Result<Vec<u8>, WriteError> {
        let len = usize::try_from(self.data_size).map_err(|_| {
            WriteError::size(format!("free space of {} bytes", self.data_size))
        })?;
        Ok(vec![0u8; len])
    }
}
