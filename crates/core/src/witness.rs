//! Script witnesses.

use crate::constants::{MAX_INVOCATION_SCRIPT, MAX_VERIFICATION_SCRIPT};
use crate::{crypto, UInt160};
use dbft_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// A witness authorizing a verifiable entity.
///
/// The invocation script pushes arguments (signatures); the verification
/// script is the contract they satisfy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Pushes the signatures consumed by the verification script.
    pub invocation_script: Vec<u8>,

    /// The contract script that checks the pushed signatures.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Creates a witness from its two scripts.
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// A witness with both scripts empty, marking an unsigned entity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this witness carries no scripts at all.
    pub fn is_empty(&self) -> bool {
        self.invocation_script.is_empty() && self.verification_script.is_empty()
    }

    /// The script hash of the verification script.
    pub fn script_hash(&self) -> UInt160 {
        crypto::hash160(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        helper::get_var_bytes_size(&self.invocation_script)
            + helper::get_var_bytes_size(&self.verification_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
            verification_script: reader.read_var_bytes(MAX_VERIFICATION_SCRIPT)?,
        })
    }
}
