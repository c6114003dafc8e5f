//! Signature contracts and the committee address.

use crate::constants::SIGNATURE_SIZE;
use crate::{crypto, CoreError, CoreResult, PublicKey, UInt160, Witness};

/// PUSHDATA1 opcode: next byte is a length, followed by that many bytes.
const OP_PUSHDATA1: u8 = 0x0C;
/// PUSHINT8 opcode: next byte is a small integer literal.
const OP_PUSHINT8: u8 = 0x00;
/// Base of the PUSH1..PUSH16 opcode range.
const OP_PUSH1: u8 = 0x11;
/// SYSCALL opcode.
const OP_SYSCALL: u8 = 0x41;

const CHECKSIG_SYSCALL: &[u8] = b"System.Crypto.CheckSig";
const CHECKMULTISIG_SYSCALL: &[u8] = b"System.Crypto.CheckMultisig";

/// A verification contract: a script plus the number of signature
/// parameters it consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    /// The verification script.
    pub script: Vec<u8>,

    /// How many signatures the script pops.
    pub parameter_count: usize,
}

impl Contract {
    /// Single-signature contract for one public key.
    pub fn create_signature_contract(public_key: &PublicKey) -> Self {
        let mut script = Vec::with_capacity(2 + 33 + 1 + CHECKSIG_SYSCALL.len());
        push_data(&mut script, public_key.as_bytes());
        script.push(OP_SYSCALL);
        script.extend_from_slice(CHECKSIG_SYSCALL);
        Self {
            script,
            parameter_count: 1,
        }
    }

    /// M-of-N multisignature contract over the given ordered keys.
    pub fn create_multi_sig_contract(m: usize, public_keys: &[PublicKey]) -> CoreResult<Self> {
        let n = public_keys.len();
        if m == 0 || m > n {
            return Err(CoreError::InvalidContract(format!(
                "signature threshold {m} out of range for {n} keys"
            )));
        }
        let mut script = Vec::new();
        push_int(&mut script, m as u64)?;
        for public_key in public_keys {
            push_data(&mut script, public_key.as_bytes());
        }
        push_int(&mut script, n as u64)?;
        script.push(OP_SYSCALL);
        script.extend_from_slice(CHECKMULTISIG_SYSCALL);
        Ok(Self {
            script,
            parameter_count: m,
        })
    }

    /// The script hash, which doubles as the contract's address.
    pub fn script_hash(&self) -> UInt160 {
        crypto::hash160(&self.script)
    }

    /// Builds a witness pushing the given signatures, in order, against
    /// this contract. The caller supplies exactly `parameter_count`
    /// signatures.
    pub fn create_witness(&self, signatures: &[[u8; SIGNATURE_SIZE]]) -> CoreResult<Witness> {
        if signatures.len() != self.parameter_count {
            return Err(CoreError::InvalidContract(format!(
                "contract takes {} signatures, got {}",
                self.parameter_count,
                signatures.len()
            )));
        }
        let mut invocation = Vec::with_capacity(signatures.len() * (2 + SIGNATURE_SIZE));
        for signature in signatures {
            push_data(&mut invocation, signature);
        }
        Ok(Witness::new(invocation, self.script.clone()))
    }
}

/// Script hash of the M-of-N committee contract for a validator set, with
/// `m = n - (n - 1) / 3`. Every honest node derives the same address from
/// the same ordered set.
pub fn consensus_address(validators: &[PublicKey]) -> CoreResult<UInt160> {
    let n = validators.len();
    let m = n - (n.saturating_sub(1)) / 3;
    Ok(Contract::create_multi_sig_contract(m, validators)?.script_hash())
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    script.push(OP_PUSHDATA1);
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

// PUSHINT8 takes a signed byte; anything past 127 needs a wider push
// opcode than these contracts ever emit.
fn push_int(script: &mut Vec<u8>, value: u64) -> CoreResult<()> {
    if (1..=16).contains(&value) {
        script.push(OP_PUSH1 + (value as u8 - 1));
    } else if value <= 127 {
        script.push(OP_PUSHINT8);
        script.push(value as u8);
    } else {
        return Err(CoreError::InvalidContract(format!(
            "push value {value} does not fit a single signed byte"
        )));
    }
    Ok(())
}
