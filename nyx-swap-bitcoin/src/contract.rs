//! The atomic-swap contract script.
//!
//! The lock output pays a P2SH wrapping this redeem script:
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <secret_hash> OP_EQUALVERIFY OP_DUP OP_HASH160 <hash160(B)>
//! OP_ELSE
//!     <lock_height> OP_CHECKLOCKTIMEVERIFY OP_DROP OP_DUP OP_HASH160 <hash160(A)>
//! OP_ENDIF
//! OP_EQUALVERIFY
//! OP_CHECKSIG
//! ```
//!
//! The redeem path spends with `<sig> <pubkey B> <secret> 1 <script>`; the
//! refund path with `<sig> <pubkey A> 0 <script>`. The hash lock is the
//! SHA256 digest of the 32-byte secret, which is what `OP_SHA256` leaves on
//! the stack for `OP_EQUALVERIFY` to compare.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf, ScriptBuf};
use bitcoin::consensus::encode;
use bitcoin::hashes::{hash160, sha256, Hash};
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Address, Network, PrivateKey, PublicKey, Script, Sequence, Transaction};

use nyx_swap::{Result, SwapError};

/// Inputs fixing one swap contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractParams {
    /// Refund-leg key (the Bitcoin owner's swap key).
    pub public_key_a: PublicKey,
    /// Redeem-leg key (the counterparty's swap key).
    pub public_key_b: PublicKey,
    /// SHA256 digest of the 32-byte secret.
    pub secret_hash: [u8; 32],
    /// Absolute Bitcoin height gating the refund path.
    pub lock_time: u64,
}

/// Commitments recovered from an on-chain contract script.
///
/// Only key *hashes* are committed on chain, so parsing cannot restore the
/// full [`ContractParams`]; use [`ParsedContract::matches`] to check a
/// script against known parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContract {
    /// SHA256 digest of the secret.
    pub secret_hash: [u8; 32],
    /// HASH160 of the refund-leg key.
    pub pubkey_hash_a: [u8; 20],
    /// HASH160 of the redeem-leg key.
    pub pubkey_hash_b: [u8; 20],
    /// Refund lock height.
    pub lock_time: u64,
}

impl ParsedContract {
    /// Whether this on-chain contract commits to the given parameters.
    pub fn matches(&self, params: &ContractParams) -> bool {
        self.secret_hash == params.secret_hash
            && self.lock_time == params.lock_time
            && self.pubkey_hash_a == pubkey_hash160(&params.public_key_a)
            && self.pubkey_hash_b == pubkey_hash160(&params.public_key_b)
    }
}

/// Which branch of the contract a withdraw takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawBranch {
    /// Claim with the revealed secret; spendable immediately.
    Redeem {
        /// The 32-byte preimage.
        secret: [u8; 32],
    },
    /// Reclaim after the lock height.
    Refund,
}

impl WithdrawBranch {
    /// Input sequence for this branch. The refund input must leave the
    /// final-sequence bit unset or CHECKLOCKTIMEVERIFY fails.
    pub fn sequence(&self) -> Sequence {
        match self {
            WithdrawBranch::Redeem { .. } => Sequence::MAX,
            WithdrawBranch::Refund => Sequence::ENABLE_LOCKTIME_NO_RBF,
        }
    }
}

/// SHA256 digest used as the hash lock.
pub fn secret_hash(secret: &[u8; 32]) -> [u8; 32] {
    sha256::Hash::hash(secret).to_byte_array()
}

/// HASH160 of a compressed public key.
fn pubkey_hash160(key: &PublicKey) -> [u8; 20] {
    hash160::Hash::hash(&key.to_bytes()).to_byte_array()
}

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(data)
        .map_err(|e| SwapError::FormatIncorrect(format!("script push: {}", e)))
}

/// Build the contract redeem script.
///
/// The output is byte-for-byte deterministic in its inputs.
pub fn build_contract(params: &ContractParams) -> Result<ScriptBuf> {
    let secret_hash = push_bytes(params.secret_hash.to_vec())?;
    let hash_a = push_bytes(pubkey_hash160(&params.public_key_a).to_vec())?;
    let hash_b = push_bytes(pubkey_hash160(&params.public_key_b).to_vec())?;

    Ok(Builder::new()
        .push_opcode(opcodes::all::OP_IF)
        .push_opcode(opcodes::all::OP_SHA256)
        .push_slice(secret_hash)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_opcode(opcodes::all::OP_DUP)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(hash_b)
        .push_opcode(opcodes::all::OP_ELSE)
        .push_int(params.lock_time as i64)
        .push_opcode(opcodes::all::OP_CLTV)
        .push_opcode(opcodes::all::OP_DROP)
        .push_opcode(opcodes::all::OP_DUP)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(hash_a)
        .push_opcode(opcodes::all::OP_ENDIF)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .into_script())
}

fn expect_op(instruction: &Instruction<'_>, op: opcodes::Opcode) -> Result<()> {
    match instruction {
        Instruction::Op(found) if *found == op => Ok(()),
        _ => Err(SwapError::FormatIncorrect(format!(
            "contract script: expected {:?}",
            op
        ))),
    }
}

fn expect_push<const N: usize>(instruction: &Instruction<'_>) -> Result<[u8; N]> {
    if let Instruction::PushBytes(push) = instruction {
        let bytes = push.as_bytes();
        if bytes.len() == N {
            let mut out = [0u8; N];
            out.copy_from_slice(bytes);
            return Ok(out);
        }
    }
    Err(SwapError::FormatIncorrect(format!(
        "contract script: expected a {}-byte push",
        N
    )))
}

/// Decode a minimally encoded, non-negative script number.
fn script_num(instruction: &Instruction<'_>) -> Result<u64> {
    match instruction {
        Instruction::Op(op) => {
            let byte = op.to_u8();
            let from = opcodes::all::OP_PUSHNUM_1.to_u8();
            let to = opcodes::all::OP_PUSHNUM_16.to_u8();
            if (from..=to).contains(&byte) {
                Ok((byte - from + 1) as u64)
            } else {
                Err(SwapError::FormatIncorrect(
                    "contract script: expected a numeric push".into(),
                ))
            }
        }
        Instruction::PushBytes(push) => {
            let bytes = push.as_bytes();
            if bytes.is_empty() || bytes.len() > 5 {
                return Err(SwapError::FormatIncorrect(
                    "contract script: lock height out of range".into(),
                ));
            }
            if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
                return Err(SwapError::FormatIncorrect(
                    "contract script: negative lock height".into(),
                ));
            }
            let mut value = 0u64;
            for (i, &byte) in bytes.iter().enumerate() {
                value |= (byte as u64) << (8 * i);
            }
            Ok(value)
        }
    }
}

/// Parse a contract script back into its commitments.
///
/// Rejects anything that is not exactly the template above, so third-party
/// software can recognise swap outputs.
pub fn parse_contract(script: &Script) -> Result<ParsedContract> {
    let instructions: Vec<Instruction<'_>> = script
        .instructions()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| SwapError::FormatIncorrect(format!("undecodable script: {}", e)))?;

    if instructions.len() != 17 {
        return Err(SwapError::FormatIncorrect(format!(
            "contract script: expected 17 elements, got {}",
            instructions.len()
        )));
    }

    expect_op(&instructions[0], opcodes::all::OP_IF)?;
    expect_op(&instructions[1], opcodes::all::OP_SHA256)?;
    let secret_hash = expect_push::<32>(&instructions[2])?;
    expect_op(&instructions[3], opcodes::all::OP_EQUALVERIFY)?;
    expect_op(&instructions[4], opcodes::all::OP_DUP)?;
    expect_op(&instructions[5], opcodes::all::OP_HASH160)?;
    let pubkey_hash_b = expect_push::<20>(&instructions[6])?;
    expect_op(&instructions[7], opcodes::all::OP_ELSE)?;
    let lock_time = script_num(&instructions[8])?;
    expect_op(&instructions[9], opcodes::all::OP_CLTV)?;
    expect_op(&instructions[10], opcodes::all::OP_DROP)?;
    expect_op(&instructions[11], opcodes::all::OP_DUP)?;
    expect_op(&instructions[12], opcodes::all::OP_HASH160)?;
    let pubkey_hash_a = expect_push::<20>(&instructions[13])?;
    expect_op(&instructions[14], opcodes::all::OP_ENDIF)?;
    expect_op(&instructions[15], opcodes::all::OP_EQUALVERIFY)?;
    expect_op(&instructions[16], opcodes::all::OP_CHECKSIG)?;

    Ok(ParsedContract {
        secret_hash,
        pubkey_hash_a,
        pubkey_hash_b,
        lock_time,
    })
}

/// P2SH address of a contract script.
pub fn contract_address(contract: &Script, network: Network) -> Result<Address> {
    Address::p2sh(contract, network)
        .map_err(|e| SwapError::FormatIncorrect(format!("contract script: {}", e)))
}

/// scriptSig for the redeem path: `<sig> <pubkey B> <secret> 1 <script>`.
pub fn redeem_script_sig(
    signature: &[u8],
    public_key: &PublicKey,
    secret: &[u8; 32],
    contract: &Script,
) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_bytes(signature.to_vec())?)
        .push_slice(push_bytes(public_key.to_bytes())?)
        .push_slice(push_bytes(secret.to_vec())?)
        .push_opcode(opcodes::all::OP_PUSHNUM_1)
        .push_slice(push_bytes(contract.as_bytes().to_vec())?)
        .into_script())
}

/// scriptSig for the refund path: `<sig> <pubkey A> 0 <script>`.
pub fn refund_script_sig(
    signature: &[u8],
    public_key: &PublicKey,
    contract: &Script,
) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_bytes(signature.to_vec())?)
        .push_slice(push_bytes(public_key.to_bytes())?)
        .push_opcode(opcodes::all::OP_PUSHBYTES_0)
        .push_slice(push_bytes(contract.as_bytes().to_vec())?)
        .into_script())
}

/// Decode a raw transaction from hex.
pub fn decode_tx(tx_hex: &str) -> Result<Transaction> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| SwapError::FormatIncorrect(format!("transaction hex: {}", e)))?;
    encode::deserialize(&bytes)
        .map_err(|e| SwapError::FormatIncorrect(format!("transaction decode: {}", e)))
}

/// Index of the output paying the given scriptPubKey, if any.
pub fn find_contract_vout(tx: &Transaction, script_pubkey: &Script) -> Option<u32> {
    tx.output
        .iter()
        .position(|out| out.script_pubkey.as_script() == script_pubkey)
        .map(|index| index as u32)
}

/// Sign and finalize a one-input withdraw of the lock output.
///
/// The unsigned transaction comes from `create_raw_transaction`; this sets
/// the branch-appropriate input sequence, signs against the contract script
/// with a legacy SIGHASH_ALL, and installs the branch scriptSig.
pub fn finalize_withdraw_tx(
    tx_hex: &str,
    contract: &Script,
    key: &PrivateKey,
    branch: &WithdrawBranch,
) -> Result<String> {
    let mut tx = decode_tx(tx_hex)?;
    if tx.input.len() != 1 {
        return Err(SwapError::FormatIncorrect(format!(
            "withdraw expects a single input, got {}",
            tx.input.len()
        )));
    }
    tx.input[0].sequence = branch.sequence();

    let sighash = SighashCache::new(&tx)
        .legacy_signature_hash(0, contract, EcdsaSighashType::All.to_u32())
        .map_err(|e| SwapError::FormatIncorrect(format!("sighash: {}", e)))?;

    let secp = Secp256k1::new();
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&message, &key.inner),
        sighash_type: EcdsaSighashType::All,
    };
    let public_key = key.public_key(&secp);

    tx.input[0].script_sig = match branch {
        WithdrawBranch::Redeem { secret } => {
            redeem_script_sig(&signature.to_vec(), &public_key, secret, contract)?
        }
        WithdrawBranch::Refund => refund_script_sig(&signature.to_vec(), &public_key, contract)?,
    };

    Ok(encode::serialize_hex(&tx))
}

/// Recover the secret from a transaction spending the lock output.
///
/// Scans every input for a 32-byte push whose SHA256 digest equals the
/// committed hash lock.
pub fn extract_secret(tx: &Transaction, secret_hash: &[u8; 32]) -> Option<[u8; 32]> {
    for input in &tx.input {
        for instruction in input.script_sig.instructions().flatten() {
            if let Instruction::PushBytes(push) = instruction {
                let bytes = push.as_bytes();
                if bytes.len() == 32 && sha256::Hash::hash(bytes).to_byte_array() == *secret_hash {
                    let mut secret = [0u8; 32];
                    secret.copy_from_slice(bytes);
                    return Some(secret);
                }
            }
        }
    }
    None
}
