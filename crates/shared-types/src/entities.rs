//! # Core Domain Entities
//!
//! Defines the chain entities exchanged between the node subsystems.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`, `BlockBody`, `Transaction`
//! - **Identity**: `Hash`, `ChainId`, `PublicKey`, `Address`, `PeerId`
//! - **Hashing**: block hash, transaction hash, transaction merkle root,
//!   address derivation

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// Chain identifier (hash of the chain's genesis parameters).
pub type ChainId = Hash;

/// A 32-byte producer public key.
pub type PublicKey = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// A 64-byte signature.
pub type Signature = [u8; 64];

/// Previous-block hash declared by the first block after genesis.
pub const GENESIS_PARENT_HASH: Hash = [0u8; 32];

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_hex(&self.0))
    }
}

/// Abbreviated hex rendering of a hash for log lines (`a1b2c3d4..`).
pub fn short_hex(bytes: &[u8]) -> String {
    let end = bytes.len().min(4);
    format!("{}..", hex::encode(&bytes[..end]))
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// The header of a block containing metadata and root hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Chain this block belongs to.
    pub chain_id: ChainId,
    /// Block height in the chain (genesis is 0).
    pub height: u64,
    /// Hash of the parent block (creates the chain linkage).
    pub previous_hash: Hash,
    /// Public key of the producer who sealed this block.
    pub producer: PublicKey,
    /// Merkle root over the body's transaction hashes.
    pub transactions_root: Hash,
    /// Root hash of the world state after applying this block.
    pub state_root: Hash,
    /// Unix timestamp when the block was produced.
    pub timestamp: u64,
}

impl BlockHeader {
    /// Compute the header hash, which is also the block hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.chain_id);
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.producer);
        hasher.update(self.transactions_root);
        hasher.update(self.state_root);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.finalize().into()
    }

    /// Whether the header declares the genesis parent.
    pub fn has_genesis_parent(&self) -> bool {
        self.previous_hash == GENESIS_PARENT_HASH
    }
}

/// Block body: the ordered transaction hashes included in the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockBody {
    /// Ordered hashes of the included transactions.
    pub transactions: Vec<Hash>,
    /// Declared number of transactions.
    pub transaction_count: u32,
}

impl BlockBody {
    /// Build a body whose declared count matches its transaction list.
    pub fn new(transactions: Vec<Hash>) -> Self {
        let transaction_count = transactions.len() as u32;
        Self {
            transactions,
            transaction_count,
        }
    }

    /// Recompute the merkle root over the body's transactions.
    pub fn merkle_root(&self) -> Hash {
        compute_merkle_root(&self.transactions)
    }
}

/// A block as received from the network or produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// The block body.
    pub body: BlockBody,
}

impl Block {
    /// Assemble a block, filling in the transactions root from the body.
    pub fn new(mut header: BlockHeader, body: BlockBody) -> Self {
        header.transactions_root = body.merkle_root();
        Self { header, body }
    }

    /// The block hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Declared previous-block hash.
    pub fn previous_hash(&self) -> Hash {
        self.header.previous_hash
    }
}

/// A signed transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Transferred value in base units.
    pub value: u64,
    /// Sender's sequence number.
    pub nonce: u64,
    /// Call data.
    pub data: Vec<u8>,
    /// Sender's signature over the transaction.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

impl Transaction {
    /// Compute the transaction hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.from);
        if let Some(to) = &self.to {
            hasher.update(to);
        }
        hasher.update(self.value.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Returns the sender address.
    pub fn sender(&self) -> Address {
        self.from
    }
}

// =============================================================================
// CLUSTER C: HASHING HELPERS
// =============================================================================

fn hash_concat(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Build a binary merkle tree over transaction hashes and return its root.
///
/// The last node of an odd level is paired with itself. An empty list has
/// the all-zero root.
pub fn compute_merkle_root(tx_hashes: &[Hash]) -> Hash {
    if tx_hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<Hash> = tx_hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_concat(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    level[0]
}

/// Derive an account address from a public key (last 20 bytes of Keccak-256).
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = Keccak256::digest(public_key);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}
