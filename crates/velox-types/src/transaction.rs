//! Transaction types for Aptos-compatible chains.
//!
//! Field and variant order mirrors the on-chain BCS layout; do not reorder.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::Address;

const RAW_TRANSACTION_SALT: &[u8] = b"APTOS::RawTransaction";
const RAW_TRANSACTION_WITH_DATA_SALT: &[u8] = b"APTOS::RawTransactionWithData";
const TRANSACTION_SALT: &[u8] = b"APTOS::Transaction";

#[derive(Debug, Error)]
pub enum TransactionError {
	#[error("BCS error: {0}")]
	Bcs(#[from] bcs::Error),
	#[error("Invalid type tag: {0}")]
	InvalidTypeTag(String),
	#[error("Invalid transaction hash: {0}")]
	InvalidHash(String),
	#[error("Invalid key material: {0}")]
	InvalidKey(String),
}

/// Variant that is never produced or accepted by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unsupported {}

/// SHA3-256 of the given bytes.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
	let mut hasher = Sha3_256::new();
	hasher.update(data);
	hasher.finalize().into()
}

/// Move type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
	Bool,
	U8,
	U64,
	U128,
	Address,
	Signer,
	Vector(Box<TypeTag>),
	Struct(Box<StructTag>),
	U16,
	U32,
	U256,
}

impl fmt::Display for TypeTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TypeTag::Bool => f.write_str("bool"),
			TypeTag::U8 => f.write_str("u8"),
			TypeTag::U16 => f.write_str("u16"),
			TypeTag::U32 => f.write_str("u32"),
			TypeTag::U64 => f.write_str("u64"),
			TypeTag::U128 => f.write_str("u128"),
			TypeTag::U256 => f.write_str("u256"),
			TypeTag::Address => f.write_str("address"),
			TypeTag::Signer => f.write_str("signer"),
			TypeTag::Vector(inner) => write!(f, "vector<{}>", inner),
			TypeTag::Struct(tag) => write!(f, "{}", tag),
		}
	}
}

impl FromStr for TypeTag {
	type Err = TransactionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		Ok(match s {
			"bool" => TypeTag::Bool,
			"u8" => TypeTag::U8,
			"u16" => TypeTag::U16,
			"u32" => TypeTag::U32,
			"u64" => TypeTag::U64,
			"u128" => TypeTag::U128,
			"u256" => TypeTag::U256,
			"address" => TypeTag::Address,
			"signer" => TypeTag::Signer,
			_ => {
				if let Some(inner) = s.strip_prefix("vector<").and_then(|r| r.strip_suffix('>')) {
					TypeTag::Vector(Box::new(inner.parse()?))
				} else {
					TypeTag::Struct(Box::new(s.parse()?))
				}
			}
		})
	}
}

/// Fully qualified Move struct type, e.g. `0x1::aptos_coin::AptosCoin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructTag {
	pub address: Address,
	pub module: String,
	pub name: String,
	pub type_args: Vec<TypeTag>,
}

impl fmt::Display for StructTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}::{}::{}",
			self.address.to_short_string(),
			self.module,
			self.name
		)?;
		if !self.type_args.is_empty() {
			let args: Vec<String> = self.type_args.iter().map(ToString::to_string).collect();
			write!(f, "<{}>", args.join(", "))?;
		}
		Ok(())
	}
}

impl FromStr for StructTag {
	type Err = TransactionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (path, type_args) = match s.find('<') {
			Some(open) => {
				let inner = s[open + 1..]
					.strip_suffix('>')
					.ok_or_else(|| TransactionError::InvalidTypeTag(s.to_string()))?;
				(&s[..open], split_type_args(inner)?)
			}
			None => (s, Vec::new()),
		};

		let mut parts = path.split("::");
		let (Some(address), Some(module), Some(name), None) =
			(parts.next(), parts.next(), parts.next(), parts.next())
		else {
			return Err(TransactionError::InvalidTypeTag(s.to_string()));
		};

		Ok(StructTag {
			address: address
				.parse()
				.map_err(|_| TransactionError::InvalidTypeTag(s.to_string()))?,
			module: module.to_string(),
			name: name.to_string(),
			type_args,
		})
	}
}

fn split_type_args(inner: &str) -> Result<Vec<TypeTag>, TransactionError> {
	let mut args = Vec::new();
	let mut depth = 0usize;
	let mut start = 0usize;
	for (i, c) in inner.char_indices() {
		match c {
			'<' => depth += 1,
			'>' => {
				depth = depth
					.checked_sub(1)
					.ok_or_else(|| TransactionError::InvalidTypeTag(inner.to_string()))?
			}
			',' if depth == 0 => {
				args.push(inner[start..i].parse()?);
				start = i + 1;
			}
			_ => {}
		}
	}
	if !inner[start..].trim().is_empty() {
		args.push(inner[start..].parse()?);
	}
	Ok(args)
}

/// A Move module identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleId {
	pub address: Address,
	pub name: String,
}

/// Call of a public entry function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunction {
	pub module: ModuleId,
	pub function: String,
	pub ty_args: Vec<TypeTag>,
	/// BCS-encoded arguments.
	pub args: Vec<Vec<u8>>,
}

impl EntryFunction {
	pub fn new(
		address: Address,
		module: impl Into<String>,
		function: impl Into<String>,
		ty_args: Vec<TypeTag>,
		args: Vec<Vec<u8>>,
	) -> Self {
		Self {
			module: ModuleId {
				address,
				name: module.into(),
			},
			function: function.into(),
			ty_args,
			args,
		}
	}

	/// Fully qualified function id, `<address>::<module>::<function>`.
	pub fn function_id(&self) -> String {
		format!(
			"{}::{}::{}",
			self.module.address, self.module.name, self.function
		)
	}
}

/// Transaction payload. Only entry function calls are built by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPayload {
	Script(Unsupported),
	ModuleBundle(Unsupported),
	EntryFunction(EntryFunction),
}

impl TransactionPayload {
	pub fn entry_function(&self) -> &EntryFunction {
		match self {
			TransactionPayload::EntryFunction(f) => f,
			TransactionPayload::Script(never) | TransactionPayload::ModuleBundle(never) => {
				match *never {}
			}
		}
	}
}

/// Unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
	pub sender: Address,
	pub sequence_number: u64,
	pub payload: TransactionPayload,
	pub max_gas_amount: u64,
	pub gas_unit_price: u64,
	pub expiration_timestamp_secs: u64,
	pub chain_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum RawTransactionWithData {
	MultiAgent {
		raw_txn: RawTransaction,
		secondary_signer_addresses: Vec<Address>,
	},
	MultiAgentWithFeePayer {
		raw_txn: RawTransaction,
		secondary_signer_addresses: Vec<Address>,
		fee_payer_address: Address,
	},
}

/// A raw transaction with an optional fee payer slot.
///
/// The BCS encoding of this type is what gas stations expect to receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleTransaction {
	pub raw_txn: RawTransaction,
	pub fee_payer_address: Option<Address>,
}

impl SimpleTransaction {
	pub fn new(raw_txn: RawTransaction) -> Self {
		Self {
			raw_txn,
			fee_payer_address: None,
		}
	}

	/// Transaction with an empty fee payer slot to be filled by a sponsor.
	pub fn with_fee_payer(raw_txn: RawTransaction) -> Self {
		Self {
			raw_txn,
			fee_payer_address: Some(Address::ZERO),
		}
	}

	/// Bytes that every signer of this transaction must sign.
	pub fn signing_message(&self) -> Result<Vec<u8>, TransactionError> {
		let (salt, body) = match self.fee_payer_address {
			Some(fee_payer_address) => (
				RAW_TRANSACTION_WITH_DATA_SALT,
				bcs::to_bytes(&RawTransactionWithData::MultiAgentWithFeePayer {
					raw_txn: self.raw_txn.clone(),
					secondary_signer_addresses: Vec::new(),
					fee_payer_address,
				})?,
			),
			None => (RAW_TRANSACTION_SALT, bcs::to_bytes(&self.raw_txn)?),
		};

		let mut message = sha3_256(salt).to_vec();
		message.extend_from_slice(&body);
		Ok(message)
	}

	pub fn to_bcs_hex(&self) -> Result<String, TransactionError> {
		Ok(format!("0x{}", hex::encode(bcs::to_bytes(self)?)))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(pub Vec<u8>);

impl Ed25519PublicKey {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
		if bytes.len() != 32 {
			return Err(TransactionError::InvalidKey(format!(
				"Ed25519 public key must be 32 bytes, got {}",
				bytes.len()
			)));
		}
		Ok(Self(bytes.to_vec()))
	}

	/// Account address derived from this key with the single-key scheme.
	pub fn derive_address(&self) -> Address {
		let mut preimage = self.0.clone();
		preimage.push(0x00);
		Address(sha3_256(&preimage))
	}
}

impl Ed25519Signature {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
		if bytes.len() != 64 {
			return Err(TransactionError::InvalidKey(format!(
				"Ed25519 signature must be 64 bytes, got {}",
				bytes.len()
			)));
		}
		Ok(Self(bytes.to_vec()))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnyPublicKey {
	Ed25519 { public_key: Ed25519PublicKey },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnySignature {
	Ed25519 { signature: Ed25519Signature },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleKeyAuthenticator {
	pub public_key: AnyPublicKey,
	pub signature: AnySignature,
}

/// Signature of one account over a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountAuthenticator {
	Ed25519 {
		public_key: Ed25519PublicKey,
		signature: Ed25519Signature,
	},
	MultiEd25519(Unsupported),
	SingleKey {
		authenticator: SingleKeyAuthenticator,
	},
}

impl AccountAuthenticator {
	pub fn ed25519(public_key: Ed25519PublicKey, signature: Ed25519Signature) -> Self {
		AccountAuthenticator::Ed25519 {
			public_key,
			signature,
		}
	}
}

/// Authenticator for a whole transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAuthenticator {
	Ed25519 {
		public_key: Ed25519PublicKey,
		signature: Ed25519Signature,
	},
	MultiEd25519(Unsupported),
	MultiAgent {
		sender: AccountAuthenticator,
		secondary_signer_addresses: Vec<Address>,
		secondary_signers: Vec<AccountAuthenticator>,
	},
	FeePayer {
		sender: AccountAuthenticator,
		secondary_signer_addresses: Vec<Address>,
		secondary_signers: Vec<AccountAuthenticator>,
		fee_payer_address: Address,
		fee_payer_signer: AccountAuthenticator,
	},
	SingleSender {
		sender: AccountAuthenticator,
	},
}

/// A fully signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
	pub raw_txn: RawTransaction,
	pub authenticator: TransactionAuthenticator,
}

impl SignedTransaction {
	/// Signed by the sender alone, who pays for gas.
	pub fn single_signer(raw_txn: RawTransaction, sender: AccountAuthenticator) -> Self {
		let authenticator = match sender {
			AccountAuthenticator::Ed25519 {
				public_key,
				signature,
			} => TransactionAuthenticator::Ed25519 {
				public_key,
				signature,
			},
			other => TransactionAuthenticator::SingleSender { sender: other },
		};
		Self {
			raw_txn,
			authenticator,
		}
	}

	/// Signed by the sender with gas paid by `fee_payer_address`.
	pub fn with_fee_payer(
		raw_txn: RawTransaction,
		sender: AccountAuthenticator,
		fee_payer_address: Address,
		fee_payer_signer: AccountAuthenticator,
	) -> Self {
		Self {
			raw_txn,
			authenticator: TransactionAuthenticator::FeePayer {
				sender,
				secondary_signer_addresses: Vec::new(),
				secondary_signers: Vec::new(),
				fee_payer_address,
				fee_payer_signer,
			},
		}
	}

	pub fn to_bcs(&self) -> Result<Vec<u8>, TransactionError> {
		Ok(bcs::to_bytes(self)?)
	}

	/// Hash the chain will assign to this transaction once committed.
	pub fn committed_hash(&self) -> Result<TransactionHash, TransactionError> {
		let mut preimage = sha3_256(TRANSACTION_SALT).to_vec();
		// User transactions are variant 0 of the chain's Transaction enum.
		preimage.push(0);
		preimage.extend_from_slice(&self.to_bcs()?);
		Ok(TransactionHash(sha3_256(&preimage)))
	}
}

/// Hash of a submitted transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHash(pub [u8; 32]);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TransactionHash({})", self)
	}
}

impl FromStr for TransactionHash {
	type Err = TransactionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let hex_part = s.trim().trim_start_matches("0x");
		let mut bytes = [0u8; 32];
		hex::decode_to_slice(hex_part, &mut bytes)
			.map_err(|e| TransactionError::InvalidHash(format!("{}: {}", s, e)))?;
		Ok(TransactionHash(bytes))
	}
}

impl Serialize for TransactionHash {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for TransactionHash {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(de::Error::custom)
	}
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub version: u64,
	pub success: bool,
	pub vm_status: String,
	pub gas_used: u64,
}

/// BCS-encodes a single entry function argument.
pub fn encode_arg<T: Serialize>(value: &T) -> Result<Vec<u8>, TransactionError> {
	Ok(bcs::to_bytes(value)?)
}
