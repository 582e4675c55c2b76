//! Shared primitive types used across the entire engine.

/// Money in minor units (cents). All arithmetic on amounts stays integral.
pub type MinorUnits = i64;

/// Identity of a single extracted document record.
/// Re-extraction of the same paper produces a new id.
pub type DocumentId = String;

/// A stable vendor reference supplied by the extraction collaborator.
pub type VendorId = String;

/// Identity of a contract in a reconciliation pair.
pub type ContractId = String;

/// Namespace for every deterministic id the engine derives.
const ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6d2f_1c4e_8a3b_4f0e_9b7d_2e5a_c0f1_3d84);

/// UUIDv5 over the `|`-joined parts. Same parts, same id, every run.
pub fn stable_id(parts: &[&str]) -> String {
    uuid::Uuid::new_v5(&ID_NAMESPACE, parts.join("|").as_bytes()).to_string()
}
