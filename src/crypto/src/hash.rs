//! SHA-256 helpers. Used by the coordinator election (§4.2: a keyed,
//! deterministic hash of the job id, never a language-level object hash) and
//! by the ledger for content-addressable entry ids (§4.6).

use sha2::{Digest, Sha256};

/// `SHA-256(job_id)[:4]` interpreted as a big-endian u32, per §4.2 step 4.
pub fn job_id_hash_u32(job_id: &str) -> u32 {
    let digest = Sha256::digest(job_id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Full digest, hex-encoded, for content-addressable ids derived from a set
/// of canonical fields (e.g. a ledger entry's `{ts, from, to, amount,
/// tx_type, job_id, balance_after}` tuple).
pub fn content_id_hex(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_hash_is_deterministic() {
        assert_eq!(job_id_hash_u32("job-42"), job_id_hash_u32("job-42"));
    }

    #[test]
    fn different_job_ids_usually_hash_differently() {
        assert_ne!(job_id_hash_u32("job-1"), job_id_hash_u32("job-2"));
    }

    #[test]
    fn content_id_is_stable_and_sensitive_to_each_field() {
        let a = content_id_hex(&["1", "alice", "bob", "10.0"]);
        let b = content_id_hex(&["1", "alice", "bob", "10.0"]);
        let c = content_id_hex(&["2", "alice", "bob", "10.0"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
