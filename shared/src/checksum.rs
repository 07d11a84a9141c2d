//! Payload content-addressing.
//!
//! Two payloads with equal canonical `data` must share the same checksum
//! (P5 in the testable-properties list), so canonicalization has to be
//! stable across key order: `serde_json::Value`'s `BTreeMap`-backed `Map`
//! (the `preserve_order` feature is not enabled) already serializes object
//! keys in sorted order, which is what we rely on here.

/// MD5 hex digest of the canonical JSON encoding of `data`.
pub fn canonical_checksum(data: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(data).expect("Value serialization is infallible");
    format!("{:x}", md5::compute(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_data_same_checksum_regardless_of_construction_order() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(canonical_checksum(&a), canonical_checksum(&b));
    }

    #[test]
    fn different_data_different_checksum() {
        let a = json!({"x": 1});
        let b = json!({"x": 2});
        assert_ne!(canonical_checksum(&a), canonical_checksum(&b));
    }
}
