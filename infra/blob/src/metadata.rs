use crate::error::BlobError;
use std::collections::BTreeMap;

/// Lower-cases metadata keys, rejecting empty keys and case-insensitive duplicates.
///
/// Providers disagree on key case; forcing lowercase on both write and read keeps
/// behavior identical across backends.
pub(crate) fn normalize(
    metadata: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, BlobError> {
    let mut out = BTreeMap::new();
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(BlobError::invalid("metadata keys may not be empty strings"));
        }
        let lower = key.to_lowercase();
        if out.contains_key(&lower) {
            return Err(BlobError::invalid(format!(
                "duplicate case-insensitive metadata key: {lower:?}"
            )));
        }
        out.insert(lower, value.clone());
    }
    Ok(out)
}

/// Read-side counterpart of [`normalize`]; last value wins on collision.
pub(crate) fn lowercase_keys(metadata: BTreeMap<String, String>) -> BTreeMap<String, String> {
    metadata.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn keys_are_lowercased() {
        let md = normalize(&map(&[("Foo", "a"), ("BAR-Baz", "b")])).unwrap();
        assert_eq!(md, map(&[("foo", "a"), ("bar-baz", "b")]));
    }

    #[test]
    fn case_insensitive_duplicates_fail() {
        let err = normalize(&map(&[("Foo", "a"), ("foo", "b")])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("\"foo\""));
    }

    #[test]
    fn empty_key_fails() {
        let err = normalize(&map(&[("", "a")])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    proptest::proptest! {
        #[test]
        fn normalized_keys_are_lowercase(keys in proptest::collection::btree_set("[a-zA-Z-]{1,8}", 0..8)) {
            let md: BTreeMap<String, String> = keys.iter().map(|k| (k.clone(), String::new())).collect();
            let distinct: std::collections::BTreeSet<String> = keys.iter().map(|k| k.to_lowercase()).collect();
            match normalize(&md) {
                Ok(out) => {
                    proptest::prop_assert_eq!(out.len(), md.len());
                    proptest::prop_assert!(out.keys().all(|k| *k == k.to_lowercase()));
                }
                Err(_) => proptest::prop_assert!(distinct.len() < keys.len()),
            }
        }
    }
}
