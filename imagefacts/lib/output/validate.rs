use serde_json::Value;

use crate::{
    reference::DIGEST_REGEX, ImageFactsError, ImageFactsResult,
};

use super::FACTS_SCHEMA_VERSION;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Validates raw `facts.json` bytes against the v1 schema contracts, in order.
///
/// The checks run over the raw JSON tree rather than the typed envelope so the first failing
/// contract is named precisely instead of surfacing as a deserialization error.
pub fn validate_facts_json(data: &[u8]) -> ImageFactsResult<()> {
    let root: Value = serde_json::from_slice(data)
        .map_err(|err| ImageFactsError::FactsValidation(format!("invalid JSON: {}", err)))?;

    let Some(envelope) = root.as_object() else {
        return Err(ImageFactsError::FactsValidation(
            "invalid JSON: document is not an object".to_string(),
        ));
    };

    match envelope.get("version").and_then(Value::as_str) {
        None => {
            return Err(ImageFactsError::FactsValidation(
                "missing version field".to_string(),
            ))
        }
        Some(version) if version != FACTS_SCHEMA_VERSION => {
            return Err(ImageFactsError::FactsValidation(format!(
                "unsupported version: {}",
                version
            )))
        }
        Some(_) => {}
    }

    let Some(facts) = envelope.get("facts").and_then(Value::as_object) else {
        return Err(ImageFactsError::FactsValidation(
            "missing facts field".to_string(),
        ));
    };

    for (reference, image_facts) in facts {
        validate_image_facts(reference, image_facts)?;
    }

    if let Some(summary) = envelope.get("summary").and_then(Value::as_object) {
        let total_images = summary
            .get("totalImages")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize;
        if total_images != facts.len() {
            return Err(ImageFactsError::FactsValidation(format!(
                "summary.totalImages {} does not match facts count {}",
                total_images,
                facts.len()
            )));
        }

        let total_size = summary
            .get("totalSize")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        if total_size < 0 {
            return Err(ImageFactsError::FactsValidation(
                "summary.totalSize is negative".to_string(),
            ));
        }
    } else if !facts.is_empty() {
        return Err(ImageFactsError::FactsValidation(format!(
            "summary.totalImages 0 does not match facts count {}",
            facts.len()
        )));
    }

    Ok(())
}

/// Validates one facts record within the envelope.
fn validate_image_facts(reference: &str, image_facts: &Value) -> ImageFactsResult<()> {
    let field_str = |field: &str| {
        image_facts
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    };

    if field_str("repository").is_empty() {
        return Err(ImageFactsError::FactsValidation(format!(
            "image {}: repository is empty",
            reference
        )));
    }

    if field_str("registry").is_empty() {
        return Err(ImageFactsError::FactsValidation(format!(
            "image {}: registry is empty",
            reference
        )));
    }

    let platform = image_facts.get("platform");
    let platform_str = |field: &str| {
        platform
            .and_then(|value| value.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    };

    if platform_str("architecture").is_empty() {
        return Err(ImageFactsError::FactsValidation(format!(
            "image {}: platform.architecture is empty",
            reference
        )));
    }

    if platform_str("os").is_empty() {
        return Err(ImageFactsError::FactsValidation(format!(
            "image {}: platform.os is empty",
            reference
        )));
    }

    if let Some(digest) = image_facts.get("digest").and_then(Value::as_str) {
        if !DIGEST_REGEX.is_match(digest) {
            return Err(ImageFactsError::FactsValidation(format!(
                "image {}: digest {} does not match sha256:<64 hex>",
                reference, digest
            )));
        }
    }

    if image_facts
        .get("size")
        .and_then(Value::as_i64)
        .unwrap_or_default()
        < 0
    {
        return Err(ImageFactsError::FactsValidation(format!(
            "image {}: size is negative",
            reference
        )));
    }

    let layers = image_facts
        .get("layers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for (index, layer) in layers.iter().enumerate() {
        let layer_str = |field: &str| {
            layer
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
        };

        if layer_str("digest").is_empty() {
            return Err(ImageFactsError::FactsValidation(format!(
                "image {}: layer {} digest is empty",
                reference, index
            )));
        }

        if layer.get("size").and_then(Value::as_i64).unwrap_or_default() <= 0 {
            return Err(ImageFactsError::FactsValidation(format!(
                "image {}: layer {} size must be positive",
                reference, index
            )));
        }

        if layer_str("mediaType").is_empty() {
            return Err(ImageFactsError::FactsValidation(format!(
                "image {}: layer {} mediaType is empty",
                reference, index
            )));
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> String {
        format!(
            r#"{{
                "version": "v1",
                "timestamp": "2024-03-01T12:00:00Z",
                "facts": {{
                    "alpine:latest": {{
                        "repository": "library/alpine",
                        "tag": "latest",
                        "digest": "sha256:{}",
                        "registry": "index.docker.io",
                        "size": 3207,
                        "created": "2024-02-01T00:00:00Z",
                        "platform": {{"architecture": "amd64", "os": "linux"}},
                        "layers": [
                            {{
                                "digest": "sha256:{}",
                                "size": 3207,
                                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip"
                            }}
                        ]
                    }}
                }},
                "summary": {{
                    "totalImages": 1,
                    "registries": {{"index.docker.io": 1}},
                    "platforms": {{"linux/amd64": 1}},
                    "totalSize": 3207,
                    "largestImageSize": 3207
                }}
            }}"#,
            "0".repeat(64),
            "1".repeat(64),
        )
    }

    #[test]
    fn test_validate_accepts_well_formed_v1_body() {
        validate_facts_json(valid_body().as_bytes()).unwrap();
    }

    #[test]
    fn test_validate_rejects_garbage_bytes() {
        let err = validate_facts_json(b"not json at all").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_validate_rejects_missing_version() {
        let err = validate_facts_json(br#"{"facts": {}}"#).unwrap_err();
        assert!(err.to_string().contains("missing version"));
    }

    #[test]
    fn test_validate_rejects_unsupported_version() {
        let err = validate_facts_json(br#"{"version": "v2", "facts": {}}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn test_validate_rejects_missing_facts() {
        let err = validate_facts_json(br#"{"version": "v1"}"#).unwrap_err();
        assert!(err.to_string().contains("missing facts"));
    }

    #[test]
    fn test_validate_accepts_empty_facts() {
        validate_facts_json(br#"{"version": "v1", "facts": {}}"#).unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_repository() {
        let body = valid_body().replace(r#""repository": "library/alpine","#, "");
        let err = validate_facts_json(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("repository"));
    }

    #[test]
    fn test_validate_rejects_malformed_digest() {
        for bad in [
            format!("md5:{}", "0".repeat(64)),
            format!("sha256:{}", "0".repeat(63)),
            format!("sha256:{}", "g".repeat(64)),
        ] {
            let body = valid_body().replace(
                &format!("sha256:{}", "0".repeat(64)),
                &bad,
            );
            let err = validate_facts_json(body.as_bytes()).unwrap_err();
            assert!(err.to_string().contains("digest"), "accepted {}", bad);
        }
    }

    #[test]
    fn test_validate_rejects_zero_layer_size() {
        let body = valid_body().replace(r#""size": 3207,
                                "mediaType""#, r#""size": 0,
                                "mediaType""#);
        let err = validate_facts_json(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("layer 0 size"));
    }

    #[test]
    fn test_validate_rejects_summary_count_mismatch() {
        let body = valid_body().replace(r#""totalImages": 1"#, r#""totalImages": 5"#);
        let err = validate_facts_json(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("totalImages"));
    }
}
