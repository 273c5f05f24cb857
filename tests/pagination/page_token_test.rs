#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    use mantis_metrics::pagination::{PageKey, PageToken, PageTokenError};
    use mantis_metrics::result::Value;

    use super::common::utc;

    #[test]
    fn test_mixed_keys_survive_encoding() {
        let token = PageToken::new(vec![
            PageKey::Timestamp(utc("2024-01-02T12:00:00Z")),
            PageKey::String("Trøndelag".into()),
            PageKey::Null,
            PageKey::Bool(true),
            PageKey::Float(2.5),
            PageKey::Int(-3),
        ]);
        let decoded = PageToken::decode_for(&token.encode(), 6).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_zero_timestamp_round_trips() {
        let token = PageToken::new(vec![
            PageKey::Timestamp(utc("0001-01-01T00:00:00Z")),
            PageKey::String(String::new()),
        ]);
        assert_eq!(PageToken::decode(&token.encode()).unwrap(), token);
    }

    #[test]
    fn test_timestamp_keys_bind_as_rfc3339() {
        let key = PageKey::from_value(&Value::from("2024-01-02T12:00:00Z"), true).unwrap();
        assert_eq!(key.to_param(), serde_json::json!("2024-01-02T12:00:00Z"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(
            PageToken::decode("%%%").unwrap_err(),
            PageTokenError::InvalidEncoding
        );

        let wrong_shape = URL_SAFE_NO_PAD.encode(br#"[{"type":"int","value":"seven"}]"#);
        assert!(matches!(
            PageToken::decode(&wrong_shape).unwrap_err(),
            PageTokenError::InvalidPayload(_)
        ));
    }

    #[test]
    fn test_token_from_another_sort_is_rejected() {
        let token = PageToken::new(vec![PageKey::Int(1), PageKey::Int(2)]).encode();
        assert_eq!(
            PageToken::decode_for(&token, 3).unwrap_err(),
            PageTokenError::KeyCount {
                expected: 3,
                actual: 2
            }
        );
    }
}
