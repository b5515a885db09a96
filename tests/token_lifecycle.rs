//! Token lifecycle and gate properties.
//!
//! - Concurrent issuance never hands out the same token twice
//! - Tokens survive the cache layer unchanged and still expire
//! - Gate decisions hold for generated inputs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use cypher_embed::{
    CacheConfig, CachedTokenStore, EmbedRecord, EmbedToken, GateConfig, GraphValue, InMemoryTokenStore, Params,
    QueryGate, RejectionReason, TokenConfig, TokenService,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_yields_distinct_tokens() {
    let service = Arc::new(TokenService::new(
        Arc::new(InMemoryTokenStore::new()),
        TokenConfig::default(),
    ));

    let handles: Vec<_> = (0..1000)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .issue_embed(&format!("MATCH (n) RETURN n LIMIT {}", i), None)
                    .await
                    .map(|record| record.token().clone())
            })
        })
        .collect();

    let mut tokens = HashSet::new();
    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert!(tokens.insert(token));
    }

    assert_eq!(tokens.len(), 1000);
    assert_eq!(service.store().len(), 1000);
}

#[tokio::test]
async fn test_cached_store_still_enforces_expiry() {
    let store = Arc::new(CachedTokenStore::new(InMemoryTokenStore::new(), CacheConfig::default()));
    let service = TokenService::new(Arc::clone(&store), TokenConfig::default());

    let issued = service.issue_embed("MATCH (n) RETURN n", Some(1)).await.unwrap();
    let token = issued.token().as_str();

    // Two reads: the second is served from cache
    service.get_embed_data(token).await.unwrap();
    service.get_embed_data(token).await.unwrap();
    assert!(store.cache_stats().unwrap().hits >= 1);

    let after_expiry = issued.expires_at() + Duration::seconds(1);
    assert!(service.get_embed_data_at(token, after_expiry).await.is_err());
}

#[tokio::test]
async fn test_purge_then_lookup() {
    let store = Arc::new(InMemoryTokenStore::new());
    let service = TokenService::new(Arc::clone(&store), TokenConfig::default());
    let expired = EmbedRecord::new(
        EmbedToken::generate(),
        "MATCH (n) RETURN n",
        Utc::now() - Duration::days(10),
        Duration::days(1),
    );
    store.put(expired.clone());

    assert!(service.get_embed_data(expired.token().as_str()).await.is_err());
    assert_eq!(service.purge_expired().await.unwrap(), 1);
    assert!(service.get_embed_data(expired.token().as_str()).await.is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

fn read_only_gate() -> QueryGate {
    QueryGate::new(GateConfig::default())
}

fn keyword() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "CREATE", "MERGE", "DELETE", "SET", "REMOVE", "DROP", "FOREACH", "LOAD",
    ])
}

/// Any run of characters the graph database accepts between two tokens.
fn separator() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            ' ', '\t', '\n', '\r', '\u{b}', '\u{c}', '\u{85}', '\u{a0}', '\u{1680}', '\u{2000}', '\u{2003}',
            '\u{2007}', '\u{200a}', '\u{2028}', '\u{2029}', '\u{202f}', '\u{205f}', '\u{3000}',
        ]),
        1..4,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn mixed_case(word: &str, mask: u32) -> String {
    word.chars()
        .enumerate()
        .map(|(i, c)| {
            if mask & (1 << (i % 32)) != 0 {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_generated_tokens_parse_back(_seed in any::<u8>()) {
        let token = EmbedToken::generate();
        prop_assert_eq!(token.as_str().len(), 48);
        prop_assert_eq!(EmbedToken::parse(token.as_str()), Some(token.clone()));
    }

    #[test]
    fn prop_write_keywords_rejected_in_any_case(
        word in keyword(),
        mask in any::<u32>(),
        before in separator(),
        after in separator(),
    ) {
        let query = format!("MATCH (n){}{}{}n.x = 1", before, mixed_case(word, mask), after);
        let result = read_only_gate().validate_structure(&query);
        prop_assert!(
            matches!(result, Err(RejectionReason::WriteClause(_))),
            "accepted {:?}",
            query
        );
    }

    #[test]
    fn prop_keywords_as_property_keys_are_accepted(word in keyword(), mask in any::<u32>(), sep in separator()) {
        let query = format!("MATCH{}(n){}RETURN n.{}", sep, sep, mixed_case(word, mask));
        prop_assert!(read_only_gate().validate_structure(&query).is_ok(), "rejected {:?}", query);
    }

    #[test]
    fn prop_comments_hide_keywords(word in keyword()) {
        let query = format!("MATCH (n) /* {} */ RETURN n // {}", word, word);
        prop_assert!(read_only_gate().validate_structure(&query).is_ok());
    }

    #[test]
    fn prop_supplied_parameters_must_match(names in prop::collection::btree_set("[a-z]{1,8}", 1..4), extra in "[A-Z]{1,4}") {
        let clauses: Vec<String> = names.iter().map(|n| format!("n.{} = ${}", n, n)).collect();
        let query = format!("MATCH (n) WHERE {} RETURN n", clauses.join(" AND "));

        let mut params: Params = names
            .iter()
            .map(|n| (n.clone(), GraphValue::Int(1)))
            .collect();
        prop_assert!(read_only_gate().validate(&query, &params).is_ok());

        params.insert(extra.clone(), GraphValue::Null);
        prop_assert_eq!(
            read_only_gate().validate(&query, &params),
            Err(RejectionReason::UnusedParameter(extra))
        );
    }
}
