//! HTTP behavior of the ranked API source against a mock server

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use match_harvester::fetcher::riot::RiotSource;
use match_harvester::fetcher::riot_config::EloScope;
use match_harvester::fetcher::{FetcherError, MatchSource};
use match_harvester::harvester::ErrorClass;
use match_harvester::{MatchId, UnitRef};

fn source(server: &MockServer, keys: &[&str], scope: EloScope) -> RiotSource {
    RiotSource::builder("kr", keys.iter().map(|k| k.to_string()).collect())
        .scope(scope)
        .max_pages(2)
        .platform_base_url(server.uri())
        .regional_base_url(server.uri())
        .build()
        .unwrap()
}

async fn fetch_failure(source: &RiotSource, n: u64) -> FetcherError {
    let id = MatchId::parse(&format!("KR_{n}")).unwrap();
    source.fetch_detail(&id).await.unwrap_err()
}

#[tokio::test]
async fn test_apex_page_lists_league_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lol/league/v4/challengerleagues/by-queue/RANKED_SOLO_5x5"))
        .and(header("X-Riot-Token", "key-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tier": "CHALLENGER",
            "entries": [
                { "puuid": "p1" },
                { "summonerId": "s2" },
                { "leaguePoints": 900 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let units = source(&server, &["key-a"], EloScope::All)
        .list_discovery_units(0)
        .await
        .unwrap();

    assert_eq!(units.len(), 2);
    assert_eq!(units[0].puuid.as_deref(), Some("p1"));
    assert_eq!(units[0].tier.as_deref(), Some("CHALLENGER"));
    assert!(units[1].needs_resolution());
}

#[tokio::test]
async fn test_diamond_pages_follow_apex_and_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lol/league/v4/entries/RANKED_SOLO_5x5/DIAMOND/I"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "puuid": "d1", "tier": "DIAMOND" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, &["key-a"], EloScope::All);
    // Pages 0-2 are apex leagues, diamond page 2 is logical page 4
    let units = source.list_discovery_units(4).await.unwrap();
    assert_eq!(units, vec![UnitRef::from_puuid("d1", Some("DIAMOND".to_string()))]);

    // Past max_pages: an empty page without any request
    assert!(source.list_discovery_units(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_candidates_and_detail_use_regional_routes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lol/match/v5/matches/by-puuid/p1/ids"))
        .and(query_param("count", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["KR_11", "KR_12"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lol/match/v5/matches/KR_11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": { "matchId": "KR_11" },
            "info": { "queueId": 420, "participants": [{}, {}] }
        })))
        .mount(&server)
        .await;

    let source = source(&server, &["key-a"], EloScope::All);
    let unit = UnitRef::from_puuid("p1", None);
    let ids = source.list_candidate_identifiers(&unit, 5).await.unwrap();
    assert_eq!(ids.len(), 2);

    let record = source.fetch_detail(&ids[0]).await.unwrap();
    assert_eq!(record.id, MatchId::parse("KR_11").unwrap());
    assert_eq!(record.queue_id, Some(420));
    assert_eq!(record.participant_count(), 2);
}

#[tokio::test]
async fn test_summoner_id_resolves_to_puuid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lol/summoner/v4/summoners/s2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "puuid": "p2" })))
        .mount(&server)
        .await;

    let unit = UnitRef::from_summoner_id("s2", Some("MASTER".to_string()));
    let resolved = source(&server, &["key-a"], EloScope::Apex)
        .resolve_unit(&unit)
        .await
        .unwrap();
    assert_eq!(resolved.puuid.as_deref(), Some("p2"));
    assert_eq!(resolved.tier.as_deref(), Some("MASTER"));
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(path("/lol/match/v5/matches/KR_429"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;
    Mock::given(path("/lol/match/v5/matches/KR_503"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(path("/lol/match/v5/matches/KR_403"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let source = source(&server, &["key-a"], EloScope::All);

    let err = fetch_failure(&source, 429).await;
    assert_eq!(err.class(), ErrorClass::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

    let err = fetch_failure(&source, 503).await;
    assert!(matches!(err, FetcherError::Server { status: 503 }));
    assert_eq!(err.class(), ErrorClass::Transient);

    let err = fetch_failure(&source, 403).await;
    assert!(matches!(err, FetcherError::Client { status: 403, .. }));
    assert_eq!(err.class(), ErrorClass::Fatal);
}

#[tokio::test]
async fn test_keys_rotate_across_requests() {
    let server = MockServer::start().await;
    for key in ["key-a", "key-b"] {
        Mock::given(path("/lol/summoner/v4/summoners/s1"))
            .and(header("X-Riot-Token", key))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "puuid": "p1" })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let source = source(&server, &["key-a", "key-b"], EloScope::All);
    let unit = UnitRef::from_summoner_id("s1", None);
    source.resolve_unit(&unit).await.unwrap();
    source.resolve_unit(&unit).await.unwrap();
    // Expectations are verified when the server drops
}

#[tokio::test]
async fn test_mismatched_payload_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(path("/lol/match/v5/matches/KR_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": { "matchId": "KR_2" },
            "info": {}
        })))
        .mount(&server)
        .await;

    let err = source(&server, &["key-a"], EloScope::All)
        .fetch_detail(&MatchId::parse("KR_1").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
}
