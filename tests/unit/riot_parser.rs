use serde_json::json;

use match_harvester::fetcher::riot_parser::RiotParser;
use match_harvester::fetcher::FetcherError;
use match_harvester::harvester::ErrorClass;
use match_harvester::registry::PlatformRegistry;
use match_harvester::MatchId;

#[test]
fn test_match_id_normalizes_platform() {
    let id = MatchId::parse(" euw1_7212345678 ").unwrap();
    assert_eq!(id.platform(), "EUW1");
    assert_eq!(id.number(), 7_212_345_678);
    assert_eq!(id.to_string(), "EUW1_7212345678");
    assert_eq!(id, "EUW1_7212345678".parse::<MatchId>().unwrap());
}

#[test]
fn test_match_id_rejects_malformed_input() {
    for bad in ["", "KR", "KR_", "_123", "KR_12a", "K-R_12", "KR_-1"] {
        assert!(MatchId::parse(bad).is_err(), "{bad:?} accepted");
    }
}

#[test]
fn test_match_id_serializes_as_string() {
    let id = MatchId::parse("KR_42").unwrap();
    assert_eq!(serde_json::to_value(&id).unwrap(), json!("KR_42"));
    let back: MatchId = serde_json::from_value(json!("kr_42")).unwrap();
    assert_eq!(back, id);
    assert!(serde_json::from_value::<MatchId>(json!("nope")).is_err());
}

#[test]
fn test_registry_maps_ids_to_platforms() {
    let registry = PlatformRegistry::load().unwrap();
    let entry = registry
        .platform_of(&MatchId::parse("EUW1_1").unwrap())
        .unwrap();
    assert_eq!(entry.platform(), "euw1");
    assert_eq!(entry.region(), "europe");
    assert!(registry.platform_of(&MatchId::parse("XX9_1").unwrap()).is_none());
    assert!(registry.get("KR").is_ok());
}

#[test]
fn test_parse_errors_are_fatal() {
    let err = RiotParser::parse_match_ids(json!({"ids": []})).unwrap_err();
    assert!(matches!(err, FetcherError::Parse(_)));
    assert_eq!(err.class(), ErrorClass::Fatal);

    let err = RiotParser::parse_summoner_puuid(json!({"puuid": ""})).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
}

#[test]
fn test_detail_without_metadata_is_accepted() {
    let id = MatchId::parse("KR_77").unwrap();
    let record = RiotParser::parse_match_detail(
        &id,
        json!({"info": {"queueId": 440, "gameVersion": "14.20.1"}}),
    )
    .unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.queue_id, Some(440));
    assert_eq!(record.game_version.as_deref(), Some("14.20.1"));

    assert!(RiotParser::parse_match_detail(&id, json!([1, 2])).is_err());
}

#[test]
fn test_empty_ladder_page_parses_to_no_units() {
    assert!(RiotParser::parse_league_entries(json!([])).unwrap().is_empty());
    assert!(RiotParser::parse_league_list(json!({"tier": "MASTER", "entries": []}))
        .unwrap()
        .is_empty());
}
