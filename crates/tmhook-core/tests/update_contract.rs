//! Contract Test: Minimal Updates
//!
//! An update rewrites only what changed between the old and new annotations.
//!
//! Constraints verified:
//! - Weight-only change → one endpoint write, no profile write
//! - Profile-only change → one profile write, no endpoint write
//! - Unparsable or disabled old config → everything is rewritten
//! - Endpoints that did not exist in the old version are always written
//! - The mirror is refreshed after every update
//! - A new profile identity (name, resource group or hostname) is written in
//!   full and the endpoints under the old identity are retired
//! - Unchanged settings are still rewritten when the remote lost them

mod common;

use common::*;
use tmhook_core::engine::ChangeOutcome;

async fn seeded(
    endpoint: &tmhook_core::Endpoint,
) -> (
    FakeTrafficManager,
    tmhook_core::TrafficManagerEngine,
) {
    let remote = FakeTrafficManager::new();
    let (engine, _rx) = engine(&remote, &RecordingPublisher::new());
    engine.create(endpoint).await.unwrap();
    remote.reset_calls();
    (remote, engine)
}

#[tokio::test]
async fn weight_only_change_writes_only_the_endpoint() {
    let old = tm_endpoint("demo-east.example.com", "A", &[("weight", "50")]);
    let new = tm_endpoint("demo-east.example.com", "A", &[("weight", "75")]);
    let (remote, engine) = seeded(&old).await;

    let outcome = engine.update(&old, &new).await.unwrap();

    assert_eq!(remote.calls(Op::UpsertEndpoint), 1);
    assert_eq!(remote.calls(Op::UpsertProfile), 0);
    assert!(matches!(outcome, ChangeOutcome::Applied(ref keys) if keys.len() == 1));

    let profile = remote.profile(RG, "demo-east-example-com-tm").unwrap();
    assert_eq!(profile.endpoints["demo-east-example-com"].weight, 75);

    let cached = engine.mirror().get("demo-east.example.com").await.unwrap();
    assert_eq!(cached.endpoints["demo-east-example-com"].weight, 75);
}

#[tokio::test]
async fn profile_only_change_writes_only_the_profile() {
    let old = tm_endpoint("demo.example.com", "A", &[("routing-method", "Weighted")]);
    let new = tm_endpoint(
        "demo.example.com",
        "A",
        &[("routing-method", "Priority"), ("dns-ttl", "60")],
    );
    let (remote, engine) = seeded(&old).await;

    let outcome = engine.update(&old, &new).await.unwrap();

    assert_eq!(remote.calls(Op::UpsertProfile), 1);
    assert_eq!(remote.calls(Op::UpsertEndpoint), 0);
    assert_eq!(outcome, ChangeOutcome::Applied(Vec::new()));

    let profile = remote.profile(RG, "demo-example-com-tm").unwrap();
    assert_eq!(profile.routing_method, "Priority");
    assert_eq!(profile.dns_ttl, 60);
}

#[tokio::test]
async fn unchanged_update_only_refreshes() {
    let endpoint = tm_endpoint("demo.example.com", "A", &[("weight", "10")]);
    let (remote, engine) = seeded(&endpoint).await;

    engine.update(&endpoint, &endpoint).await.unwrap();

    assert_eq!(remote.write_calls(), 0);
    assert_eq!(remote.calls(Op::GetProfile), 1);
}

#[tokio::test]
async fn unparsable_or_disabled_old_config_rewrites_everything() {
    let new = tm_endpoint("demo.example.com", "A", &[("weight", "20")]);
    let olds = [
        tm_endpoint("demo.example.com", "A", &[("weight", "abc")]),
        tm_endpoint("demo.example.com", "A", &[("enabled", "false")]),
        tmhook_core::Endpoint::new("demo.example.com", "A"),
    ];

    for old in olds {
        let (remote, engine) = seeded(&new).await;
        engine.update(&old, &new).await.unwrap();

        assert_eq!(remote.calls(Op::UpsertProfile), 1);
        assert_eq!(remote.calls(Op::UpsertEndpoint), 1);
    }
}

#[tokio::test]
async fn new_targets_are_written_even_when_settings_match() {
    let old = tm_endpoint("app.example.com", "CNAME", &[("endpoint-name", "app")])
        .with_targets(["east.example.net"]);
    let new = tm_endpoint("app.example.com", "CNAME", &[("endpoint-name", "app")])
        .with_targets(["east.example.net", "west.example.net"]);
    let (remote, engine) = seeded(&old).await;

    engine.update(&old, &new).await.unwrap();

    // "app" becomes "app-0" and "app-1"
    assert_eq!(remote.calls(Op::UpsertEndpoint), 2);
    assert_eq!(remote.calls(Op::UpsertProfile), 0);

    let profile = remote.profile(RG, "app-example-com-tm").unwrap();
    assert!(profile.endpoints.contains_key("app-0"));
    assert!(profile.endpoints.contains_key("app-1"));
}

#[tokio::test]
async fn invalid_new_config_is_rejected_without_writes() {
    let old = tm_endpoint("demo.example.com", "A", &[]);
    let new = tm_endpoint("demo.example.com", "A", &[("priority", "0")]);
    let (remote, engine) = seeded(&old).await;

    let err = tokio_test::assert_err!(engine.update(&old, &new).await);

    assert!(err.is_config());
    assert!(err.to_string().contains("priority"));
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn refresh_failure_does_not_fail_the_update() {
    let old = tm_endpoint("demo.example.com", "A", &[("weight", "1")]);
    let new = tm_endpoint("demo.example.com", "A", &[("weight", "2")]);
    let (remote, engine) = seeded(&old).await;
    remote.fail(Op::GetProfile, || tmhook_core::Error::http("timeout"));

    tokio_test::assert_ok!(engine.update(&old, &new).await);
    assert_eq!(remote.calls(Op::UpsertEndpoint), 1);

    // Mirror still holds the state cached by the create
    let cached = engine.mirror().get("demo.example.com").await.unwrap();
    assert_eq!(cached.endpoints["demo-example-com"].weight, 1);
}

#[tokio::test]
async fn hostname_change_moves_the_endpoint_to_a_new_profile() {
    let old = tm_endpoint("app-east.example.com", "A", &[("hostname", "old.example.com")]);
    let new = tm_endpoint("app-east.example.com", "A", &[("hostname", "new.example.com")]);
    let remote = FakeTrafficManager::new();
    let publisher = RecordingPublisher::new();
    let (engine, _rx) = engine(&remote, &publisher);
    engine.create(&old).await.unwrap();

    let outcome = engine.update(&old, &new).await.unwrap();

    assert!(matches!(outcome, ChangeOutcome::Applied(ref keys) if keys.len() == 1));
    let profile = remote.profile(RG, "new-example-com-tm").unwrap();
    assert!(profile.endpoints.contains_key("app-east-example-com"));
    assert!(remote.profile(RG, "old-example-com-tm").is_none());

    assert!(engine.mirror().get("new.example.com").await.is_some());
    assert!(engine.mirror().get("old.example.com").await.is_none());

    let hostnames: Vec<_> = publisher.published().into_iter().map(|p| p.1).collect();
    assert_eq!(hostnames, vec!["old.example.com", "new.example.com"]);
    assert_eq!(publisher.deleted().len(), 1);
}

#[tokio::test]
async fn profile_name_change_moves_the_endpoint() {
    let old = tm_endpoint("demo.example.com", "A", &[("profile-name", "a-tm")]);
    let new = tm_endpoint("demo.example.com", "A", &[("profile-name", "b-tm")]);
    let (remote, engine) = seeded(&old).await;

    engine.update(&old, &new).await.unwrap();

    assert_eq!(remote.calls(Op::UpsertProfile), 1);
    assert_eq!(remote.calls(Op::UpsertEndpoint), 1);
    assert_eq!(remote.calls(Op::DeleteEndpoint), 1);
    assert_eq!(remote.calls(Op::DeleteProfile), 1);

    let profile = remote.profile(RG, "b-tm").unwrap();
    assert!(profile.endpoints.contains_key("demo-example-com"));
    assert!(remote.profile(RG, "a-tm").is_none());
    assert_eq!(remote.profile_count(), 1);
}

#[tokio::test]
async fn hostname_change_on_a_named_profile_keeps_the_profile() {
    let old = tm_endpoint(
        "app-east.example.com",
        "A",
        &[("profile-name", "shared-tm"), ("hostname", "old.example.com")],
    );
    let new = tm_endpoint(
        "app-east.example.com",
        "A",
        &[("profile-name", "shared-tm"), ("hostname", "new.example.com")],
    );
    let remote = FakeTrafficManager::new();
    let publisher = RecordingPublisher::new();
    let (engine, _rx) = engine(&remote, &publisher);
    engine.create(&old).await.unwrap();

    engine.update(&old, &new).await.unwrap();

    let profile = remote.profile(RG, "shared-tm").unwrap();
    assert!(profile.endpoints.contains_key("app-east-example-com"));
    assert_eq!(remote.calls(Op::DeleteProfile), 0);

    assert!(engine.mirror().get("new.example.com").await.is_some());
    assert!(engine.mirror().get("old.example.com").await.is_none());
    assert_eq!(publisher.deleted().len(), 1);
    assert_eq!(publisher.published().last().unwrap().1, "new.example.com");
}

#[tokio::test]
async fn unchanged_update_recreates_a_profile_deleted_out_of_band() {
    let endpoint = tm_endpoint("demo.example.com", "A", &[("weight", "10")]);
    let (remote, engine) = seeded(&endpoint).await;
    remote.remove_profile(RG, "demo-example-com-tm");

    let outcome = engine.update(&endpoint, &endpoint).await.unwrap();

    assert_eq!(remote.calls(Op::UpsertProfile), 1);
    assert_eq!(remote.calls(Op::UpsertEndpoint), 1);
    assert!(matches!(outcome, ChangeOutcome::Applied(ref keys) if keys.len() == 1));

    let profile = remote.profile(RG, "demo-example-com-tm").unwrap();
    assert_eq!(profile.endpoints["demo-example-com"].weight, 10);
}

#[tokio::test]
async fn unchanged_update_restores_an_endpoint_deleted_out_of_band() {
    let endpoint = tm_endpoint("demo.example.com", "A", &[("weight", "10")]);
    let (remote, engine) = seeded(&endpoint).await;
    remote.remove_endpoint(RG, "demo-example-com-tm", "demo-example-com");

    engine.update(&endpoint, &endpoint).await.unwrap();

    assert_eq!(remote.calls(Op::UpsertProfile), 0);
    assert_eq!(remote.calls(Op::UpsertEndpoint), 1);

    let cached = engine.mirror().get("demo.example.com").await.unwrap();
    assert!(cached.endpoints.contains_key("demo-example-com"));
}
