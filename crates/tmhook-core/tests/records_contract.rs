//! Contract Test: Current Records
//!
//! Constraints verified:
//! - Only profiles tagged as managed by this webhook are reported
//! - Each one becomes a CNAME from its hostname tag to its FQDN
//! - The domain filter applies to reported hostnames
//! - One unreachable resource group does not hide the others
//! - Listing fails only when every resource group failed
//! - Profiles another writer deleted stop being reported

mod common;

use std::collections::HashMap;

use common::*;
use tmhook_core::engine::{CNAME_TTL, LABEL_PROFILE, LABEL_RESOURCE_GROUP, LABEL_ROUTING_METHOD};
use tmhook_core::filter::DomainFilter;
use tmhook_core::state::{HOSTNAME_TAG, MANAGED_BY_TAG, MANAGED_BY_VALUE, ProfileState};
use tmhook_core::Endpoint;

fn remote_profile(resource_group: &str, name: &str, hostname: Option<&str>, managed: bool) -> ProfileState {
    let mut profile = ProfileState::new(name, resource_group);
    profile.fqdn = format!("{}.trafficmanager.net", name);
    profile.routing_method = "Weighted".to_string();
    if managed {
        profile
            .tags
            .insert(MANAGED_BY_TAG.to_string(), MANAGED_BY_VALUE.to_string());
    }
    if let Some(hostname) = hostname {
        profile
            .tags
            .insert(HOSTNAME_TAG.to_string(), hostname.to_string());
    }
    profile
}

#[tokio::test]
async fn reports_managed_profiles_as_cnames() {
    let remote = FakeTrafficManager::new();
    remote.insert_profile(remote_profile(RG, "demo-tm", Some("demo.example.com"), true));
    remote.insert_profile(remote_profile(RG, "foreign-tm", Some("foreign.example.com"), false));
    remote.insert_profile(remote_profile(RG, "untagged-tm", None, true));

    let (engine, _rx) = engine(&remote, &RecordingPublisher::new());
    let records = engine.records().await.unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.dns_name, "demo.example.com");
    assert_eq!(record.record_type, "CNAME");
    assert_eq!(record.targets, vec!["demo-tm.trafficmanager.net"]);
    assert_eq!(record.record_ttl, CNAME_TTL);
    assert_eq!(
        record.labels,
        HashMap::from([
            (LABEL_PROFILE.to_string(), "demo-tm".to_string()),
            (LABEL_RESOURCE_GROUP.to_string(), RG.to_string()),
            (LABEL_ROUTING_METHOD.to_string(), "Weighted".to_string()),
        ])
    );

    // Listing also warms the mirror
    assert!(engine.mirror().get("demo.example.com").await.is_some());
    assert!(engine.mirror().get("foreign.example.com").await.is_none());
}

#[tokio::test]
async fn records_are_sorted_and_filtered_by_domain() {
    let remote = FakeTrafficManager::new();
    remote.insert_profile(remote_profile(RG, "b-tm", Some("b.example.com"), true));
    remote.insert_profile(remote_profile(RG, "a-tm", Some("a.example.com"), true));
    remote.insert_profile(remote_profile(RG, "other-tm", Some("app.example.org"), true));
    remote.insert_profile(remote_profile(RG, "skip-tm", Some("skip.example.com"), true));

    let mut config = minimal_config();
    config.domain_filter = DomainFilter {
        include: vec!["example.com".to_string()],
        exclude: vec!["skip.example.com".to_string()],
    };
    let (engine, _rx) = engine_with_config(&remote, &RecordingPublisher::new(), config);

    let names: Vec<_> = engine
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.dns_name)
        .collect();

    assert_eq!(names, vec!["a.example.com", "b.example.com"]);
}

#[tokio::test]
async fn created_profiles_show_up_in_records() {
    let remote = FakeTrafficManager::new();
    let (engine, _rx) = engine(&remote, &RecordingPublisher::new());

    engine
        .create(&tm_endpoint(
            "demo-east.example.com",
            "A",
            &[("hostname", "demo.example.com")],
        ))
        .await
        .unwrap();

    let records = engine.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dns_name, "demo.example.com");
    assert_eq!(records[0].targets, vec!["demo-example-com-tm.trafficmanager.net"]);
}

#[tokio::test]
async fn profiles_deleted_by_another_writer_drop_out() {
    let remote_a = FakeTrafficManager::new();
    let remote_b = FakeTrafficManager::sharing_state_with(&remote_a);
    let (writer_a, _rx_a) = engine(&remote_a, &RecordingPublisher::new());
    let (writer_b, _rx_b) = engine(&remote_b, &RecordingPublisher::new());

    let endpoint = tm_endpoint("app.example.com", "A", &[]);
    writer_a.create(&endpoint).await.unwrap();
    writer_b.delete(&endpoint).await.unwrap();
    assert_eq!(remote_a.profile_count(), 0);

    assert!(writer_a.records().await.unwrap().is_empty());
    assert!(writer_a.mirror().get("app.example.com").await.is_none());
}

#[tokio::test]
async fn failed_listing_keeps_that_groups_entries() {
    let remote = FakeTrafficManager::new();
    remote.insert_profile(remote_profile(RG, "demo-tm", Some("demo.example.com"), true));

    let mut config = minimal_config();
    config.resource_groups = vec![RG.to_string(), "rg-empty".to_string()];
    let (engine, _rx) = engine_with_config(&remote, &RecordingPublisher::new(), config);
    assert_eq!(engine.records().await.unwrap().len(), 1);

    remote.fail_listing(RG);
    let records = engine.records().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dns_name, "demo.example.com");
}

#[tokio::test]
async fn one_failing_resource_group_is_tolerated() {
    let remote = FakeTrafficManager::new();
    remote.insert_profile(remote_profile(RG, "demo-tm", Some("demo.example.com"), true));
    remote.fail_listing("rg-locked");

    let mut config = minimal_config();
    config.resource_groups = vec!["rg-locked".to_string(), RG.to_string()];
    let (engine, _rx) = engine_with_config(&remote, &RecordingPublisher::new(), config);

    let records = tokio_test::assert_ok!(engine.records().await);
    assert_eq!(records.len(), 1);
    assert_eq!(remote.calls(Op::ListProfiles), 2);
}

#[tokio::test]
async fn every_resource_group_failing_is_an_error() {
    let remote = FakeTrafficManager::new();
    remote.fail_listing(RG);

    let (engine, _rx) = engine(&remote, &RecordingPublisher::new());
    let err = tokio_test::assert_err!(engine.records().await);

    assert!(matches!(err, tmhook_core::Error::Authentication(_)));
}

#[tokio::test]
async fn no_resource_groups_reports_only_the_mirror() {
    let remote = FakeTrafficManager::new();
    remote.insert_profile(remote_profile(RG, "demo-tm", Some("demo.example.com"), true));

    let mut config = minimal_config();
    config.resource_groups.clear();
    let (engine, _rx) = engine_with_config(&remote, &RecordingPublisher::new(), config);

    assert!(engine.records().await.unwrap().is_empty());
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn adjust_endpoints_passes_through_by_default() {
    let remote = FakeTrafficManager::new();
    let (engine, _rx) = engine(&remote, &RecordingPublisher::new());

    let input = vec![tm_endpoint("app.example.com", "A", &[("weight", "10")])];
    assert_eq!(engine.adjust_endpoints(input.clone()), input);
}

#[tokio::test]
async fn adjust_endpoints_can_copy_properties_to_labels() {
    let remote = FakeTrafficManager::new();
    let mut config = minimal_config();
    config.engine.copy_annotations_to_labels = true;
    let (engine, _rx) = engine_with_config(&remote, &RecordingPublisher::new(), config);

    let input = vec![
        tm_endpoint("app.example.com", "A", &[("weight", "10")])
            .with_property("aws/evaluate-target-health", "true"),
        Endpoint::new("plain.example.com", "A"),
    ];
    let adjusted = engine.adjust_endpoints(input);

    assert_eq!(adjusted.len(), 2);
    let labels = &adjusted[0].labels;
    assert_eq!(labels.get("webhook/traffic-manager-weight").map(String::as_str), Some("10"));
    assert!(!labels.contains_key("aws/evaluate-target-health"));
    assert!(adjusted[1].labels.is_empty());
    assert_eq!(adjusted[0].provider_specific.len(), 5);
}
