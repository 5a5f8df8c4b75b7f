use clap::Parser;
use serde_json::json;

use super::*;

#[test]
fn list_arguments_parse_into_query_dimensions() {
    let cli = Cli::try_parse_from([
        "console", "--kind", "domain", "list", "--page", "2", "--page-size", "25", "--filter",
        "blocked", "--sort", "_id", "--sort", "_id",
    ])
    .expect("parse");
    assert_eq!(cli.kind, ResourceKind::Domain);
    match cli.command {
        Command::List {
            page,
            page_size,
            filter,
            sort,
            search,
        } => {
            assert_eq!(page, 2);
            assert_eq!(page_size, 25);
            assert_eq!(filter, Some(Filter::Blocked));
            assert_eq!(sort, vec!["_id", "_id"]);
            assert!(search.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn unknown_kind_is_rejected() {
    assert!(Cli::try_parse_from(["console", "--kind", "hosts", "ventilate"]).is_err());
}

#[test]
fn export_defaults_to_plural_file_name() {
    assert_eq!(
        default_export_path(ResourceKind::MasterDomain),
        PathBuf::from("masterdomains.json")
    );
}

#[test]
fn rows_show_kind_specific_columns() {
    let master: Resource = serde_json::from_value(json!({
        "id": "example.com",
        "name": "example.com",
        "serviceLevel": 1,
        "inScope": true,
        "last_scan_date": "2024-03-01T10:30:00Z"
    }))
    .expect("record");
    assert_eq!(
        render_row(ResourceKind::MasterDomain, &master),
        "example.com\tGold\tin scope\tto review\t2024-03-01 10:30"
    );

    let ip = Resource::new("10.0.0.1")
        .with_attribute("value", "10.0.0.1")
        .with_attribute("blocked", true);
    assert_eq!(render_row(ResourceKind::Ip, &ip), "10.0.0.1\tblocked");
}

#[test]
fn page_header_reports_position() {
    let snapshot = CollectionSnapshot {
        total_count: 25,
        page_count: 3,
        items: vec![Resource::new("acme").with_attribute("name", "acme")],
    };
    let mut query = QueryState::new(ResourceKind::Brand);
    query.set_page_index(3, 3);
    let rendered = render_page(ResourceKind::Brand, &query, &snapshot);
    assert!(rendered.starts_with("1 brands (25 total), page 3/3\n"));
    assert!(rendered.contains("acme\tBronze\tnever scanned"));
}

#[test]
fn auth_failures_are_recognised_through_anyhow() {
    let err = anyhow::Error::from(SyncError::NotAuthenticated(client_core::AuthFailure::new(
        "expired",
    )));
    assert!(is_auth_failure(&err));
    assert!(!is_auth_failure(&anyhow!("network down")));
}

#[test]
fn page_header_names_active_filter_and_empty_pages() {
    let mut query = QueryState::new(ResourceKind::IpRange);
    query.set_search("10.0.0.0/8");
    let rendered = render_page(ResourceKind::IpRange, &query, &CollectionSnapshot::default());
    assert_eq!(
        rendered,
        "0 ipranges (0 total), page 1/1, search: 10.0.0.0/8\nno IP range found\n"
    );

    let mut query = QueryState::new(ResourceKind::Domain);
    query.set_filter(Filter::NotBlocked).expect("filter");
    let rendered = render_page(ResourceKind::Domain, &query, &CollectionSnapshot::default());
    assert!(rendered.starts_with("0 domains (0 total), page 1/1, filter: Not blocked\n"));
}

#[test]
fn list_preset_carries_every_dimension_into_mount() {
    let query = preset_query(
        ResourceKind::MasterDomain,
        50,
        Some(Filter::InScope),
        None,
        &["serviceLevel".to_string(), "serviceLevel".to_string()],
    )
    .expect("preset");
    assert_eq!(query.page_size(), PageSize::Fifty);
    assert_eq!(query.filter(), Filter::InScope);
    assert_eq!(query.sort_field(), "serviceLevel");
    assert_eq!(query.sort_order(), shared::protocol::SortOrder::Desc);

    let query = preset_query(ResourceKind::Domain, 10, Some(Filter::Blocked), Some("shop".into()), &[])
        .expect("preset");
    assert_eq!(query.filter(), Filter::All);
    assert_eq!(query.search(), "shop");
}

#[test]
fn list_preset_rejects_invalid_dimensions() {
    assert!(preset_query(ResourceKind::Brand, 30, None, None, &[]).is_err());
    assert!(preset_query(ResourceKind::Brand, 10, Some(Filter::Blocked), None, &[]).is_err());
    assert!(preset_query(ResourceKind::Ip, 10, None, None, &["serviceLevel".to_string()]).is_err());
}
