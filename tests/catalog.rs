//! Catalog Integration Tests
//!
//! End-to-end listings against an in-memory object store.

use std::sync::Arc;

use epiflow::adapters::MemoryStore;
use epiflow::cli::format::{render_listing, OutputFormat};
use epiflow::core::{CatalogQuery, ExperimentCatalog, PrefixScanner};

fn catalog(keys: &[&str]) -> ExperimentCatalog {
    let store = MemoryStore::with_keys("sim-bucket", keys.iter().copied()).with_page_size(3);
    ExperimentCatalog::new(PrefixScanner::new(Arc::new(store)))
}

fn namespace() -> Vec<&'static str> {
    vec![
        "pipeline/flu/202605/exp1/20250601-120000-abc12345/outputs/x.csv",
        "pipeline/flu/202605/exp1/20250601-120000-abc12345/inputs/params.yaml",
        "pipeline/flu/202605/exp1/20250605-090000-0000beef/outputs/x.csv",
        "pipeline/flu/202605/exp2/20250602-130000-def67890/outputs/y.csv",
        "pipeline/flu/202605/exp10/20250603-080000-12345678/outputs/z.csv",
        "pipeline/flu/test/myexp/20250604-100000-aaaa0000/outputs/a.csv",
        "pipeline/flu/test/myexp/child/20250604-110000-bbbb0000/outputs/b.csv",
        "pipeline/flu/README.md",
        "pipeline/covid/202605/exp1/20250601-120000-ffffffff/outputs/x.csv",
    ]
}

fn rows(listing: &epiflow::CatalogListing) -> Vec<(String, String)> {
    listing
        .entries
        .iter()
        .map(|e| (e.run.experiment.to_string(), e.run.run_id.to_string()))
        .collect()
}

fn query(filter: Option<&str>) -> CatalogQuery {
    CatalogQuery {
        root_prefix: "pipeline/flu/".to_string(),
        filter: filter.map(str::to_string),
        latest_only: false,
        limit: 0,
    }
}

#[tokio::test]
async fn test_two_experiments_listed_newest_first_with_uris() {
    let catalog = catalog(&[
        "pipeline/flu/202605/exp1/20250601-120000-abc12345/outputs/x.csv",
        "pipeline/flu/202605/exp2/20250602-130000-def67890/outputs/y.csv",
    ]);

    let listing = catalog.list(&query(None)).await.unwrap();
    assert_eq!(
        rows(&listing),
        vec![
            ("202605/exp2".to_string(), "20250602-130000-def67890".to_string()),
            ("202605/exp1".to_string(), "20250601-120000-abc12345".to_string()),
        ]
    );
    assert!(!listing.is_truncated());

    let uris = render_listing(&listing, OutputFormat::Uri, "sim-bucket");
    assert_eq!(
        uris,
        "gs://sim-bucket/pipeline/flu/202605/exp2/20250602-130000-def67890/\n\
         gs://sim-bucket/pipeline/flu/202605/exp1/20250601-120000-abc12345/\n"
    );
}

#[tokio::test]
async fn test_root_without_trailing_slash() {
    let catalog = catalog(&namespace());
    let mut q = query(None);
    q.root_prefix = "pipeline/flu".to_string();

    let listing = catalog.list(&q).await.unwrap();
    assert_eq!(listing.root_prefix, "pipeline/flu/");
    assert_eq!(listing.total, 6);
}

#[tokio::test]
async fn test_listing_is_idempotent() {
    let catalog = catalog(&namespace());
    let q = CatalogQuery {
        latest_only: true,
        limit: 3,
        ..query(Some("202605/"))
    };

    let first = catalog.list(&q).await.unwrap();
    let second = catalog.list(&q).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_scan_prefix_narrowing_does_not_change_results() {
    let catalog = catalog(&namespace());

    for filter in ["202605/exp1", "202605/", "202605/exp?", "test", "test/my*", "*exp1", "2026[0-9]5/exp2"] {
        let narrowed = catalog.list(&query(Some(filter))).await.unwrap();

        // Full scan of the root, filtered afterwards
        let full = catalog.list(&query(None)).await.unwrap();
        let patterns = epiflow::FilterPatterns::new(filter).unwrap();
        let expected: Vec<(String, String)> = rows(&full)
            .into_iter()
            .filter(|(exp, _)| patterns.matches(exp))
            .collect();

        assert_eq!(rows(&narrowed), expected, "filter {:?}", filter);
    }
}

#[tokio::test]
async fn test_literal_filter_matches_children_but_not_siblings() {
    let catalog = catalog(&namespace());

    let listing = catalog.list(&query(Some("202605/exp1"))).await.unwrap();
    let experiments: Vec<String> = rows(&listing).into_iter().map(|(e, _)| e).collect();
    assert_eq!(experiments, vec!["202605/exp1", "202605/exp1"]);

    let listing = catalog.list(&query(Some("test"))).await.unwrap();
    let experiments: Vec<String> = rows(&listing).into_iter().map(|(e, _)| e).collect();
    assert_eq!(experiments, vec!["test/myexp/child", "test/myexp"]);
}

#[tokio::test]
async fn test_latest_and_limit() {
    let catalog = catalog(&namespace());
    let q = CatalogQuery {
        latest_only: true,
        limit: 2,
        ..query(None)
    };

    let listing = catalog.list(&q).await.unwrap();
    assert_eq!(listing.total, 5);
    assert_eq!(listing.len(), 2);
    assert!(listing.is_truncated());
    assert_eq!(
        rows(&listing)[0],
        ("202605/exp1".to_string(), "20250605-090000-0000beef".to_string())
    );
    assert!(listing.entries[0].has_multiple_runs());
}

#[tokio::test]
async fn test_no_match_is_not_an_error() {
    let catalog = catalog(&namespace());
    let listing = catalog.list(&query(Some("nothing/here"))).await.unwrap();
    assert!(listing.is_empty());
    assert_eq!(listing.total, 0);
}

#[tokio::test]
async fn test_empty_filter_lists_everything() {
    let catalog = catalog(&namespace());

    let unfiltered = catalog.list(&query(None)).await.unwrap();
    let empty = catalog.list(&query(Some(""))).await.unwrap();
    assert_eq!(empty, unfiltered);
    assert_eq!(empty.total, 6);
}

#[tokio::test]
async fn test_shell_globs_the_glob_grammar_rejects() {
    let catalog = catalog(&namespace());

    let listing = catalog.list(&query(Some("202605/exp1**"))).await.unwrap();
    let experiments: Vec<String> = rows(&listing).into_iter().map(|(e, _)| e).collect();
    assert_eq!(experiments, vec!["202605/exp1", "202605/exp10", "202605/exp1"]);

    // Unclosed bracket is a literal character, so nothing matches
    let listing = catalog.list(&query(Some("202605/exp[1"))).await.unwrap();
    assert!(listing.is_empty());
}
