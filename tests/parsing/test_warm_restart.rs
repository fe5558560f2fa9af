// Cache export / warm-restart round-trip: a new process seeded with the
// export must hit for at least 80% of an unchanged repository.

use atlas_parsers::incremental::{BatchFile, BatchOptions, IncrementalParser};

fn repo_files(n: usize) -> Vec<BatchFile> {
    (0..n)
        .map(|i| BatchFile {
            path: format!("src/f{i}.js"),
            disk_path: None,
            text: Some(format!("function handler{i}() {{ work{i}(); }}")),
        })
        .collect()
}

#[test]
fn warm_restart_reaches_full_hit_rate_on_unchanged_repo() {
    let parser = IncrementalParser::new();
    parser.parse_batch(repo_files(20), &BatchOptions::default());
    let exported = parser.export_cache();
    assert_eq!(exported.len(), 20);

    let fresh = IncrementalParser::new();
    fresh.warm_restart(exported);
    let outcome = fresh.parse_batch(repo_files(20), &BatchOptions::default());

    let hit_rate = outcome.stats.from_cache as f64 / outcome.stats.total as f64;
    assert!(
        hit_rate >= 0.8,
        "warm restart hit rate {hit_rate} below threshold"
    );
}

#[test]
fn warm_restart_misses_only_changed_files() {
    let parser = IncrementalParser::new();
    parser.parse_batch(repo_files(10), &BatchOptions::default());

    let fresh = IncrementalParser::new();
    fresh.warm_restart(parser.export_cache());

    let mut files = repo_files(10);
    files[3].text = Some("function rewritten() {}".to_string());
    let outcome = fresh.parse_batch(files, &BatchOptions::default());
    assert_eq!(outcome.stats.from_cache, 9);
}

#[test]
fn export_is_deterministic() {
    let parser = IncrementalParser::new();
    parser.parse_batch(repo_files(5), &BatchOptions::default());
    let a: Vec<String> = parser.export_cache().into_iter().map(|e| e.key).collect();
    let b: Vec<String> = parser.export_cache().into_iter().map(|e| e.key).collect();
    assert_eq!(a, b);
    let mut sorted = a.clone();
    sorted.sort();
    assert_eq!(a, sorted);
}
