// Batch parsing: aggregate stats, partial failure, empty input.

use atlas_parsers::incremental::{BatchFile, BatchOptions, IncrementalParser};

fn file(path: &str, text: &str) -> BatchFile {
    BatchFile {
        path: path.to_string(),
        disk_path: None,
        text: Some(text.to_string()),
    }
}

#[test]
fn mixed_batch_reports_aggregates() {
    let parser = IncrementalParser::new();
    let outcome = parser.parse_batch(
        vec![
            file("a.js", "function a(){}"),
            file("b.py", "def b():\n    pass\n"),
            file("c.go", "package c\nfunc C() {}"),
            file("broken.wat", "???"),
        ],
        &BatchOptions::default(),
    );

    assert_eq!(outcome.stats.total, 4);
    assert_eq!(outcome.stats.succeeded, 3);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(!outcome.cancelled);
    // The failing file still produced a result row.
    assert_eq!(outcome.results.len(), 4);
}

#[test]
fn zero_files_batch() {
    let parser = IncrementalParser::new();
    let outcome = parser.parse_batch(vec![], &BatchOptions::default());
    assert_eq!(outcome.stats.total, 0);
    assert_eq!(outcome.stats.succeeded, 0);
    assert_eq!(outcome.stats.failed, 0);
}

#[test]
fn second_batch_is_all_cache_hits() {
    let parser = IncrementalParser::new();
    let files = || {
        vec![
            file("a.js", "function a(){}"),
            file("b.js", "function b(){}"),
        ]
    };
    parser.parse_batch(files(), &BatchOptions::default());
    let second = parser.parse_batch(files(), &BatchOptions::default());
    assert_eq!(second.stats.from_cache, 2);
    assert_eq!(second.stats.succeeded, 2);
}

#[test]
fn chunking_handles_more_files_than_batch_size() {
    let parser = IncrementalParser::new();
    let files: Vec<BatchFile> = (0..23)
        .map(|i| file(&format!("f{i}.js"), &format!("function f{i}(){{}}")))
        .collect();
    let outcome = parser.parse_batch(
        files,
        &BatchOptions {
            batch_size: 4,
            ..BatchOptions::default()
        },
    );
    assert_eq!(outcome.stats.total, 23);
    assert_eq!(outcome.stats.succeeded, 23);
    assert_eq!(outcome.results.len(), 23);
}

#[test]
fn batch_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.js"), "function onDisk(){}").unwrap();
    let parser = IncrementalParser::new();
    let outcome = parser.parse_batch(
        vec![BatchFile {
            path: "x.js".to_string(),
            disk_path: Some(dir.path().join("x.js")),
            text: None,
        }],
        &BatchOptions::default(),
    );
    assert_eq!(outcome.stats.succeeded, 1);
    assert_eq!(outcome.results[0].entities[0].id, "x.js:function:onDisk");
}
