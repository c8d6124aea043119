use anyhow::anyhow;
use metasift::engine::{PredicateFn, Probe, probe_stage};
use metasift::pipeline::{
    PipelineTuning, Source, SourceError, check_walk_errors, find, is_selected, run_pipeline,
};
use metasift::record::Record;
use metasift::stage::Stage;
use metasift::walk::WalkError;
use metasift::{CancelToken, Opts, ProbeSpec};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn tree_with_files(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 0..n {
        let sub = if i % 2 == 0 { "even" } else { "odd" };
        let path = dir.path().join(sub).join(format!("f{}.txt", i));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{}", i)).unwrap();
    }
    dir
}

fn opts_for(root: &Path) -> Opts {
    Opts {
        roots: vec![root.to_path_buf()],
        workers: Some(4),
        buffer_size: 4,
        ..Default::default()
    }
}

fn tag_stage(key: &'static str) -> Stage<Record, Record> {
    Stage::new(key, 4, move |_, mut r: Record| {
        r.set(key, true);
        Ok(r)
    })
}

fn run_find(opts: &Opts) -> (String, metasift::pipeline::FindSummary) {
    let mut out = Vec::new();
    let summary = find(opts, &CancelToken::new(), &mut out).unwrap();
    (String::from_utf8(out).unwrap(), summary)
}

// --- run_pipeline ---

#[test]
fn test_three_enrichment_stages_over_ten_entries() {
    let dir = tree_with_files(10);
    let opts = opts_for(dir.path());
    let stages = vec![tag_stage("p0"), tag_stage("p1"), tag_stage("p2")];
    let handles = run_pipeline(&opts, stages, &CancelToken::new()).unwrap();
    let records: Vec<Record> = handles.record_rx.iter().collect();
    let walk_err = handles.finish().unwrap();
    assert!(walk_err.is_none());

    assert_eq!(records.len(), 10);
    let paths: HashSet<String> = records
        .iter()
        .map(|r| r.path().unwrap().to_string())
        .collect();
    assert_eq!(paths.len(), 10);
    for r in &records {
        for key in ["p0", "p1", "p2"] {
            assert_eq!(r.get(key), Some(&Value::Bool(true)), "{:?}", r);
        }
    }
}

#[test]
fn test_pipeline_without_stages_emits_walk_records() {
    let dir = tree_with_files(3);
    let handles = run_pipeline(&opts_for(dir.path()), Vec::new(), &CancelToken::new()).unwrap();
    let records: Vec<Record> = handles.record_rx.iter().collect();
    handles.finish().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.get_text("ext").as_deref() == Some(".txt")));
}

#[test]
fn test_failing_probe_passes_record_through() {
    struct Broken;
    impl Probe for Broken {
        fn probe(&self, _token: &CancelToken, _path: &str) -> anyhow::Result<Record> {
            Err(anyhow!("probe crashed"))
        }
    }
    struct Fixed;
    impl Probe for Fixed {
        fn probe(&self, _token: &CancelToken, path: &str) -> anyhow::Result<Record> {
            let mut r = Record::new();
            r.set("len", path.len());
            Ok(r)
        }
    }

    let dir = tree_with_files(5);
    let stages = vec![
        probe_stage("broken", 2, Arc::new(Broken)),
        probe_stage("fixed", 2, Arc::new(Fixed)),
    ];
    let handles = run_pipeline(&opts_for(dir.path()), stages, &CancelToken::new()).unwrap();
    let records: Vec<Record> = handles.record_rx.iter().collect();
    handles.finish().unwrap();
    assert_eq!(records.len(), 5);
    for r in &records {
        assert!(!r.contains_key("broken"));
        assert!(r.get("fixed").and_then(|v| v.get("len")).is_some());
    }
}

#[test]
fn test_pipeline_cancel_finishes() {
    let dir = tree_with_files(200);
    let token = CancelToken::new();
    let handles = run_pipeline(&opts_for(dir.path()), vec![tag_stage("p0")], &token).unwrap();
    assert!(handles.record_rx.recv().is_ok());
    token.cancel();
    handles.finish().unwrap();
}

#[test]
fn test_pipeline_rejects_unreadable_root_up_front() {
    let dir = TempDir::new().unwrap();
    let opts = opts_for(&dir.path().join("missing"));
    assert!(run_pipeline(&opts, Vec::new(), &CancelToken::new()).is_err());
}

// --- Source ---

#[test]
fn test_source_from_opts() {
    let mut opts = Opts::default();
    assert_eq!(Source::from_opts(&opts), Err(SourceError::NoRoots));

    opts.roots = vec![PathBuf::from("a"), PathBuf::from("b")];
    assert_eq!(
        Source::from_opts(&opts),
        Ok(Source::Tree(vec![PathBuf::from("a"), PathBuf::from("b")]))
    );

    opts.roots = vec![PathBuf::from("-")];
    assert_eq!(Source::from_opts(&opts), Ok(Source::Stdin));

    opts.roots = vec![PathBuf::from("-"), PathBuf::from("a")];
    assert_eq!(Source::from_opts(&opts), Err(SourceError::StdinWithOthers));

    opts.roots.clear();
    opts.archives = vec![PathBuf::from("x.zip")];
    assert_eq!(
        Source::from_opts(&opts),
        Ok(Source::Archives(vec![PathBuf::from("x.zip")]))
    );

    opts.roots = vec![PathBuf::from("a")];
    assert_eq!(
        Source::from_opts(&opts),
        Err(SourceError::Conflict("archives", "roots"))
    );

    opts.index = vec![PathBuf::from("idx.jsonl")];
    assert_eq!(
        Source::from_opts(&opts),
        Err(SourceError::Conflict("index", "archives"))
    );
}

#[test]
fn test_tuning_defaults() {
    let opts = Opts::default();
    let tuning = PipelineTuning::from_opts(&opts);
    assert!(tuning.workers >= 1);
    assert_eq!(tuning.buffer_size, 100);

    let opts = Opts {
        workers: Some(0),
        buffer_size: 7,
        ..Default::default()
    };
    let tuning = PipelineTuning::from_opts(&opts);
    assert_eq!(tuning.workers, 1);
    assert_eq!(tuning.buffer_size, 7);
}

// --- find ---

#[test]
fn test_find_prints_selected_paths() {
    let dir = tree_with_files(6);
    let mut opts = opts_for(dir.path());
    opts.select = vec!["*/even/*".to_string()];
    let (out, summary) = run_find(&opts);
    assert_eq!(summary.received, 6);
    assert_eq!(summary.written, 3);
    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort();
    let expected: Vec<String> = [0, 2, 4]
        .iter()
        .map(|i| {
            dir.path()
                .join("even")
                .join(format!("f{}.txt", i))
                .display()
                .to_string()
        })
        .collect();
    assert_eq!(lines, expected);
}

#[test]
fn test_find_excludes_pruned_directory() {
    let dir = tree_with_files(6);
    let mut opts = opts_for(dir.path());
    opts.exclude = vec!["name=odd".to_string()];
    let (_, summary) = run_find(&opts);
    assert_eq!(summary.written, 3);
}

#[test]
fn test_find_json_output() {
    let dir = tree_with_files(2);
    let mut opts = opts_for(dir.path());
    opts.json = true;
    let (out, _) = run_find(&opts);
    let records: Vec<Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    for r in records {
        assert_eq!(r["ext"], json!(".txt"));
        assert_eq!(r["size"], json!(1));
    }
}

#[cfg(unix)]
#[test]
fn test_find_with_script_probe_and_select_on_probe_field() {
    let dir = tree_with_files(4);
    let mut opts = opts_for(dir.path());
    opts.probes = vec![ProbeSpec {
        name: "p0".to_string(),
        script: "printf '{\"content\": \"%s\"}' \"$(cat @ARG)\"".to_string(),
    }];
    opts.select = vec!["p0.content=3".to_string()];
    opts.json = true;
    let (out, summary) = run_find(&opts);
    assert_eq!(summary.received, 4);
    assert_eq!(summary.written, 1);
    let record: Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(record["p0"]["content"], json!("3"));
    assert_eq!(record["name"], json!("f3.txt"));
}

#[test]
fn test_walk_errors_fail_only_in_strict_mode() {
    let err = WalkError::join(vec![
        WalkError::at(Path::new("/a"), "permission denied"),
        WalkError::at(Path::new("/b"), "permission denied"),
    ]);
    let mut opts = Opts::default();
    assert!(check_walk_errors(&opts, err.clone()).is_ok());
    assert!(check_walk_errors(&opts, None).is_ok());
    opts.strict = true;
    assert!(check_walk_errors(&opts, err).is_err());
    assert!(check_walk_errors(&opts, None).is_ok());
}

#[test]
fn test_find_reads_index_records() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("index.jsonl");
    fs::write(
        &index,
        concat!(
            "{\"path\": \"/a/x.mp3\", \"name\": \"x.mp3\", \"ext\": \".mp3\"}\n",
            "not json\n",
            "\n",
            "{\"path\": \"/a/y.flac\", \"name\": \"y.flac\", \"ext\": \".flac\"}\n",
        ),
    )
    .unwrap();
    let opts = Opts {
        index: vec![index],
        select: vec!["ext=.flac".to_string()],
        ..Default::default()
    };
    let (out, summary) = run_find(&opts);
    assert_eq!(summary.received, 2);
    assert_eq!(out, "/a/y.flac\n");
}

#[test]
fn test_is_selected_treats_errors_as_unselected() {
    let failing = PredicateFn(|_: &Record| Err::<bool, _>(anyhow!("cannot decide")));
    let mut r = Record::new();
    r.set("path", "/x");
    assert!(!is_selected(&failing, &r));
    let yes = PredicateFn(|_: &Record| Ok::<_, anyhow::Error>(true));
    assert!(is_selected(&yes, &r));
}
