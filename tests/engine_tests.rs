use chrono::{Local, TimeZone};
use clap::Parser;
use metasift::engine::{
    Cli, Condition, MatchMode, Matcher, Predicate, PredicateFn, build_opts, expand_env,
    glob_match, parse_output, read_file_or_literal, replace_script_literals,
};
use log::LevelFilter;
use metasift::record::{Record, extension};
use metasift::utils::log_level;
use metasift::{ArchiveMember, Entry, FileInfo};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_entry() -> Entry {
    let info = FileInfo {
        name: "song.m4a".to_string(),
        size: 1234,
        mode: 0o644,
        modified: Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).single().unwrap(),
        is_dir: false,
    };
    Entry::new(PathBuf::from("music/album/song.m4a"), info)
}

// --- glob_match ---

#[test]
fn test_glob_match_star_and_question() {
    assert!(glob_match("*.txt", "notes.txt"));
    assert!(glob_match("a?c", "abc"));
    assert!(glob_match("*", ""));
    assert!(glob_match("a*b*c", "aXXbYYc"));
    assert!(!glob_match("*.txt", "notes.md"));
    assert!(!glob_match("a?c", "ac"));
    assert!(!glob_match("abc", "abcd"));
}

// --- expand_env ---

#[test]
fn test_expand_env_forms() {
    unsafe {
        std::env::set_var("METASIFT_TEST_HOME", "/data");
        std::env::remove_var("METASIFT_TEST_UNSET");
    }
    assert_eq!(expand_env("$METASIFT_TEST_HOME/x"), "/data/x");
    assert_eq!(expand_env("${METASIFT_TEST_HOME}x"), "/datax");
    assert_eq!(expand_env("a$METASIFT_TEST_UNSET/b"), "a/b");
    assert_eq!(expand_env("cost: $"), "cost: $");
    assert_eq!(expand_env("${open"), "${open");
    assert_eq!(expand_env("plain"), "plain");
}

// --- read_file_or_literal ---

#[test]
fn test_read_file_or_literal() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("probe.sh");
    fs::write(&script, "echo a=1\n").unwrap();
    let marked = format!("@{}", script.display());
    assert_eq!(read_file_or_literal(&marked).unwrap(), "echo a=1\n");
    assert_eq!(read_file_or_literal("echo b=2").unwrap(), "echo b=2");
    assert!(read_file_or_literal("@/definitely/not/here").is_err());
}

// --- Record ---

#[test]
fn test_record_from_entry_keys() {
    let r = Record::from_entry(&sample_entry());
    assert_eq!(r.path(), Some("music/album/song.m4a"));
    assert_eq!(r.get_text("dir").as_deref(), Some("music/album"));
    assert_eq!(r.get_text("name").as_deref(), Some("song.m4a"));
    assert_eq!(r.get_text("ext").as_deref(), Some(".m4a"));
    assert_eq!(r.get_text("basename").as_deref(), Some("song"));
    assert_eq!(r.get_text("basepath").as_deref(), Some("music/album/song"));
    assert_eq!(r.get("size"), Some(&json!(1234)));
    assert_eq!(r.get_text("mode").as_deref(), Some("644"));
    assert_eq!(r.get_text("mod_time").as_deref(), Some("2024-05-06 07:08:09"));
    assert!(r.contains_key("mod_time_ts"));
    assert!(!r.contains_key("zip_root"));
}

#[test]
fn test_record_from_bare_name_uses_dot_dir() {
    let base = sample_entry();
    let entry = Entry::new(PathBuf::from("song.m4a"), base.info().clone());
    let r = Record::from_entry(&entry);
    assert_eq!(r.get_text("dir").as_deref(), Some("."));
}

#[test]
fn test_record_archive_fields() {
    let base = sample_entry();
    let member = ArchiveMember {
        root: PathBuf::from("a.zip"),
        rel_path: "x/song.m4a".to_string(),
        compressed_size: 100,
        uncompressed_size: 1234,
        comment: "hi".to_string(),
        non_utf8: false,
    };
    let entry = Entry::in_archive(
        PathBuf::from("a.zip/x/song.m4a"),
        base.info().clone(),
        member,
    );
    let r = Record::from_entry(&entry);
    assert_eq!(r.get_text("zip_root").as_deref(), Some("a.zip"));
    assert_eq!(r.get("zip_compressed_size"), Some(&json!(100)));
    assert_eq!(r.get("zip_non_utf8"), Some(&json!(false)));
}

#[test]
fn test_record_merge_nests_fragment() {
    let mut r = Record::from_entry(&sample_entry());
    let mut fragment = Record::new();
    fragment.set("codec", "aac");
    r.merge("p0", fragment);
    assert_eq!(r.get("p0"), Some(&json!({"codec": "aac"})));
}

#[test]
fn test_extension() {
    assert_eq!(extension("a.tar.gz"), ".gz");
    assert_eq!(extension("Makefile"), "");
    assert_eq!(extension(".bashrc"), ".bashrc");
}

// --- Condition / Matcher ---

#[test]
fn test_condition_parse() {
    assert_eq!(
        Condition::parse("ext=.m4a").unwrap(),
        Condition::Field {
            key: "ext".to_string(),
            pattern: ".m4a".to_string(),
            negate: false,
        }
    );
    assert_eq!(
        Condition::parse("p0.codec!=aac").unwrap(),
        Condition::Field {
            key: "p0.codec".to_string(),
            pattern: "aac".to_string(),
            negate: true,
        }
    );
    assert_eq!(
        Condition::parse("*.txt").unwrap(),
        Condition::NameOrPath("*.txt".to_string())
    );
    assert!(Condition::parse("  ").is_err());
}

#[test]
fn test_condition_eval_fields_and_globs() {
    let mut r = Record::from_entry(&sample_entry());
    let mut fragment = Record::new();
    fragment.set("codec", "aac");
    fragment.set("bitrate", 256);
    r.merge("p0", fragment);

    let eval = |s: &str| Condition::parse(s).unwrap().eval(&r).unwrap();
    assert!(eval("ext=.m4a"));
    assert!(!eval("ext!=.m4a"));
    assert!(eval("p0.codec=aac"));
    assert!(eval("p0.bitrate=25?"));
    assert!(eval("size=1234"));
    assert!(eval("song.*"));
    assert!(eval("music/*"));
    assert!(!eval("*.flac"));
    assert!(Condition::parse("p1.codec=aac").unwrap().eval(&r).is_err());
}

#[test]
fn test_matcher_any_and_all() {
    let r = Record::from_entry(&sample_entry());
    assert!(Matcher::any(&["*.flac", "ext=.m4a"]).unwrap().run(&r).unwrap());
    assert!(!Matcher::all(&["*.flac", "ext=.m4a"]).unwrap().run(&r).unwrap());
    assert!(Matcher::all(&["*.m4a", "size=12*"]).unwrap().run(&r).unwrap());
    let empty_all = Matcher::parse::<&str>(&[], MatchMode::All).unwrap();
    assert!(empty_all.is_empty());
    assert!(empty_all.run(&r).unwrap());
    assert!(!Matcher::any::<&str>(&[]).unwrap().run(&r).unwrap());
}

#[test]
fn test_predicate_fn() {
    let big = PredicateFn(|r: &Record| {
        Ok::<_, anyhow::Error>(r.get("size").and_then(|v| v.as_u64()) > Some(1000))
    });
    assert!(big.run(&Record::from_entry(&sample_entry())).unwrap());
}

// --- probe output ---

#[test]
fn test_parse_output_json() {
    let r = parse_output(br#"{"codec": "aac", "channels": 2}"#).unwrap();
    assert_eq!(r.get("codec"), Some(&json!("aac")));
    assert_eq!(r.get("channels"), Some(&json!(2)));
}

#[test]
fn test_parse_output_key_value_lines() {
    let r = parse_output(b"codec = aac\nnoise\nchannels=2\n").unwrap();
    assert_eq!(r.get_text("codec").as_deref(), Some("aac"));
    assert_eq!(r.get_text("channels").as_deref(), Some("2"));
    assert_eq!(r.len(), 2);
}

#[test]
fn test_parse_output_empty_is_error() {
    assert!(parse_output(b"").is_err());
    assert!(parse_output(b"nothing useful\n").is_err());
}

#[test]
fn test_replace_script_literals() {
    assert_eq!(
        replace_script_literals("stat @ARG; echo @RAWARG"),
        "stat \"$1\"; echo $1"
    );
}

#[cfg(unix)]
#[test]
fn test_script_probe_runs_with_path_argument() {
    use metasift::CancelToken;
    use metasift::engine::{Probe, ScriptProbe};

    let probe = ScriptProbe::new("echo \"path=$1\"; echo kind=test", "sh", &[]);
    let r = probe.probe(&CancelToken::new(), "/some/file").unwrap();
    assert_eq!(r.get_text("path").as_deref(), Some("/some/file"));
    assert_eq!(r.get_text("kind").as_deref(), Some("test"));

    let failing = ScriptProbe::new("exit 3", "sh", &[]);
    assert!(failing.probe(&CancelToken::new(), "/x").is_err());
}

#[cfg(unix)]
#[test]
fn test_script_probe_cancel_kills_child() {
    use metasift::CancelToken;
    use metasift::engine::{Probe, ScriptProbe};
    use metasift::stage::{Outcome, classify};
    use std::time::{Duration, Instant};

    let probe = ScriptProbe::new("sleep 30", "sh", &[]);
    let token = CancelToken::new().with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let err = probe.probe(&token, "/x").unwrap_err();
    assert_eq!(classify(&err), Outcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}

// --- CLI / config layering ---

#[test]
fn test_build_opts_cli_defaults() {
    let dir = TempDir::new().unwrap();
    let cli = Cli::parse_from(["metasift"]);
    let opts = build_opts(&cli, dir.path()).unwrap();
    assert_eq!(opts.roots, vec![PathBuf::from(".")]);
    assert!(opts.probes.is_empty());
    assert!(!opts.json);
    assert_eq!(opts.buffer_size, 100);
}

#[test]
fn test_build_opts_probe_names() {
    let dir = TempDir::new().unwrap();
    let cli = Cli::parse_from([
        "metasift",
        "music",
        "-p",
        "echo a=1",
        "-p",
        "echo b=2",
        "--probe-name",
        "first",
        "--json",
        "-w",
        "3",
    ]);
    let opts = build_opts(&cli, dir.path()).unwrap();
    assert_eq!(opts.roots, vec![PathBuf::from("music")]);
    let names: Vec<&str> = opts.probes.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["first", "p1"]);
    assert!(opts.json);
    assert_eq!(opts.workers, Some(3));
}

#[test]
fn test_build_opts_config_file_then_cli() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".metasift.toml"),
        r#"
[settings]
roots = ["from-file"]
workers = 2
select = ["ext=.txt"]
json = true

[[probe]]
script = "echo x=1"

[[probe]]
name = "named"
script = "echo y=2"
"#,
    )
    .unwrap();

    let cli = Cli::parse_from(["metasift", "-w", "5"]);
    let opts = build_opts(&cli, dir.path()).unwrap();
    assert_eq!(opts.roots, vec![PathBuf::from("from-file")]);
    assert_eq!(opts.workers, Some(5));
    assert_eq!(opts.select, vec!["ext=.txt".to_string()]);
    assert!(opts.json);
    let names: Vec<&str> = opts.probes.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["p0", "named"]);

    let cli = Cli::parse_from(["metasift", "cli-root", "--json=false"]);
    let opts = build_opts(&cli, dir.path()).unwrap();
    assert_eq!(opts.roots, vec![PathBuf::from("cli-root")]);
    assert!(!opts.json);
}

#[test]
fn test_build_opts_explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let cli = Cli::parse_from(["metasift", "-c", missing.to_str().unwrap()]);
    assert!(build_opts(&cli, dir.path()).is_err());
}

#[test]
fn test_cli_exclude_leaves_root_positional() {
    let cli = Cli::try_parse_from(["metasift", "-x", "*.log", "somedir"]).unwrap();
    assert_eq!(cli.exclude, vec!["*.log".to_string()]);
    assert_eq!(cli.roots, vec![PathBuf::from("somedir")]);
}

#[test]
fn test_cli_bool_flag_leaves_root_positional() {
    let cli = Cli::try_parse_from(["metasift", "--json", "somedir"]).unwrap();
    assert_eq!(cli.json, Some(true));
    assert_eq!(cli.roots, vec![PathBuf::from("somedir")]);

    let cli = Cli::try_parse_from(["metasift", "-v", "--strict", "a", "b"]).unwrap();
    assert_eq!(cli.verbose, Some(true));
    assert_eq!(cli.strict, Some(true));
    assert_eq!(cli.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);

    let cli = Cli::try_parse_from(["metasift", "--quiet=false", "c"]).unwrap();
    assert_eq!(cli.quiet, Some(false));
    assert_eq!(cli.roots, vec![PathBuf::from("c")]);
}

#[test]
fn test_cli_repeated_list_options() {
    let cli = Cli::try_parse_from([
        "metasift", "-s", "ext=.txt", "-s", "size!=0", "-z", "a.zip", "-z", "b.zip", "--shell",
        "bash", "--shell", "-eu", "-i", "idx.jsonl", "root",
    ])
    .unwrap();
    assert_eq!(cli.select, vec!["ext=.txt".to_string(), "size!=0".to_string()]);
    assert_eq!(cli.zip, vec![PathBuf::from("a.zip"), PathBuf::from("b.zip")]);
    assert_eq!(cli.shell, vec!["bash".to_string(), "-eu".to_string()]);
    assert_eq!(cli.index, vec![PathBuf::from("idx.jsonl")]);
    assert_eq!(cli.roots, vec![PathBuf::from("root")]);
}

#[test]
fn test_log_level() {
    assert_eq!(log_level(true, false), LevelFilter::Debug);
    assert_eq!(log_level(false, true), LevelFilter::Error);
    assert_eq!(log_level(false, false), LevelFilter::Info);
}

#[test]
fn test_probe_workers_per_stage() {
    use metasift::utils::probe_workers_per_stage;
    assert_eq!(probe_workers_per_stage(0), None);
    if let Some(n) = probe_workers_per_stage(3) {
        assert!(n >= 1);
    }
}
