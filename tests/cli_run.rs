// tests/cli_run.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use mailsweep::cli::CliArgs;
use mailsweep::jobs::{Job, JobStatus};
use mailsweep::store::MemoryRecordStore;
use mailsweep_test_utils::builders::{spam_records, RecordBuilder};
use tempfile::TempDir;

/// Config + mailbox snapshot in a fresh temp dir, with file-backed state.
fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let state_dir = dir.path().join("state");
    let config = dir.path().join("Mailsweep.toml");
    fs::write(
        &config,
        format!(
            r#"
[storage]
mode = "file"
state_dir = '{}'

[policy.old-spam]
name = "Old spam"
priority = 10
criteria = {{ age_days_min = 30, spam_score_min = 0.8 }}
action = {{ type = "delete" }}

[policy.careful]
name = "Careful"
priority = 20
criteria = {{ age_days_min = 30 }}
action = {{ type = "archive" }}
safety = {{ require_confirmation = true }}
"#,
            state_dir.display()
        ),
    )
    .expect("write config");

    let records = dir.path().join("mailbox.json");
    let mut seed = spam_records("s", 3);
    seed.push(RecordBuilder::new("fresh").aged_hours(1).build());
    MemoryRecordStore::with_records(seed)
        .save_json(&records)
        .expect("write mailbox");

    (dir, config, records)
}

fn args(config: &Path, records: &Path, extra: &[&str]) -> CliArgs {
    let mut argv = vec![
        "mailsweep".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--records".to_string(),
        records.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).expect("valid arguments")
}

fn stored_jobs(dir: &Path) -> Vec<Job> {
    let raw = fs::read_to_string(dir.join("state").join("jobs.json")).expect("jobs file");
    serde_json::from_str(&raw).expect("jobs json")
}

#[test]
fn flag_combinations_are_checked_by_clap() {
    assert!(CliArgs::try_parse_from(["mailsweep", "--preview"]).is_err());
    assert!(CliArgs::try_parse_from(["mailsweep", "--once", "--trigger", "p"]).is_err());

    let parsed = CliArgs::try_parse_from(["mailsweep", "--trigger", "p", "--max-emails", "5"])
        .expect("valid arguments");
    assert_eq!(parsed.config, "Mailsweep.toml");
    assert_eq!(parsed.trigger.as_deref(), Some("p"));
    assert_eq!(parsed.max_emails, Some(5));
}

#[tokio::test]
async fn manual_trigger_updates_the_snapshot_and_persists_the_job() -> TestResult {
    init_tracing();
    let (dir, config, records) = workspace();

    mailsweep::run(args(&config, &records, &["--trigger", "old-spam"])).await?;

    let mailbox = MemoryRecordStore::load_json(&records)?;
    for i in 0..3 {
        assert!(mailbox.get(&format!("s-{i}")).is_some_and(|r| r.deleted));
    }
    assert!(mailbox.get("fresh").is_some_and(|r| !r.deleted));

    let jobs = stored_jobs(dir.path());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].policy_id(), "old-spam");
    Ok(())
}

#[tokio::test]
async fn preview_changes_nothing() -> TestResult {
    init_tracing();
    let (_dir, config, records) = workspace();
    let before = fs::read_to_string(&records)?;

    mailsweep::run(args(&config, &records, &["--trigger", "old-spam", "--preview"])).await?;

    let mailbox = MemoryRecordStore::load_json(&records)?;
    assert!(mailbox.get("s-0").is_some_and(|r| !r.deleted));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&before)?,
        serde_json::from_str::<serde_json::Value>(&fs::read_to_string(&records)?)?
    );
    Ok(())
}

#[tokio::test]
async fn unconfirmed_trigger_fails_and_records_why() -> TestResult {
    init_tracing();
    let (dir, config, records) = workspace();

    let err = mailsweep::run(args(&config, &records, &["--trigger", "careful"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("requires confirmation"));

    let jobs = stored_jobs(dir.path());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);

    mailsweep::run(args(&config, &records, &["--trigger", "careful", "--confirm"])).await?;
    let mailbox = MemoryRecordStore::load_json(&records)?;
    assert!(mailbox.get("s-0").is_some_and(|r| r.archived));
    Ok(())
}

#[tokio::test]
async fn dry_run_only_validates() -> TestResult {
    init_tracing();
    let (dir, config, records) = workspace();

    mailsweep::run(args(&config, &records, &["--dry-run"])).await?;
    assert!(!dir.path().join("state").exists());
    Ok(())
}
