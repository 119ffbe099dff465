use assert_cmd::Command;
use byteorder::{LittleEndian, WriteBytesExt};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn spikesort() -> Command {
    let mut cmd = Command::cargo_bin("spikesort").unwrap();
    cmd.env_remove("SPIKESORT_OUTPUT_DIR");
    cmd
}

/// Two-channel 16-bit recording at 1 kHz, 3 s long. Channel 1 has 14 large
/// spikes every 200 ms and small ones in between; channel 2 is silent.
fn write_recording(dir: &Path, name: &str) -> PathBuf {
    let frames = 3000usize;
    let mut left = vec![0i16; frames];
    for c in (100..frames - 100).step_by(200) {
        left[c - 1] = 400;
        left[c] = 900;
        left[c + 1] = 400;
    }
    for c in (200..frames - 100).step_by(200) {
        left[c] = 300;
    }

    let mut payload = Vec::with_capacity(frames * 4);
    for l in &left {
        payload.write_i16::<LittleEndian>(*l).unwrap();
        payload.write_i16::<LittleEndian>(0).unwrap();
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.write_u32::<LittleEndian>(36 + payload.len() as u32).unwrap();
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.write_u32::<LittleEndian>(16).unwrap();
    bytes.write_u16::<LittleEndian>(1).unwrap();
    bytes.write_u16::<LittleEndian>(2).unwrap();
    bytes.write_u32::<LittleEndian>(1000).unwrap();
    bytes.write_u32::<LittleEndian>(4000).unwrap();
    bytes.write_u16::<LittleEndian>(4).unwrap();
    bytes.write_u16::<LittleEndian>(16).unwrap();
    bytes.extend_from_slice(b"data");
    bytes.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    bytes.extend_from_slice(&payload);

    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn stdout_json(output: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    spikesort()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    spikesort()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spikesort"));
}

#[test]
fn test_help_flag() {
    spikesort()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("spike sorting"));
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_nonexistent_file() {
    spikesort()
        .arg("validate")
        .arg("--file")
        .arg("/nonexistent/file.wav")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_unsupported_extension() {
    let tmp = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();

    spikesort()
        .arg("validate")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unsupported"))
        .stderr(predicate::str::contains("wav, wave, json"));
}

#[test]
fn test_validate_json_output() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    let output = spikesort()
        .arg("validate")
        .arg("--file")
        .arg(&path)
        .arg("--json")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["valid"], true);
    assert_eq!(parsed["file_type"], "Wav");
    assert_eq!(parsed["content"]["channels"], 2);
    assert_eq!(parsed["content"]["framerate"], 1000);
    assert_eq!(parsed["content"]["samples"], 3000);
    assert_eq!(parsed["content"]["encoding"], "16-bit PCM");
    assert_eq!(parsed["marker_file"]["present"], false);
    assert!(parsed["marker_file"]["path"]
        .as_str()
        .unwrap()
        .ends_with("rec-events.txt"));
}

#[test]
fn test_validate_reports_marker_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    fs::write(tmp.path().join("rec-events.txt"), "1, 0.5\n1, 1.5\n2, 2.0\n").unwrap();

    spikesort()
        .arg("validate")
        .arg("--file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 channel(s), 1000 Hz"))
        .stdout(predicate::str::contains("Encoding: 16-bit PCM"))
        .stdout(predicate::str::contains("3 event(s) under 2 key(s)"));
}

#[test]
fn test_validate_rejects_bad_marker_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    fs::write(tmp.path().join("rec-events.txt"), "1, 0.5\nx, 1.5\n").unwrap();

    spikesort()
        .arg("validate")
        .arg("--file")
        .arg(&path)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Bad marker file"));
}

#[test]
fn test_validate_rejects_undecodable_wav() {
    let tmp = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();

    spikesort()
        .arg("validate")
        .arg("--file")
        .arg(tmp.path().to_str().unwrap())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Cannot decode"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_json_without_markers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    let output = spikesort()
        .arg("info")
        .arg("--file")
        .arg(&path)
        .arg("--json")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["framerate"], 1000);
    assert_eq!(parsed["samples"], 3000);
    assert_eq!(parsed["channels"][0], "Channel 1");
    assert_eq!(parsed["channels"][1], "Channel 2");
    assert_eq!(parsed["datatype"], "SpikerBox");
    assert_eq!(parsed["marker_status"]["status"], "missing_file");
}

#[test]
fn test_info_lists_markers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    fs::write(tmp.path().join("rec-events.txt"), "1, 0.5\n1, 1.5\n2, 2.0\n").unwrap();

    spikesort()
        .arg("info")
        .arg("--file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Framerate: 1000 Hz"))
        .stdout(predicate::str::contains("m1: 2 event(s)"))
        .stdout(predicate::str::contains("m2: 1 event(s)"));
}

// =============================================================================
// SORT SUBCOMMAND
// =============================================================================

#[test]
fn test_sort_missing_file_arg() {
    spikesort()
        .arg("sort")
        .arg("--thresholds")
        .arg("800")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
fn test_sort_nonexistent_file() {
    spikesort()
        .arg("sort")
        .arg("--file")
        .arg("/nonexistent/rec.wav")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_sort_invalid_thresholds() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    spikesort()
        .arg("sort")
        .arg("--file")
        .arg(&path)
        .arg("--thresholds")
        .arg("abc")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_sort_unknown_marker_in_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    spikesort()
        .arg("sort")
        .arg("--file")
        .arg(&path)
        .arg("--thresholds")
        .arg("800")
        .arg("--interval")
        .arg("0 to m9")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Marker"));
}

#[test]
fn test_sort_writes_clusters() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    let output = spikesort()
        .arg("sort")
        .arg("--file")
        .arg(&path)
        .arg("--thresholds")
        .arg("250 800")
        .arg("--quiet")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    let result = &parsed["result"];
    assert_eq!(result["thresholds"], serde_json::json!([800.0, 250.0]));
    assert_eq!(result["channels"].as_array().unwrap().len(), 2);

    let big = &result["channels"][0]["clusters"][0];
    assert_eq!(big["label"], "Cluster threshold 800");
    assert_eq!(big["indices"].as_array().unwrap().len(), 14);
    assert_eq!(big["indices"][0], 100);

    let silent = &result["channels"][1]["clusters"];
    assert!(silent
        .as_array()
        .unwrap()
        .iter()
        .all(|c| c["indices"].as_array().unwrap().is_empty()));
    assert_eq!(parsed["history"].as_array().unwrap().len(), 1);
}

#[test]
fn test_sort_exports_csv_and_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    let export_dir = tmp.path().join("exports");
    let snapshot = tmp.path().join("session.json");
    let output_file = tmp.path().join("sorted.json");

    spikesort()
        .arg("sort")
        .arg("--file")
        .arg(&path)
        .arg("--thresholds")
        .arg("800")
        .arg("--channels")
        .arg("1")
        .arg("--cutoff")
        .arg("5000")
        .arg("--export-dir")
        .arg(&export_dir)
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--output")
        .arg(&output_file)
        .assert()
        .success()
        .stderr(predicate::str::contains("Channel 1: 14 spike(s)"));

    let csv = fs::read_to_string(export_dir.join("spiketimes_rec_channel1_cluster1.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Cluster threshold 800,Start time,Stop time,Frequency,Cut off threshold"
    );
    assert_eq!(lines.next().unwrap(), "0.1,0,3,4.666666666666667,5000");
    assert_eq!(csv.lines().count(), 15);
    assert!(output_file.exists());

    let output = spikesort()
        .arg("info")
        .arg("--file")
        .arg(&snapshot)
        .arg("--json")
        .assert()
        .success();
    let parsed = stdout_json(&output);
    assert_eq!(parsed["marker_status"]["status"], "snapshot");
    assert_eq!(parsed["channels"].as_array().unwrap().len(), 1);
}

#[test]
fn test_sort_resumes_snapshot_history() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    let snapshot = tmp.path().join("session.json");

    spikesort()
        .args(["sort", "--thresholds", "800", "--quiet", "--file"])
        .arg(&path)
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .success();

    let output = spikesort()
        .args(["sort", "--thresholds", "250", "--quiet", "--file"])
        .arg(&snapshot)
        .assert()
        .success();
    let parsed = stdout_json(&output);
    let history = parsed["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].as_str().unwrap().starts_with("Sorted with thresholds 250"));
}

// =============================================================================
// ANALYZE SUBCOMMAND
// =============================================================================

#[test]
fn test_analyze_correlograms_and_averages() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    fs::write(tmp.path().join("rec-events.txt"), "1, 0.5\n1, 1.5\n").unwrap();
    let export_dir = tmp.path().join("exports");

    let output = spikesort()
        .arg("analyze")
        .arg("--file")
        .arg(&path)
        .arg("--thresholds")
        .arg("250 800")
        .arg("--channels")
        .arg("1")
        .arg("--interval-ms")
        .arg("250")
        .arg("--marker")
        .arg("1")
        .arg("--era-pre")
        .arg("0")
        .arg("--era-post")
        .arg("0.1")
        .arg("--export-dir")
        .arg(&export_dir)
        .arg("--quiet")
        .assert()
        .success();

    let parsed = stdout_json(&output);
    assert_eq!(parsed["interval_ticks"], 250);

    let channel = &parsed["channels"][0];
    assert_eq!(channel["channel"], 1);
    assert_eq!(channel["lag_s"].as_array().unwrap().len(), 501);

    let big = &channel["clusters"][0];
    assert_eq!(big["spikes"], 14);
    let counts = big["autocorrelogram"]["counts"].as_array().unwrap();
    assert_eq!(counts.len(), 501);
    assert_eq!(counts[250], 0);
    assert_eq!(counts[450], 13);
    assert_eq!(counts[50], 13);
    assert_eq!(big["waveform"]["windows_used"], 14);
    assert_eq!(big["isi_histogram"]["edges"].as_array().unwrap().len(), 50);
    assert_eq!(
        big["amplitude_histogram"]["edges"].as_array().unwrap().len(),
        41
    );

    assert_eq!(channel["cross_correlograms"].as_array().unwrap().len(), 1);
    assert_eq!(channel["marker_correlograms"].as_array().unwrap().len(), 2);

    let average = &channel["event_averages"][0];
    assert_eq!(average["marker"], 1);
    assert_eq!(average["waveform"]["windows_used"], 2);

    assert!(export_dir.join("spiketimes_rec_channel1_cluster2.csv").exists());
    assert!(export_dir.join("event_average_rec_channel1.csv").exists());
}

#[test]
fn test_analyze_rejects_zero_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    spikesort()
        .args(["analyze", "--thresholds", "800", "--interval-ms", "0", "--file"])
        .arg(&path)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_analyze_rejects_window_longer_than_recording() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");

    spikesort()
        .args(["analyze", "--thresholds", "800", "--interval-ms", "1e13", "--file"])
        .arg(&path)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("longer than the recording"));
}

// =============================================================================
// BATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_batch_requires_input() {
    spikesort()
        .arg("batch")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("must be specified"));
}

#[test]
fn test_batch_dry_run_lists_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    write_recording(tmp.path(), "a.wav");
    write_recording(tmp.path(), "b.wav");

    spikesort()
        .arg("batch")
        .arg("--glob")
        .arg(format!("{}/*.wav", tmp.path().display()))
        .arg("--thresholds")
        .arg("[800;250 800]")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("a_set1\t800"))
        .stdout(predicate::str::contains("b_set2\t250 800"))
        .stderr(predicate::str::contains("Planned 4 job(s)"));
}

#[test]
fn test_batch_threshold_sets_to_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_recording(tmp.path(), "rec.wav");
    let out = tmp.path().join("out");

    spikesort()
        .arg("batch")
        .arg("--files")
        .arg(&path)
        .arg("--thresholds")
        .arg("[800;250 800]")
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("2/2 succeeded"));

    let first: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("rec_set1_sort.json")).unwrap()).unwrap();
    assert_eq!(first["thresholds"], serde_json::json!([800]));
    assert_eq!(first["result"]["channels"][0]["clusters"].as_array().unwrap().len(), 1);

    let second: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("rec_set2_sort.json")).unwrap()).unwrap();
    assert_eq!(second["result"]["channels"][0]["clusters"].as_array().unwrap().len(), 2);
    assert!(out.join("spiketimes_rec_set2_channel1_cluster2.csv").exists());
}

#[test]
fn test_batch_jsonl_to_stdout() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_recording(tmp.path(), "a.wav");
    let b = write_recording(tmp.path(), "b.wav");

    let output = spikesort()
        .arg("batch")
        .arg("--files")
        .arg(&a)
        .arg(&b)
        .arg("--thresholds")
        .arg("800")
        .arg("--quiet")
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(first["output_name"], "a");
    assert_eq!(second["output_name"], "b");
}

#[test]
fn test_batch_partial_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let good = write_recording(tmp.path(), "good.wav");
    let missing = tmp.path().join("missing.wav");

    spikesort()
        .arg("batch")
        .arg("--files")
        .arg(&good)
        .arg(&missing)
        .arg("--thresholds")
        .arg("800")
        .arg("--continue-on-error")
        .arg("--output-dir")
        .arg(tmp.path().join("out"))
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("1/2 succeeded"));
}
