use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use hound::{SampleFormat, WavSpec, WavWriter};
use predicates::prelude::*;
use reqwest::Url;
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 22_050;

fn singalyzer() -> Command {
    let mut cmd = Command::cargo_bin("singalyzer").expect("binary builds");
    for var in [
        "SINGALYZER_CONFIG",
        "SINGALYZER_OUTPUT_DIR",
        "SINGALYZER_UPLOAD_URL",
        "SINGALYZER_WORKERS",
        "SINGALYZER_TRANSCRIBE_URL",
        "SINGALYZER_TRANSCRIBE_TOKEN",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn analyze_prints_result_json_and_writes_chart() {
    let dir = tempdir().unwrap();
    let student = dir.path().join("student.wav");
    let reference = dir.path().join("reference.wav");
    let chart = dir.path().join("chart.svg");
    write_tone(&student, 445.0, 1.0);
    write_tone(&reference, 440.0, 1.0);

    let output = singalyzer()
        .arg("analyze")
        .arg(&student)
        .arg(&reference)
        .arg("--chart")
        .arg(&chart)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let pitch = json["pitch_difference"].as_f64().unwrap();
    assert!((pitch - 5.0).abs() < 2.0, "pitch difference {pitch}");
    assert!(json["composite_score"].as_f64().unwrap() > 50.0);
    assert!(fs::read_to_string(&chart).unwrap().contains("<svg"));
}

#[test]
fn analyze_reports_decode_failure() {
    let dir = tempdir().unwrap();
    let bogus = dir.path().join("notes.txt");
    let reference = dir.path().join("reference.wav");
    fs::write(&bogus, "la la la").unwrap();
    write_tone(&reference, 440.0, 0.5);

    singalyzer()
        .arg("analyze")
        .arg(&bogus)
        .arg(&reference)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Decoding stage failed"));
}

#[test]
fn compare_rejects_incomplete_request() {
    singalyzer()
        .args([
            "compare",
            "--request-json",
            r#"{"student_audio_url": "https://example.com/s.wav", "requester_id": "a"}"#,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required field"));
}

#[test]
fn compare_runs_local_files_into_output_dir() {
    let dir = tempdir().unwrap();
    let student = dir.path().join("student.wav");
    let reference = dir.path().join("reference.wav");
    let artifacts = dir.path().join("artifacts");
    write_tone(&student, 440.0, 1.0);
    write_tone(&reference, 440.0, 1.0);

    let request = serde_json::json!({
        "student_url": Url::from_file_path(&student).unwrap().to_string(),
        "professor_url": reference.to_str().unwrap(),
        "student_email": "Student@Example.com",
        // nothing listens on the discard port, so delivery fails without a retry
        "callback_url": "http://127.0.0.1:9/hook",
    });

    singalyzer()
        .arg("compare")
        .arg("--request-json")
        .arg(request.to_string())
        .arg("--output-dir")
        .arg(&artifacts)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"requester_id\": \"Student@Example.com\""))
        .stdout(predicate::str::contains("file://"));

    let runs = run_dirs(&artifacts.join("student-example-com"));
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("comparison.svg").is_file());
    assert!(fs::read_to_string(runs[0].join("report.txt"))
        .unwrap()
        .contains("Pitch difference"));
}

#[test]
fn compare_runs_valid_requests_past_an_invalid_one() {
    let dir = tempdir().unwrap();
    let student = dir.path().join("student.wav");
    let reference = dir.path().join("reference.wav");
    let artifacts = dir.path().join("artifacts");
    let requests = dir.path().join("requests.json");
    write_tone(&student, 440.0, 1.0);
    write_tone(&reference, 440.0, 1.0);
    let batch = serde_json::json!([
        {
            "student_audio_url": student.to_str().unwrap(),
            "requester_id": "incomplete@example.com",
        },
        {
            "student_audio_url": student.to_str().unwrap(),
            "reference_audio_url": reference.to_str().unwrap(),
            "requester_id": "complete@example.com",
            "callback_url": "http://127.0.0.1:9/hook",
        },
    ]);
    fs::write(&requests, batch.to_string()).unwrap();

    singalyzer()
        .arg("compare")
        .arg("--request-file")
        .arg(&requests)
        .arg("--output-dir")
        .arg(&artifacts)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"requester_id\": \"complete@example.com\""))
        .stdout(predicate::str::contains("incomplete@example.com").not())
        .stderr(predicate::str::contains("request #0 is invalid"))
        .stderr(predicate::str::contains("1 of 2 requests were invalid"));

    assert_eq!(run_dirs(&artifacts.join("complete-example-com")).len(), 1);
    assert!(!artifacts.join("incomplete-example-com").exists());
}

fn run_dirs(requester_dir: &Path) -> Vec<std::path::PathBuf> {
    fs::read_dir(requester_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_dir())
        .collect()
}

fn write_tone(path: &Path, frequency: f32, seconds: f32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let total = (SAMPLE_RATE as f32 * seconds) as usize;
    for n in 0..total {
        let sample = (2.0 * PI * frequency * n as f32 / SAMPLE_RATE as f32).sin() * 0.5;
        writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}
