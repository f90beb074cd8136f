use crate::types::{round_to, ComparisonArtifact, ComparisonRequest, ComparisonResult, SERIALIZED_DECIMALS};

pub const SUMMARY_NAME: &str = "report.txt";
pub const SUMMARY_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const TITLE: &str = "Student Singing Evaluation Report";

pub(super) fn render_summary(
    request: &ComparisonRequest,
    result: &ComparisonResult,
    transcript: Option<&str>,
) -> ComparisonArtifact {
    let mut lines = vec![
        TITLE.to_string(),
        "=".repeat(TITLE.len()),
        String::new(),
        format!("Requester:            {}", request.requester_id),
        format!("Student recording:    {}", request.student_audio_url),
        format!("Reference recording:  {}", request.reference_audio_url),
        String::new(),
        format!("Pitch difference:     {:.2} Hz", rounded(result.pitch_difference)),
        format!("Timing difference:    {:.2} RMS", rounded(result.timing_difference)),
        format!(
            "Length difference:    {:.2} s",
            rounded(result.length_difference_seconds)
        ),
    ];
    if let Some(chroma) = result.chroma_difference {
        lines.push(format!("Chroma difference:    {:.2}", rounded(chroma)));
    }
    if let Some(score) = result.composite_score {
        lines.push(format!("Overall score:        {:.2} / 100", rounded(score)));
    }
    if let Some(transcript) = transcript {
        lines.push(String::new());
        lines.push("Transcript Feedback".to_string());
        lines.push("-------------------".to_string());
        lines.push(transcript.to_string());
    }

    let mut text = lines.join("\n");
    text.push('\n');
    ComparisonArtifact {
        bytes: text.into_bytes(),
        suggested_name: SUMMARY_NAME.to_string(),
        content_type: SUMMARY_CONTENT_TYPE,
    }
}

fn rounded(value: f64) -> f64 {
    round_to(value, SERIALIZED_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ComparisonRequest {
        ComparisonRequest {
            student_audio_url: "https://example.com/s.wav".into(),
            reference_audio_url: "https://example.com/r.wav".into(),
            requester_id: "student@example.com".into(),
            callback_url: "https://hooks.example.com/1".into(),
        }
    }

    fn result() -> ComparisonResult {
        ComparisonResult {
            pitch_difference: 12.346,
            timing_difference: 0.0321,
            composite_score: Some(71.987),
            chroma_difference: None,
            length_difference_seconds: 0.0,
        }
    }

    #[test]
    fn summary_lists_rounded_metrics() {
        let artifact = render_summary(&request(), &result(), None);
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert!(text.starts_with("Student Singing Evaluation Report\n"));
        assert!(text.contains("student@example.com"));
        assert!(text.contains("Pitch difference:     12.35 Hz"));
        assert!(text.contains("Overall score:        71.99 / 100"));
        assert!(!text.contains("Chroma"));
        assert!(!text.contains("Transcript"));
        assert_eq!(artifact.suggested_name, "report.txt");
    }

    #[test]
    fn transcript_gets_its_own_section() {
        let artifact = render_summary(&request(), &result(), Some("amazing grace"));
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert!(text.ends_with("Transcript Feedback\n-------------------\namazing grace\n"));
    }
}
