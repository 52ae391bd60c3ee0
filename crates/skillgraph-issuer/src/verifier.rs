//! The university's skill verification engine.
//!
//! Decides from academic records alone whether a student has demonstrated a
//! skill. Its verdict is authoritative: callers report it, never re-derive it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skillgraph_core::{canonical_bytes, Sha256Hash};

use crate::error::Result;
use crate::records::{AcademicRecords, Certificate, Student, StudentMark};

/// Minimum mark for a subject to count as evidence.
pub const PASS_MARK: f64 = 40.0;

/// Confidence reported when the student failed every relevant subject.
pub const FAILED_SUBJECTS_CONFIDENCE: u32 = 25;

/// Why a skill could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    StudentNotFound,
    SkillNotRecognizedByUniversity,
    NoRelevantAcademicRecord,
    FailedRelevantSubjects,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::StudentNotFound => "STUDENT_NOT_FOUND",
            RejectionReason::SkillNotRecognizedByUniversity => "SKILL_NOT_RECOGNIZED_BY_UNIVERSITY",
            RejectionReason::NoRelevantAcademicRecord => "NO_RELEVANT_ACADEMIC_RECORD",
            RejectionReason::FailedRelevantSubjects => "FAILED_RELEVANT_SUBJECTS",
        }
    }
}

/// The academic evidence behind a positive verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub student_id: String,
    pub university_id: String,
    pub degree: String,
    pub skill: String,
    pub subject_code: String,
    pub marks: f64,
    pub credits: u32,
    pub difficulty: u32,
    pub nsqf_level: u8,
    pub certificate_id: String,
}

/// Outcome of [`verify_skill`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillVerdict {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    pub confidence: u32,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl SkillVerdict {
    fn rejected(reason: RejectionReason, confidence: u32) -> Self {
        Self {
            verified: false,
            reason: Some(reason),
            confidence,
            evidence: None,
        }
    }

    pub fn nsqf_level(&self) -> Option<u8> {
        self.evidence.as_ref().map(|e| e.nsqf_level)
    }

    pub fn certificate_id(&self) -> Option<&str> {
        self.evidence.as_ref().map(|e| e.certificate_id.as_str())
    }
}

/// NSQF level from marks (0-100), credits and difficulty (1-5).
pub fn nsqf_level(marks: f64, credits: u32, difficulty: u32) -> u8 {
    let performance = marks / 100.0;
    let volume = (credits as f64 / 5.0).min(1.0);
    let complexity = difficulty as f64 / 5.0;
    let composite = 0.5 * performance + 0.3 * volume + 0.2 * complexity;

    match composite {
        c if c >= 0.85 => 8,
        c if c >= 0.75 => 7,
        c if c >= 0.65 => 6,
        c if c >= 0.55 => 5,
        c if c >= 0.45 => 4,
        c if c >= 0.35 => 3,
        c if c >= 0.25 => 2,
        _ => 1,
    }
}

/// Content-addressed certificate id: hex SHA-256 of the canonical evidence.
pub fn certificate_id(
    student: &Student,
    skill: &str,
    subject_code: &str,
    marks: f64,
    nsqf_level: u8,
) -> String {
    let payload = json!({
        "student_id": student.student_id,
        "university_id": student.university_id,
        "degree": student.degree,
        "skill": skill,
        "subject_code": subject_code,
        "marks": mark_value(marks),
        "nsqf_level": nsqf_level,
    });
    Sha256Hash::hash(&canonical_bytes(&payload)).to_hex()
}

/// Whole marks hash as JSON integers, so `78` and `78.0` name one certificate.
fn mark_value(marks: f64) -> Value {
    if marks.fract() == 0.0 && marks.abs() < i64::MAX as f64 {
        Value::from(marks as i64)
    } else {
        Value::from(marks)
    }
}

/// Verify that `student_id` has academic evidence for `skill_name`.
///
/// Positive verdicts persist a certificate; re-verifying the same evidence
/// yields the same certificate id and does not duplicate it.
pub async fn verify_skill(
    records: &dyn AcademicRecords,
    student_id: &str,
    skill_name: &str,
    now: DateTime<Utc>,
) -> Result<SkillVerdict> {
    let Some(student) = records.student(student_id).await? else {
        return Ok(SkillVerdict::rejected(RejectionReason::StudentNotFound, 0));
    };

    let subjects = records.subjects_for_skill(skill_name).await?;
    if subjects.is_empty() {
        return Ok(SkillVerdict::rejected(
            RejectionReason::SkillNotRecognizedByUniversity,
            0,
        ));
    }

    let codes: Vec<String> = subjects.iter().map(|s| s.subject_code.clone()).collect();
    let marks = records.marks(student_id, &codes).await?;
    if marks.is_empty() {
        return Ok(SkillVerdict::rejected(
            RejectionReason::NoRelevantAcademicRecord,
            0,
        ));
    }

    // Strongest passing result; earlier records win ties.
    let best = marks
        .iter()
        .filter(|m| m.marks >= PASS_MARK)
        .fold(None, |best: Option<&StudentMark>, m| match best {
            Some(b) if m.marks <= b.marks => Some(b),
            _ => Some(m),
        });
    let Some(best) = best else {
        return Ok(SkillVerdict::rejected(
            RejectionReason::FailedRelevantSubjects,
            FAILED_SUBJECTS_CONFIDENCE,
        ));
    };

    let Some(subject) = subjects.iter().find(|s| s.subject_code == best.subject_code) else {
        return Ok(SkillVerdict::rejected(
            RejectionReason::NoRelevantAcademicRecord,
            0,
        ));
    };

    let confidence = best.marks.clamp(0.0, 100.0).round() as u32;
    let level = nsqf_level(best.marks, subject.credits, subject.difficulty_level);
    let skill = skill_name.trim().to_string();
    let id = certificate_id(&student, &skill, &best.subject_code, best.marks, level);

    let certificate = Certificate {
        certificate_id: id.clone(),
        student_id: student.student_id.clone(),
        university_id: student.university_id.clone(),
        degree: student.degree.clone(),
        issued_at: now,
        integrity_hash: id.clone(),
    };
    if records.save_certificate(&certificate).await? {
        tracing::info!(certificate_id = %id, student_id, skill = %skill, "issued certificate");
    }

    Ok(SkillVerdict {
        verified: true,
        reason: None,
        confidence,
        evidence: Some(Evidence {
            student_id: student.student_id,
            university_id: student.university_id,
            degree: student.degree,
            skill,
            subject_code: best.subject_code.clone(),
            marks: best.marks,
            credits: subject.credits,
            difficulty: subject.difficulty_level,
            nsqf_level: level,
            certificate_id: id,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AcademicSeed, MemoryRecords, Subject};

    fn records() -> MemoryRecords {
        MemoryRecords::from_seed(AcademicSeed::demo())
    }

    #[tokio::test]
    async fn test_demo_student_verifies_react() {
        let records = records();
        let verdict = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert!(verdict.verified);
        assert_eq!(verdict.confidence, 78);
        assert_eq!(verdict.nsqf_level(), Some(7));

        let evidence = verdict.evidence.as_ref().unwrap();
        assert_eq!(evidence.subject_code, "CS301");
        assert_eq!(evidence.university_id, "UNI001");
        assert_eq!(evidence.certificate_id.len(), 64);

        let stored = records.certificate(&evidence.certificate_id).await.unwrap();
        assert_eq!(stored.unwrap().degree, "B.Tech Computer Science");
    }

    #[tokio::test]
    async fn test_verification_is_deterministic() {
        let records = records();
        let a = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        let b = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert_eq!(a.certificate_id(), b.certificate_id());
    }

    #[tokio::test]
    async fn test_hard_gates() {
        let records = records();

        let v = verify_skill(&records, "STU999", "React", Utc::now()).await.unwrap();
        assert_eq!(v.reason, Some(RejectionReason::StudentNotFound));

        let v = verify_skill(&records, "STU001", "COBOL", Utc::now()).await.unwrap();
        assert_eq!(v.reason, Some(RejectionReason::SkillNotRecognizedByUniversity));
        assert_eq!(v.confidence, 0);

        records
            .add_subject(Subject {
                subject_code: "CS410".into(),
                subject_name: "Distributed Systems".into(),
                credits: 3,
                difficulty_level: 4,
                mapped_skills: vec!["Go".into()],
            })
            .await;
        let v = verify_skill(&records, "STU001", "Go", Utc::now()).await.unwrap();
        assert_eq!(v.reason, Some(RejectionReason::NoRelevantAcademicRecord));

        records
            .add_mark(StudentMark {
                student_id: "STU001".into(),
                subject_code: "CS410".into(),
                marks: 39.0,
                semester: 7,
            })
            .await;
        let v = verify_skill(&records, "STU001", "Go", Utc::now()).await.unwrap();
        assert_eq!(v.reason, Some(RejectionReason::FailedRelevantSubjects));
        assert_eq!(v.confidence, 25);
    }

    #[tokio::test]
    async fn test_best_mark_wins_and_first_wins_ties() {
        let records = records();
        records
            .add_subject(Subject {
                subject_code: "CS302".into(),
                subject_name: "Frontend Engineering".into(),
                credits: 2,
                difficulty_level: 2,
                mapped_skills: vec!["react".into()],
            })
            .await;
        records
            .add_mark(StudentMark {
                student_id: "STU001".into(),
                subject_code: "CS302".into(),
                marks: 78.0,
                semester: 6,
            })
            .await;
        let v = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert_eq!(v.evidence.unwrap().subject_code, "CS301");

        records
            .add_mark(StudentMark {
                student_id: "STU001".into(),
                subject_code: "CS302".into(),
                marks: 91.0,
                semester: 7,
            })
            .await;
        let v = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert_eq!(v.confidence, 91);
        assert_eq!(v.evidence.unwrap().subject_code, "CS302");
    }

    #[test]
    fn test_nsqf_bands() {
        assert_eq!(nsqf_level(78.0, 4, 3), 7);
        assert_eq!(nsqf_level(100.0, 5, 5), 8);
        assert_eq!(nsqf_level(0.0, 0, 1), 1);
        assert_eq!(nsqf_level(40.0, 1, 1), 2);
        assert_eq!(nsqf_level(60.0, 10, 3), 6);
        assert_eq!(nsqf_level(72.5, 4, 3), 6);
    }

    #[tokio::test]
    async fn test_fractional_marks_verify() {
        let whole = verify_skill(&records(), "STU001", "React", Utc::now()).await.unwrap();

        let mut seed = AcademicSeed::demo();
        seed.marks[0].marks = 72.5;
        let records = MemoryRecords::from_seed(seed);
        let v = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert!(v.verified);
        assert_eq!(v.confidence, 73);
        assert_eq!(v.nsqf_level(), Some(6));
        assert_eq!(v.evidence.as_ref().unwrap().marks, 72.5);
        assert_ne!(v.certificate_id(), whole.certificate_id());

        let mut seed = AcademicSeed::demo();
        seed.marks[0].marks = 39.5;
        let records = MemoryRecords::from_seed(seed);
        let v = verify_skill(&records, "STU001", "React", Utc::now()).await.unwrap();
        assert_eq!(v.reason, Some(RejectionReason::FailedRelevantSubjects));
    }

    #[test]
    fn test_whole_marks_hash_as_integers() {
        assert_eq!(mark_value(78.0), json!(78));
        assert_eq!(mark_value(72.5), json!(72.5));
    }

    #[test]
    fn test_rejected_verdict_wire_shape() {
        let v = SkillVerdict::rejected(RejectionReason::StudentNotFound, 0);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({"verified": false, "reason": "STUDENT_NOT_FOUND", "confidence": 0})
        );
    }
}
