//! Academic records held by the issuing university.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Graduated,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub university_id: String,
    pub degree: String,
    pub enrollment_year: u32,
    #[serde(default)]
    pub status: StudentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_code: String,
    pub subject_name: String,
    pub credits: u32,
    /// 1-5.
    pub difficulty_level: u32,
    #[serde(default)]
    pub mapped_skills: Vec<String>,
}

impl Subject {
    /// Whether this subject teaches `skill` (case-insensitive, trimmed).
    pub fn maps_skill(&self, skill: &str) -> bool {
        let wanted = skill.trim().to_lowercase();
        self.mapped_skills
            .iter()
            .any(|s| s.trim().to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentMark {
    pub student_id: String,
    pub subject_code: String,
    /// 0-100, fractional marks allowed.
    pub marks: f64,
    pub semester: u32,
}

/// Proof-of-verification anchor; the id is the integrity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: String,
    pub student_id: String,
    pub university_id: String,
    pub degree: String,
    pub issued_at: DateTime<Utc>,
    pub integrity_hash: String,
}

/// Read access to academic records plus the certificate ledger.
#[async_trait]
pub trait AcademicRecords: Send + Sync {
    async fn student(&self, student_id: &str) -> Result<Option<Student>>;

    async fn subjects(&self) -> Result<Vec<Subject>>;

    /// Marks for `student_id` in any of `subject_codes`, in record order.
    async fn marks(&self, student_id: &str, subject_codes: &[String]) -> Result<Vec<StudentMark>>;

    /// Store a certificate. Returns false if the id already existed.
    async fn save_certificate(&self, certificate: &Certificate) -> Result<bool>;

    async fn certificate(&self, certificate_id: &str) -> Result<Option<Certificate>>;

    /// Subjects whose mapped skills include `skill`.
    async fn subjects_for_skill(&self, skill: &str) -> Result<Vec<Subject>> {
        Ok(self
            .subjects()
            .await?
            .into_iter()
            .filter(|s| s.maps_skill(skill))
            .collect())
    }
}

/// Seed file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcademicSeed {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub marks: Vec<StudentMark>,
}

impl AcademicSeed {
    /// Load a JSON seed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Built-in demo data: one student with a React-mapped web subject.
    pub fn demo() -> Self {
        Self {
            students: vec![Student {
                student_id: "STU001".into(),
                full_name: "Test Student".into(),
                university_id: "UNI001".into(),
                degree: "B.Tech Computer Science".into(),
                enrollment_year: 2021,
                status: StudentStatus::Active,
            }],
            subjects: vec![Subject {
                subject_code: "CS301".into(),
                subject_name: "Web Technologies".into(),
                credits: 4,
                difficulty_level: 3,
                mapped_skills: vec!["React".into()],
            }],
            marks: vec![StudentMark {
                student_id: "STU001".into(),
                subject_code: "CS301".into(),
                marks: 78.0,
                semester: 5,
            }],
        }
    }
}

#[derive(Default)]
struct MemoryRecordsInner {
    students: HashMap<String, Student>,
    subjects: Vec<Subject>,
    marks: Vec<StudentMark>,
    certificates: HashMap<String, Certificate>,
}

/// In-memory academic records.
#[derive(Default)]
pub struct MemoryRecords {
    inner: RwLock<MemoryRecordsInner>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: AcademicSeed) -> Self {
        let inner = MemoryRecordsInner {
            students: seed
                .students
                .into_iter()
                .map(|s| (s.student_id.clone(), s))
                .collect(),
            subjects: seed.subjects,
            marks: seed.marks,
            certificates: HashMap::new(),
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn add_mark(&self, mark: StudentMark) {
        self.inner.write().await.marks.push(mark);
    }

    pub async fn add_subject(&self, subject: Subject) {
        self.inner.write().await.subjects.push(subject);
    }
}

#[async_trait]
impl AcademicRecords for MemoryRecords {
    async fn student(&self, student_id: &str) -> Result<Option<Student>> {
        Ok(self.inner.read().await.students.get(student_id).cloned())
    }

    async fn subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.inner.read().await.subjects.clone())
    }

    async fn marks(&self, student_id: &str, subject_codes: &[String]) -> Result<Vec<StudentMark>> {
        Ok(self
            .inner
            .read()
            .await
            .marks
            .iter()
            .filter(|m| m.student_id == student_id && subject_codes.contains(&m.subject_code))
            .cloned()
            .collect())
    }

    async fn save_certificate(&self, certificate: &Certificate) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.certificates.contains_key(&certificate.certificate_id) {
            return Ok(false);
        }
        inner
            .certificates
            .insert(certificate.certificate_id.clone(), certificate.clone());
        Ok(true)
    }

    async fn certificate(&self, certificate_id: &str) -> Result<Option<Certificate>> {
        Ok(self.inner.read().await.certificates.get(certificate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subjects_for_skill_ignores_case_and_padding() {
        let records = MemoryRecords::from_seed(AcademicSeed::demo());
        assert_eq!(records.subjects_for_skill("  react ").await.unwrap().len(), 1);
        assert!(records.subjects_for_skill("COBOL").await.unwrap().is_empty());
    }

    #[test]
    fn test_seed_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let seed = AcademicSeed::demo();
        std::fs::write(&path, serde_json::to_string(&seed).unwrap()).unwrap();
        assert_eq!(AcademicSeed::load(&path).unwrap(), seed);
    }

    #[test]
    fn test_seed_status_defaults_to_active() {
        let seed: AcademicSeed = serde_json::from_str(
            r#"{"students": [{"student_id": "S", "full_name": "N", "university_id": "U",
                "degree": "D", "enrollment_year": 2020}]}"#,
        )
        .unwrap();
        assert_eq!(seed.students[0].status, StudentStatus::Active);
    }

    #[tokio::test]
    async fn test_seed_accepts_fractional_and_whole_marks() {
        let seed: AcademicSeed = serde_json::from_str(
            r#"{"marks": [
                {"student_id": "S", "subject_code": "CS1", "marks": 72.5, "semester": 1},
                {"student_id": "S", "subject_code": "CS2", "marks": 64, "semester": 2}
            ]}"#,
        )
        .unwrap();
        let records = MemoryRecords::from_seed(seed);
        let marks = records
            .marks("S", &["CS1".to_string(), "CS2".to_string()])
            .await
            .unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].marks, 72.5);
        assert_eq!(marks[1].marks, 64.0);
    }
}
