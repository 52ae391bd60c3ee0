//! Skill taxonomy and scoring.
//!
//! Pure functions mapping skill names onto the 8-point NSQF scale and
//! computing recency and proficiency scores. Every result here feeds signed
//! documents, so the arithmetic must stay exactly as written.

use chrono::{DateTime, Utc};

use crate::types::{CredentialType, SkillCategory, VerificationStatus};

/// A fixed taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxonomyEntry {
    pub name: &'static str,
    pub category: SkillCategory,
    pub base_level: u8,
}

const fn entry(name: &'static str, category: SkillCategory, base_level: u8) -> TaxonomyEntry {
    TaxonomyEntry {
        name,
        category,
        base_level,
    }
}

/// Known skills, keyed by normalized name.
pub const SKILL_TAXONOMY: &[TaxonomyEntry] = &[
    entry("javascript", SkillCategory::Technical, 3),
    entry("python", SkillCategory::Technical, 3),
    entry("java", SkillCategory::Technical, 3),
    entry("react", SkillCategory::Technical, 4),
    entry("node.js", SkillCategory::Technical, 4),
    entry("mongodb", SkillCategory::Technical, 3),
    entry("sql", SkillCategory::Technical, 3),
    entry("machine learning", SkillCategory::Technical, 6),
    entry("data science", SkillCategory::Technical, 5),
    entry("cloud computing", SkillCategory::Technical, 4),
    entry("communication", SkillCategory::Soft, 2),
    entry("leadership", SkillCategory::Soft, 5),
    entry("teamwork", SkillCategory::Soft, 2),
    entry("project management", SkillCategory::Soft, 5),
    entry("problem solving", SkillCategory::Soft, 3),
];

/// Base level for skills missing from the taxonomy.
pub const DEFAULT_BASE_LEVEL: u8 = 3;

pub const MIN_NSQF_LEVEL: u8 = 1;
pub const MAX_NSQF_LEVEL: u8 = 8;

/// Display names for NSQF levels 1 through 8.
pub const NSQF_LEVEL_NAMES: [&str; 8] = [
    "Entry Level",
    "Basic",
    "Intermediate",
    "Advanced",
    "Specialist",
    "Professional",
    "Senior Professional",
    "Expert",
];

/// Name of an NSQF level, if in range.
pub fn nsqf_level_name(level: u8) -> Option<&'static str> {
    if (MIN_NSQF_LEVEL..=MAX_NSQF_LEVEL).contains(&level) {
        Some(NSQF_LEVEL_NAMES[(level - 1) as usize])
    } else {
        None
    }
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_skill_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Look up a skill in the fixed taxonomy.
pub fn lookup(name: &str) -> Option<&'static TaxonomyEntry> {
    let key = normalize_skill_name(name);
    SKILL_TAXONOMY.iter().find(|e| e.name == key)
}

/// Result of mapping a skill onto the NSQF scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsqfMapping {
    pub level: u8,
    pub category: SkillCategory,
}

/// Map a skill name to an NSQF level and category.
///
/// Base level from the taxonomy, +1 for certifications, +1 for experience
/// credentials covering more than three years, +0.5 for education; rounded
/// half up and clamped to 1..=8.
pub fn map_skill_to_nsqf(
    skill_name: &str,
    credential_type: CredentialType,
    experience_years: f64,
) -> NsqfMapping {
    let (base, category) = match lookup(skill_name) {
        Some(e) => (e.base_level, e.category),
        None => (DEFAULT_BASE_LEVEL, SkillCategory::Technical),
    };

    let mut level = base as f64;
    if credential_type == CredentialType::Certification {
        level += 1.0;
    }
    if credential_type == CredentialType::Experience && experience_years > 3.0 {
        level += 1.0;
    }
    if credential_type == CredentialType::Education {
        level += 0.5;
    }

    let level = level
        .round()
        .clamp(MIN_NSQF_LEVEL as f64, MAX_NSQF_LEVEL as f64) as u8;

    NsqfMapping { level, category }
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Step score for how recently a skill was last verified.
pub fn recency_score(last_verified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(last) = last_verified else {
        return 0;
    };
    let days = (now - last).num_milliseconds() as f64 / MILLIS_PER_DAY;

    if days < 30.0 {
        100
    } else if days < 90.0 {
        90
    } else if days < 180.0 {
        75
    } else if days < 365.0 {
        60
    } else if days < 730.0 {
        40
    } else {
        20
    }
}

/// Proficiency from the number of sources and the recency score.
pub fn proficiency(source_count: usize, recency: u32) -> u32 {
    let raw = 50.0 + source_count as f64 * 15.0 + recency as f64 * 0.3;
    raw.round().min(100.0) as u32
}

/// Weight of a source by credential type and status.
pub fn source_weight(credential_type: CredentialType, status: VerificationStatus) -> f64 {
    if status == VerificationStatus::Pending {
        return 0.5;
    }
    match credential_type {
        CredentialType::Certification => 1.0,
        CredentialType::Education => 0.9,
        CredentialType::Assessment => 0.85,
        CredentialType::Experience => 0.8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_skill_name("  Machine   Learning "), "machine learning");
        assert_eq!(normalize_skill_name("Node.JS"), "node.js");
        assert_eq!(normalize_skill_name("   "), "");
    }

    #[test]
    fn test_map_known_and_unknown() {
        let m = map_skill_to_nsqf("React", CredentialType::Assessment, 0.0);
        assert_eq!(m, NsqfMapping { level: 4, category: SkillCategory::Technical });

        let m = map_skill_to_nsqf("Leadership", CredentialType::Certification, 5.0);
        assert_eq!(m, NsqfMapping { level: 6, category: SkillCategory::Soft });

        let m = map_skill_to_nsqf("Leadership", CredentialType::Experience, 5.0);
        assert_eq!(m, NsqfMapping { level: 6, category: SkillCategory::Soft });

        let m = map_skill_to_nsqf("COBOL", CredentialType::Experience, 0.0);
        assert_eq!(m, NsqfMapping { level: 3, category: SkillCategory::Technical });
    }

    #[test]
    fn test_education_rounds_half_up() {
        // 3 + 0.5 = 3.5 -> 4
        assert_eq!(map_skill_to_nsqf("python", CredentialType::Education, 0.0).level, 4);
        // 6 + 0.5 = 6.5 -> 7
        assert_eq!(
            map_skill_to_nsqf("machine learning", CredentialType::Education, 10.0).level,
            7
        );
    }

    #[test]
    fn test_years_only_count_for_experience() {
        for ty in [
            CredentialType::Certification,
            CredentialType::Education,
            CredentialType::Assessment,
        ] {
            assert_eq!(
                map_skill_to_nsqf("sql", ty, 10.0),
                map_skill_to_nsqf("sql", ty, 0.0),
                "{:?}",
                ty
            );
        }
        assert_eq!(
            map_skill_to_nsqf("machine learning", CredentialType::Certification, 4.0).level,
            7
        );
    }

    #[test]
    fn test_experience_threshold_is_strict() {
        assert_eq!(map_skill_to_nsqf("sql", CredentialType::Experience, 3.0).level, 3);
        assert_eq!(map_skill_to_nsqf("sql", CredentialType::Experience, 3.5).level, 4);
    }

    #[test]
    fn test_recency_steps() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now - Duration::days(29)), now), 100);
        assert_eq!(recency_score(Some(now - Duration::days(31)), now), 90);
        assert_eq!(recency_score(Some(now - Duration::days(100)), now), 75);
        assert_eq!(recency_score(Some(now - Duration::days(200)), now), 60);
        assert_eq!(recency_score(Some(now - Duration::days(400)), now), 40);
        assert_eq!(recency_score(Some(now - Duration::days(800)), now), 20);
        assert_eq!(recency_score(None, now), 0);
    }

    #[test]
    fn test_proficiency_formula() {
        assert_eq!(proficiency(0, 0), 50);
        assert_eq!(proficiency(1, 100), 95);
        // 50 + 15 + 22.5 = 87.5 -> 88
        assert_eq!(proficiency(1, 75), 88);
        assert_eq!(proficiency(2, 100), 100);
        assert_eq!(proficiency(10, 20), 100);
    }

    #[test]
    fn test_source_weights() {
        use CredentialType::*;
        use VerificationStatus::*;
        assert_eq!(source_weight(Certification, Pending), 0.5);
        assert_eq!(source_weight(Certification, Verified), 1.0);
        assert_eq!(source_weight(Education, Verified), 0.9);
        assert_eq!(source_weight(Assessment, Verified), 0.85);
        assert_eq!(source_weight(Experience, Verified), 0.8);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(nsqf_level_name(1), Some("Entry Level"));
        assert_eq!(nsqf_level_name(8), Some("Expert"));
        assert_eq!(nsqf_level_name(0), None);
        assert_eq!(nsqf_level_name(9), None);
    }
}
