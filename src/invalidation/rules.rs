//! Invalidation Rules
//!
//! Static mapping from a mutated entity type to every cache family that may
//! hold a derived view of it. Read paths build their keys from the same
//! namespace constants, so a rule and the keys it purges share one vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::encode_component;

/// Cache namespaces used by the learning platform's read paths.
pub mod namespaces {
    /// Paginated course list shown to administrators
    pub const ADMIN_COURSES: &str = "admin:courses";
    /// Paginated course catalogue shown to learners
    pub const USER_COURSES: &str = "user:courses";
    /// One course with its lesson count, admin view
    pub const ADMIN_COURSE_DETAILS: &str = "admin:course:details";
    /// One course with enrollment state, learner view
    pub const USER_COURSE_DETAILS: &str = "user:course:details";
    /// Lessons belonging to one course
    pub const COURSE_LESSONS: &str = "course:lessons";
    /// One lesson
    pub const LESSON_DETAILS: &str = "lesson:details";
    /// Dashboard counters (courses, lessons, enrollments)
    pub const ADMIN_STATS: &str = "admin:stats";
    /// A learner's enrolled courses
    pub const USER_ENROLLMENTS: &str = "user:enrollments";
    /// A learner's completion progress
    pub const USER_PROGRESS: &str = "user:progress";

    /// Key parameter carrying a course id
    pub const COURSE_ID: &str = "courseId";
    /// Key parameter carrying a lesson id
    pub const LESSON_ID: &str = "lessonId";
}

/// Placeholder substituted with the mutated entity's id.
pub const ID_PLACEHOLDER: &str = "{id}";

// == Entity Type ==
/// Entities whose mutations invalidate cached views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Course,
    Lesson,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Course => "course",
            EntityType::Lesson => "lesson",
        }
    }

    /// The entity whose aggregates change when this one mutates.
    pub fn parent(&self) -> Option<EntityType> {
        match self {
            EntityType::Course => None,
            EntityType::Lesson => Some(EntityType::Course),
        }
    }

    /// The static rule for this entity type.
    pub fn rule(&self) -> &'static InvalidationRule {
        match self {
            EntityType::Course => &COURSE_RULE,
            EntityType::Lesson => &LESSON_RULE,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "course" | "courses" => Ok(EntityType::Course),
            "lesson" | "lessons" => Ok(EntityType::Lesson),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

// == Invalidation Rule ==
/// Key patterns purged when an entity of one type mutates.
#[derive(Debug)]
pub struct InvalidationRule {
    /// Templates embedding the entity id via [`ID_PLACEHOLDER`]
    pub scoped: &'static [&'static str],
    /// Unscoped list and aggregate families, always purged
    pub collections: &'static [&'static str],
}

impl InvalidationRule {
    // == Patterns ==
    /// Concrete glob patterns for a mutation of `entity_id`: scoped
    /// templates first, in declaration order, then collection patterns.
    pub fn patterns(&self, entity_id: &str) -> Vec<String> {
        let id = escape_glob(&encode_component(entity_id));
        self.scoped
            .iter()
            .map(|template| template.replace(ID_PLACEHOLDER, &id))
            .chain(self.collections.iter().map(|p| p.to_string()))
            .collect()
    }
}

/// Escapes glob metacharacters so an id only ever matches itself.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// Detail and per-course keys may carry extra parameters sorted on either
// side of the id, hence the `*` before the id segment and the `:*` variant.
static COURSE_RULE: InvalidationRule = InvalidationRule {
    scoped: &[
        "admin:course:details*:courseId:{id}",
        "admin:course:details*:courseId:{id}:*",
        "user:course:details*:courseId:{id}",
        "user:course:details*:courseId:{id}:*",
        "course:lessons*:courseId:{id}",
        "course:lessons*:courseId:{id}:*",
    ],
    collections: &[
        "admin:courses*",
        "user:courses*",
        "admin:stats*",
        "user:progress*",
        "user:enrollments*",
    ],
};

static LESSON_RULE: InvalidationRule = InvalidationRule {
    scoped: &[
        "lesson:details*:lessonId:{id}",
        "lesson:details*:lessonId:{id}:*",
    ],
    collections: &["course:lessons*", "user:progress*", "admin:stats*"],
};
