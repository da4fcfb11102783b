use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient id used by questions that are not addressed to anybody.
pub const GENERAL_RECIPIENT: &str = "%GENERAL%";
pub const NOBODY_NAME: &str = "%NOBODY%";
pub const UNKNOWN_USER: &str = "Unknown user";
pub const INSTRUCTOR_TEAM: &str = "Instructors";
pub const TEAM_OF_SUFFIX: &str = "'s Team";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantType {
    #[serde(rename = "SELF")]
    Myself,
    Students,
    Instructors,
    Teams,
    OwnTeam,
    OwnTeamMembers,
    OwnTeamMembersIncludingSelf,
    #[serde(rename = "NONE")]
    Nobody,
}

impl ParticipantType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantType::Myself => "SELF",
            ParticipantType::Students => "STUDENTS",
            ParticipantType::Instructors => "INSTRUCTORS",
            ParticipantType::Teams => "TEAMS",
            ParticipantType::OwnTeam => "OWN_TEAM",
            ParticipantType::OwnTeamMembers => "OWN_TEAM_MEMBERS",
            ParticipantType::OwnTeamMembersIncludingSelf => "OWN_TEAM_MEMBERS_INCLUDING_SELF",
            ParticipantType::Nobody => "NONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SELF" => Some(ParticipantType::Myself),
            "STUDENTS" => Some(ParticipantType::Students),
            "INSTRUCTORS" => Some(ParticipantType::Instructors),
            "TEAMS" => Some(ParticipantType::Teams),
            "OWN_TEAM" => Some(ParticipantType::OwnTeam),
            "OWN_TEAM_MEMBERS" => Some(ParticipantType::OwnTeamMembers),
            "OWN_TEAM_MEMBERS_INCLUDING_SELF" => Some(ParticipantType::OwnTeamMembersIncludingSelf),
            "NONE" => Some(ParticipantType::Nobody),
            _ => None,
        }
    }

    pub fn has_fixed_recipients(self) -> bool {
        matches!(
            self,
            ParticipantType::Myself
                | ParticipantType::OwnTeam
                | ParticipantType::OwnTeamMembers
                | ParticipantType::OwnTeamMembersIncludingSelf
                | ParticipantType::Nobody
        )
    }
}

impl fmt::Display for ParticipantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibilityTag {
    Instructors,
    Students,
    OwnTeamMembers,
    Receiver,
    ReceiverTeamMembers,
    OwnTeam,
    Giver,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    pub show_responses_to: BTreeSet<VisibilityTag>,
    pub show_giver_name_to: BTreeSet<VisibilityTag>,
    pub show_recipient_name_to: BTreeSet<VisibilityTag>,
}

impl VisibilityPolicy {
    pub fn new(
        responses: &[VisibilityTag],
        giver_names: &[VisibilityTag],
        recipient_names: &[VisibilityTag],
    ) -> Self {
        Self {
            show_responses_to: responses.iter().copied().collect(),
            show_giver_name_to: giver_names.iter().copied().collect(),
            show_recipient_name_to: recipient_names.iter().copied().collect(),
        }
    }

    pub fn open_to(tags: &[VisibilityTag]) -> Self {
        Self::new(tags, tags, tags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCount {
    Limited(u32),
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Standard,
    Private,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Standard => "STANDARD",
            SessionType::Private => "PRIVATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STANDARD" => Some(SessionType::Standard),
            "PRIVATE" => Some(SessionType::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum ResultsRelease {
    At(DateTime<Utc>),
    Manual,
    Published(DateTime<Utc>),
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub course_id: String,
    pub creator_email: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub visible_from: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub results_release: ResultsRelease,
    pub grace_period_minutes: i64,
    pub session_type: SessionType,
    pub sent_open_email: bool,
    pub sent_published_email: bool,
    pub responding_instructors: BTreeSet<String>,
    pub responding_students: BTreeSet<String>,
}

impl Session {
    pub fn new(
        name: &str,
        course_id: &str,
        creator_email: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.to_string(),
            course_id: course_id.to_string(),
            creator_email: creator_email.to_string(),
            instructions: String::new(),
            created_at: Utc::now(),
            visible_from: start,
            start,
            end,
            results_release: ResultsRelease::Manual,
            grace_period_minutes: 15,
            session_type: SessionType::Standard,
            sent_open_email: false,
            sent_published_email: false,
            responding_instructors: BTreeSet::new(),
            responding_students: BTreeSet::new(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.session_type == SessionType::Private
    }

    pub fn is_creator(&self, email: &str) -> bool {
        self.creator_email == email
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    Mcq,
    Msq,
    NumScale,
    ConstSum,
    Contrib,
    Rubric,
    Rank,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuestionKind::Mcq => "MCQ",
            QuestionKind::Msq => "MSQ",
            QuestionKind::NumScale => "NUMSCALE",
            QuestionKind::ConstSum => "CONSTSUM",
            QuestionKind::Contrib => "CONTRIB",
            QuestionKind::Rubric => "RUBRIC",
            QuestionKind::Rank => "RANK",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstSumTarget {
    Options(Vec<String>),
    Recipients,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankTarget {
    Options(Vec<String>),
    Recipients,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuestionDetails {
    #[serde(rename = "MCQ")]
    Mcq {
        choices: Vec<String>,
        other_enabled: bool,
    },
    #[serde(rename = "MSQ")]
    Msq {
        choices: Vec<String>,
        other_enabled: bool,
    },
    #[serde(rename = "NUMSCALE")]
    NumScale { min: f64, max: f64, step: f64 },
    #[serde(rename = "CONSTSUM")]
    ConstSum { target: ConstSumTarget, points: u32 },
    #[serde(rename = "CONTRIB")]
    Contrib,
    #[serde(rename = "RUBRIC")]
    Rubric {
        sub_questions: Vec<String>,
        choices: Vec<String>,
        weights: Option<Vec<f64>>,
    },
    #[serde(rename = "RANK")]
    Rank { target: RankTarget },
}

impl QuestionDetails {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionDetails::Mcq { .. } => QuestionKind::Mcq,
            QuestionDetails::Msq { .. } => QuestionKind::Msq,
            QuestionDetails::NumScale { .. } => QuestionKind::NumScale,
            QuestionDetails::ConstSum { .. } => QuestionKind::ConstSum,
            QuestionDetails::Contrib => QuestionKind::Contrib,
            QuestionDetails::Rubric { .. } => QuestionKind::Rubric,
            QuestionDetails::Rank { .. } => QuestionKind::Rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub session_name: String,
    pub course_id: String,
    pub number: u32,
    pub text: String,
    pub giver_type: ParticipantType,
    pub recipient_type: ParticipantType,
    pub entities: EntityCount,
    pub details: QuestionDetails,
    pub visibility: VisibilityPolicy,
}

impl Question {
    pub fn new(
        session: &Session,
        number: u32,
        text: &str,
        giver_type: ParticipantType,
        recipient_type: ParticipantType,
        details: QuestionDetails,
        visibility: VisibilityPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_name: session.name.clone(),
            course_id: session.course_id.clone(),
            number,
            text: text.to_string(),
            giver_type,
            recipient_type,
            entities: EntityCount::Unlimited,
            details,
            visibility,
        }
    }

    pub fn with_entities(mut self, entities: EntityCount) -> Self {
        self.entities = entities;
        self
    }

    pub fn kind(&self) -> QuestionKind {
        self.details.kind()
    }

    pub fn is_for_students(&self) -> bool {
        matches!(
            self.giver_type,
            ParticipantType::Students | ParticipantType::Teams
        )
    }

    pub fn is_for_instructors(&self) -> bool {
        matches!(
            self.giver_type,
            ParticipantType::Instructors | ParticipantType::Myself
        )
    }
}

/// A CONTRIB rating relative to 100 = equal share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionValue {
    Points(u32),
    NotSure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Answer {
    #[serde(rename = "MCQ")]
    Mcq(String),
    #[serde(rename = "MSQ")]
    Msq(Vec<String>),
    #[serde(rename = "NUMSCALE")]
    NumScale(f64),
    #[serde(rename = "CONSTSUM")]
    ConstSum(Vec<u32>),
    #[serde(rename = "CONTRIB")]
    Contrib(ContributionValue),
    #[serde(rename = "RUBRIC")]
    Rubric(Vec<Option<usize>>),
    #[serde(rename = "RANK")]
    Rank(Vec<u32>),
}

impl Answer {
    pub fn kind(&self) -> QuestionKind {
        match self {
            Answer::Mcq(_) => QuestionKind::Mcq,
            Answer::Msq(_) => QuestionKind::Msq,
            Answer::NumScale(_) => QuestionKind::NumScale,
            Answer::ConstSum(_) => QuestionKind::ConstSum,
            Answer::Contrib(_) => QuestionKind::Contrib,
            Answer::Rubric(_) => QuestionKind::Rubric,
            Answer::Rank(_) => QuestionKind::Rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub question_id: Uuid,
    pub giver: String,
    pub recipient: String,
    pub answer: Answer,
}

impl Response {
    pub fn new(question: &Question, giver: &str, recipient: &str, answer: Answer) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id: question.id,
            giver: giver.to_string(),
            recipient: recipient.to_string(),
            answer,
        }
    }
}
