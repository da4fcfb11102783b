use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{ParticipantType, GENERAL_RECIPIENT, INSTRUCTOR_TEAM, NOBODY_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub team: String,
    pub section: String,
}

/// What an instructor may see of other people's responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "sections")]
pub enum ResponseAccess {
    NoAccess,
    Course,
    Sections(BTreeSet<String>),
    /// Sees every response in full regardless of the visibility lists.
    Unrestricted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub email: String,
    pub name: String,
    pub access: ResponseAccess,
    pub displayed_to_students: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticipantKind {
    Student,
    Instructor,
    Team,
    Nobody,
}

impl ParticipantKind {
    pub fn singular(self) -> &'static str {
        match self {
            ParticipantKind::Student => "student",
            ParticipantKind::Instructor => "instructor",
            ParticipantKind::Team => "team",
            ParticipantKind::Nobody => "nobody",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub kind: ParticipantKind,
    pub name: String,
    pub last_name: String,
    pub team: String,
    pub section: Option<String>,
}

impl Participant {
    fn from_student(student: &Student) -> Self {
        Self {
            id: student.email.clone(),
            kind: ParticipantKind::Student,
            name: student.name.clone(),
            last_name: student.last_name.clone(),
            team: student.team.clone(),
            section: Some(student.section.clone()),
        }
    }

    fn from_instructor(instructor: &Instructor) -> Self {
        Self {
            id: instructor.email.clone(),
            kind: ParticipantKind::Instructor,
            name: instructor.name.clone(),
            last_name: instructor.name.clone(),
            team: INSTRUCTOR_TEAM.to_string(),
            section: None,
        }
    }

    fn team(name: &str, section: &str) -> Self {
        Self {
            id: name.to_string(),
            kind: ParticipantKind::Team,
            name: name.to_string(),
            last_name: name.to_string(),
            team: String::new(),
            section: Some(section.to_string()),
        }
    }

    pub fn general() -> Self {
        Self {
            id: GENERAL_RECIPIENT.to_string(),
            kind: ParticipantKind::Nobody,
            name: NOBODY_NAME.to_string(),
            last_name: NOBODY_NAME.to_string(),
            team: String::new(),
            section: None,
        }
    }

    pub fn in_section(&self, section: &str) -> bool {
        self.section.as_deref() == Some(section)
    }

    pub fn team_key(&self) -> &str {
        match self.kind {
            ParticipantKind::Team => &self.id,
            _ => &self.team,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRoster {
    pub course: Course,
    pub students: Vec<Student>,
    pub instructors: Vec<Instructor>,
}

impl CourseRoster {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            course: Course {
                id: id.to_string(),
                name: name.to_string(),
            },
            students: Vec::new(),
            instructors: Vec::new(),
        }
    }

    pub fn add_student(&mut self, email: &str, name: &str, team: &str, section: &str) {
        let last_name = name.rsplit(' ').next().unwrap_or(name).to_string();
        self.students.push(Student {
            email: email.to_string(),
            name: name.to_string(),
            last_name,
            team: team.to_string(),
            section: section.to_string(),
        });
    }

    pub fn add_instructor(&mut self, email: &str, name: &str, access: ResponseAccess) {
        self.instructors.push(Instructor {
            email: email.to_string(),
            name: name.to_string(),
            access,
            displayed_to_students: true,
        });
    }

    pub fn student(&self, email: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.email == email)
    }

    pub fn instructor(&self, email: &str) -> Option<&Instructor> {
        self.instructors.iter().find(|i| i.email == email)
    }

    pub fn teams(&self) -> BTreeSet<&str> {
        self.students.iter().map(|s| s.team.as_str()).collect()
    }

    pub fn team_members(&self, team: &str) -> Vec<&Student> {
        self.students.iter().filter(|s| s.team == team).collect()
    }

    pub fn team_section(&self, team: &str) -> Option<&str> {
        self.students
            .iter()
            .find(|s| s.team == team)
            .map(|s| s.section.as_str())
    }

    fn person(&self, id: &str) -> Option<Participant> {
        self.instructor(id)
            .map(Participant::from_instructor)
            .or_else(|| self.student(id).map(Participant::from_student))
    }

    fn team_participant(&self, team: &str) -> Option<Participant> {
        self.team_section(team)
            .map(|section| Participant::team(team, section))
    }

    pub fn resolve_giver(&self, giver_type: ParticipantType, id: &str) -> Option<Participant> {
        match giver_type {
            ParticipantType::Myself => self.person(id),
            ParticipantType::Students => self.student(id).map(Participant::from_student),
            ParticipantType::Instructors => self.instructor(id).map(Participant::from_instructor),
            ParticipantType::Teams => self.team_participant(id),
            _ => None,
        }
    }

    pub fn resolve_recipient(
        &self,
        recipient_type: ParticipantType,
        giver: &Participant,
        id: &str,
    ) -> Option<Participant> {
        match recipient_type {
            ParticipantType::Myself => (giver.id == id).then(|| giver.clone()),
            ParticipantType::Students
            | ParticipantType::OwnTeamMembers
            | ParticipantType::OwnTeamMembersIncludingSelf => {
                self.student(id).map(Participant::from_student)
            }
            ParticipantType::Instructors => self.instructor(id).map(Participant::from_instructor),
            ParticipantType::Teams | ParticipantType::OwnTeam => self.team_participant(id),
            ParticipantType::Nobody => (id == GENERAL_RECIPIENT).then(Participant::general),
        }
    }

    pub fn possible_givers(&self, giver_type: ParticipantType, creator: &str) -> Vec<Participant> {
        match giver_type {
            ParticipantType::Myself => self.person(creator).into_iter().collect(),
            ParticipantType::Students => {
                self.students.iter().map(Participant::from_student).collect()
            }
            ParticipantType::Instructors => self
                .instructors
                .iter()
                .map(Participant::from_instructor)
                .collect(),
            ParticipantType::Teams => self
                .teams()
                .into_iter()
                .filter_map(|team| self.team_participant(team))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn possible_recipients(
        &self,
        recipient_type: ParticipantType,
        giver: &Participant,
    ) -> Vec<Participant> {
        let giver_team = giver.team_key();
        match recipient_type {
            ParticipantType::Myself => vec![giver.clone()],
            ParticipantType::Students => self
                .students
                .iter()
                .filter(|s| s.email != giver.id)
                .map(Participant::from_student)
                .collect(),
            ParticipantType::Instructors => self
                .instructors
                .iter()
                .filter(|i| i.email != giver.id)
                .map(Participant::from_instructor)
                .collect(),
            ParticipantType::Teams => self
                .teams()
                .into_iter()
                .filter(|team| *team != giver_team)
                .filter_map(|team| self.team_participant(team))
                .collect(),
            ParticipantType::OwnTeam => self.team_participant(giver_team).into_iter().collect(),
            ParticipantType::OwnTeamMembers => self
                .team_members(giver_team)
                .into_iter()
                .filter(|s| s.email != giver.id)
                .map(Participant::from_student)
                .collect(),
            ParticipantType::OwnTeamMembersIncludingSelf => self
                .team_members(giver_team)
                .into_iter()
                .map(Participant::from_student)
                .collect(),
            ParticipantType::Nobody => vec![Participant::general()],
        }
    }
}
