use std::collections::BTreeSet;

use crate::error::{FeedbackError, Result};
use crate::models::{
    ConstSumTarget, ParticipantType, Question, QuestionDetails, RankTarget, Session,
    VisibilityPolicy, VisibilityTag,
};
use crate::roster::{CourseRoster, Instructor, Participant, ParticipantKind, ResponseAccess, Student};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerKind {
    Student(Student),
    Instructor(Instructor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub kind: ViewerKind,
}

impl Viewer {
    pub fn from_roster(roster: &CourseRoster, id: &str) -> Option<Self> {
        if let Some(instructor) = roster.instructor(id) {
            return Some(Self {
                id: id.to_string(),
                kind: ViewerKind::Instructor(instructor.clone()),
            });
        }
        roster.student(id).map(|student| Self {
            id: id.to_string(),
            kind: ViewerKind::Student(student.clone()),
        })
    }

    pub fn is_instructor(&self) -> bool {
        matches!(self.kind, ViewerKind::Instructor(_))
    }

    pub fn team(&self) -> Option<&str> {
        match &self.kind {
            ViewerKind::Student(student) => Some(&student.team),
            ViewerKind::Instructor(_) => None,
        }
    }

    pub fn access(&self) -> Option<&ResponseAccess> {
        match &self.kind {
            ViewerKind::Instructor(instructor) => Some(&instructor.access),
            ViewerKind::Student(_) => None,
        }
    }

    pub fn section_restriction(&self) -> Option<&BTreeSet<String>> {
        match self.access() {
            Some(ResponseAccess::Sections(sections)) => Some(sections),
            _ => None,
        }
    }

    fn is_member_of(&self, participant: &Participant) -> bool {
        if participant.id == self.id {
            return true;
        }
        participant.kind == ParticipantKind::Team && self.team() == Some(participant.id.as_str())
    }

    fn shares_team_with(&self, participant: &Participant) -> bool {
        match (self.team(), participant.kind) {
            (Some(team), ParticipantKind::Student | ParticipantKind::Team) => {
                team == participant.team_key()
            }
            _ => false,
        }
    }

    pub fn relations(
        &self,
        session: &Session,
        giver: &Participant,
        recipient: &Participant,
    ) -> ViewerRelations {
        let is_giver = self.is_member_of(giver);
        let is_recipient = self.is_member_of(recipient);

        let mut tags = BTreeSet::new();
        match &self.kind {
            ViewerKind::Instructor(instructor) => {
                if instructor.access != ResponseAccess::NoAccess {
                    tags.insert(VisibilityTag::Instructors);
                }
            }
            ViewerKind::Student(_) => {
                tags.insert(VisibilityTag::Students);
                if self.shares_team_with(giver) {
                    tags.insert(VisibilityTag::OwnTeamMembers);
                    tags.insert(VisibilityTag::OwnTeam);
                }
                if self.shares_team_with(recipient) {
                    tags.insert(VisibilityTag::ReceiverTeamMembers);
                }
            }
        }
        if is_giver {
            tags.insert(VisibilityTag::Giver);
        }
        if is_recipient {
            tags.insert(VisibilityTag::Receiver);
        }

        let sections_allowed = match self.section_restriction() {
            Some(sections) => {
                let allowed = |p: &Participant| match &p.section {
                    Some(section) => sections.contains(section),
                    None => true,
                };
                allowed(giver) && allowed(recipient)
            }
            None => true,
        };

        ViewerRelations {
            tags,
            is_giver,
            is_recipient,
            is_private_creator: session.is_private() && session.is_creator(&self.id),
            unrestricted: self.access() == Some(&ResponseAccess::Unrestricted),
            sections_allowed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRelations {
    pub tags: BTreeSet<VisibilityTag>,
    pub is_giver: bool,
    pub is_recipient: bool,
    pub is_private_creator: bool,
    pub unrestricted: bool,
    pub sections_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityDecision {
    pub content: bool,
    pub giver_name: bool,
    pub recipient_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Real,
    Team,
    Anonymized,
    Hidden,
}

impl VisibilityDecision {
    pub fn giver_display(&self, giver: &Participant) -> DisplayMode {
        display_mode(self.content, self.giver_name, giver)
    }

    pub fn recipient_display(&self, recipient: &Participant) -> DisplayMode {
        display_mode(self.content, self.recipient_name, recipient)
    }
}

fn display_mode(content: bool, name_visible: bool, participant: &Participant) -> DisplayMode {
    match (content, name_visible, participant.kind) {
        (false, _, _) => DisplayMode::Hidden,
        (true, true, ParticipantKind::Team) => DisplayMode::Team,
        (true, true, _) => DisplayMode::Real,
        (true, false, _) => DisplayMode::Anonymized,
    }
}

fn intersects(list: &BTreeSet<VisibilityTag>, tags: &BTreeSet<VisibilityTag>) -> bool {
    list.intersection(tags).next().is_some()
}

/// Decides what a viewer with the given relations may see of a response.
pub fn resolve(policy: &VisibilityPolicy, relations: &ViewerRelations) -> VisibilityDecision {
    if !relations.sections_allowed {
        return VisibilityDecision {
            content: false,
            giver_name: false,
            recipient_name: false,
        };
    }

    let overridden = relations.is_private_creator || relations.unrestricted;
    let content = intersects(&policy.show_responses_to, &relations.tags)
        || relations.is_giver
        || relations.is_recipient
        || overridden;

    VisibilityDecision {
        content,
        giver_name: relations.is_giver
            || overridden
            || intersects(&policy.show_giver_name_to, &relations.tags),
        recipient_name: relations.is_recipient
            || overridden
            || intersects(&policy.show_recipient_name_to, &relations.tags),
    }
}

/// Resolves one response, applying the structural rules on top of
/// [`resolve`]: the general recipient has no identity to hide, and a
/// self-addressed response never reveals through the recipient column what
/// the giver column hides.
pub fn resolve_response(
    question: &Question,
    session: &Session,
    viewer: &Viewer,
    giver: &Participant,
    recipient: &Participant,
) -> VisibilityDecision {
    let relations = viewer.relations(session, giver, recipient);
    let mut decision = resolve(&question.visibility, &relations);
    if recipient.kind == ParticipantKind::Nobody {
        decision.recipient_name = decision.content;
    } else if giver.id == recipient.id {
        decision.recipient_name = decision.giver_name;
    }
    decision
}

pub fn validate_combination(question: &Question) -> Result<()> {
    let invalid = |reason: String| FeedbackError::InvalidQuestion {
        number: question.number,
        reason,
    };

    match question.giver_type {
        ParticipantType::Myself
        | ParticipantType::Students
        | ParticipantType::Instructors
        | ParticipantType::Teams => {}
        other => return Err(invalid(format!("{other} cannot give feedback"))),
    }

    let needs_student_giver = matches!(
        question.recipient_type,
        ParticipantType::OwnTeam
            | ParticipantType::OwnTeamMembers
            | ParticipantType::OwnTeamMembersIncludingSelf
    );
    if needs_student_giver && question.giver_type != ParticipantType::Students {
        return Err(invalid(format!(
            "{} giver cannot address {}",
            question.giver_type, question.recipient_type
        )));
    }

    let addresses_many = !matches!(
        question.recipient_type,
        ParticipantType::Myself | ParticipantType::Nobody
    );
    match &question.details {
        QuestionDetails::Contrib
            if question.giver_type != ParticipantType::Students
                || question.recipient_type != ParticipantType::OwnTeamMembersIncludingSelf =>
        {
            Err(invalid(
                "contribution questions go from students to their own team including themselves"
                    .to_string(),
            ))
        }
        QuestionDetails::Rank {
            target: RankTarget::Recipients,
        }
        | QuestionDetails::ConstSum {
            target: ConstSumTarget::Recipients,
            ..
        } if !addresses_many => Err(invalid(format!(
            "cannot distribute among recipients of type {}",
            question.recipient_type
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionDetails, SessionType, VisibilityTag::*};
    use chrono::{Duration, Utc};

    fn relations(tags: &[VisibilityTag]) -> ViewerRelations {
        ViewerRelations {
            tags: tags.iter().copied().collect(),
            is_giver: false,
            is_recipient: false,
            is_private_creator: false,
            unrestricted: false,
            sections_allowed: true,
        }
    }

    fn roster() -> CourseRoster {
        let mut roster = CourseRoster::new("CS101", "Software Engineering");
        roster.add_student("ana@uni.edu", "Ana Ruiz", "Team A", "Section 1");
        roster.add_student("ben@uni.edu", "Ben Okafor", "Team A", "Section 1");
        roster.add_student("cai@uni.edu", "Cai Lin", "Team B", "Section 2");
        roster.add_instructor("prof@uni.edu", "Dana Prof", ResponseAccess::Course);
        roster.add_instructor(
            "ta@uni.edu",
            "Eli Assistant",
            ResponseAccess::Sections(["Section 1".to_string()].into_iter().collect()),
        );
        roster.add_instructor("guest@uni.edu", "Fay Guest", ResponseAccess::NoAccess);
        roster
    }

    fn session() -> Session {
        let now = Utc::now();
        Session::new("Peer review", "CS101", "prof@uni.edu", now, now + Duration::days(1))
    }

    fn question(giver: ParticipantType, recipient: ParticipantType, policy: VisibilityPolicy) -> Question {
        Question::new(
            &session(),
            1,
            "Rate your teammate",
            giver,
            recipient,
            QuestionDetails::NumScale {
                min: 1.0,
                max: 5.0,
                step: 0.5,
            },
            policy,
        )
    }

    fn participants(roster: &CourseRoster, giver: &str, recipient: &str) -> (Participant, Participant) {
        let giver = roster
            .resolve_giver(ParticipantType::Students, giver)
            .unwrap();
        let recipient = roster
            .resolve_recipient(ParticipantType::Students, &giver, recipient)
            .unwrap();
        (giver, recipient)
    }

    #[test]
    fn content_requires_matching_tag() {
        let policy = VisibilityPolicy::new(&[Instructors], &[Instructors], &[]);
        let decision = resolve(&policy, &relations(&[Students]));
        assert!(!decision.content);

        let decision = resolve(&policy, &relations(&[Instructors]));
        assert!(decision.content);
        assert!(decision.giver_name);
        assert!(!decision.recipient_name);
    }

    #[test]
    fn lists_are_independent() {
        let policy = VisibilityPolicy::new(&[Students], &[], &[Students]);
        let decision = resolve(&policy, &relations(&[Students]));
        assert!(decision.content);
        assert!(!decision.giver_name);
        assert!(decision.recipient_name);
    }

    #[test]
    fn own_identity_is_always_visible() {
        let policy = VisibilityPolicy::default();
        let mut rel = relations(&[Students]);
        rel.is_giver = true;
        let decision = resolve(&policy, &rel);
        assert!(decision.content);
        assert!(decision.giver_name);
        assert!(!decision.recipient_name);
    }

    #[test]
    fn section_mismatch_hides_everything() {
        let policy = VisibilityPolicy::open_to(&[Instructors]);
        let mut rel = relations(&[Instructors]);
        rel.unrestricted = true;
        rel.sections_allowed = false;
        let decision = resolve(&policy, &rel);
        assert!(!decision.content);
    }

    #[test]
    fn unrestricted_sees_content_and_names() {
        let policy = VisibilityPolicy::default();
        let mut rel = relations(&[Instructors]);
        rel.unrestricted = true;
        let decision = resolve(&policy, &rel);
        assert!(decision.content);
        assert!(decision.giver_name);
        assert!(decision.recipient_name);
    }

    #[test]
    fn viewer_relations_classify_teams() {
        let roster = roster();
        let session = session();
        let (giver, recipient) = participants(&roster, "ana@uni.edu", "cai@uni.edu");

        let ben = Viewer::from_roster(&roster, "ben@uni.edu").unwrap();
        let rel = ben.relations(&session, &giver, &recipient);
        assert!(rel.tags.contains(&OwnTeamMembers));
        assert!(!rel.tags.contains(&ReceiverTeamMembers));
        assert!(!rel.is_giver);

        let cai = Viewer::from_roster(&roster, "cai@uni.edu").unwrap();
        let rel = cai.relations(&session, &giver, &recipient);
        assert!(rel.is_recipient);
        assert!(rel.tags.contains(&Receiver));
    }

    #[test]
    fn section_restricted_instructor_needs_both_sections() {
        let roster = roster();
        let session = session();
        let ta = Viewer::from_roster(&roster, "ta@uni.edu").unwrap();

        let (giver, recipient) = participants(&roster, "ana@uni.edu", "ben@uni.edu");
        assert!(ta.relations(&session, &giver, &recipient).sections_allowed);

        let (giver, recipient) = participants(&roster, "ana@uni.edu", "cai@uni.edu");
        assert!(!ta.relations(&session, &giver, &recipient).sections_allowed);
    }

    #[test]
    fn instructor_without_access_has_no_role_tag() {
        let roster = roster();
        let session = session();
        let guest = Viewer::from_roster(&roster, "guest@uni.edu").unwrap();
        let (giver, recipient) = participants(&roster, "ana@uni.edu", "ben@uni.edu");
        let q = question(
            ParticipantType::Students,
            ParticipantType::Students,
            VisibilityPolicy::open_to(&[Instructors]),
        );
        let decision = resolve_response(&q, &session, &guest, &giver, &recipient);
        assert!(!decision.content);
        assert_eq!(decision.giver_display(&giver), DisplayMode::Hidden);
    }

    #[test]
    fn private_creator_sees_everything() {
        let roster = roster();
        let mut session = session();
        session.session_type = SessionType::Private;
        let creator = Viewer::from_roster(&roster, "prof@uni.edu").unwrap();
        let (giver, recipient) = participants(&roster, "ana@uni.edu", "ben@uni.edu");
        let q = question(
            ParticipantType::Students,
            ParticipantType::Students,
            VisibilityPolicy::new(&[], &[], &[Instructors]),
        );
        let decision = resolve_response(&q, &session, &creator, &giver, &recipient);
        assert!(decision.content);
        assert_eq!(decision.giver_display(&giver), DisplayMode::Real);
        assert_eq!(decision.recipient_display(&recipient), DisplayMode::Real);

        let mut other = session.clone();
        other.creator_email = "ta@uni.edu".to_string();
        let decision = resolve_response(&q, &other, &creator, &giver, &recipient);
        assert!(!decision.content);
    }

    #[test]
    fn self_addressed_recipient_follows_giver_name() {
        let roster = roster();
        let session = session();
        let prof = Viewer::from_roster(&roster, "prof@uni.edu").unwrap();
        let giver = roster
            .resolve_giver(ParticipantType::Students, "ana@uni.edu")
            .unwrap();
        let q = question(
            ParticipantType::Students,
            ParticipantType::Myself,
            VisibilityPolicy::new(&[Instructors], &[], &[Instructors]),
        );
        let decision = resolve_response(&q, &session, &prof, &giver, &giver);
        assert!(decision.content);
        assert!(!decision.giver_name);
        assert!(!decision.recipient_name);
    }

    #[test]
    fn team_giver_displays_as_team() {
        let roster = roster();
        let session = session();
        let prof = Viewer::from_roster(&roster, "prof@uni.edu").unwrap();
        let giver = roster.resolve_giver(ParticipantType::Teams, "Team A").unwrap();
        let recipient = roster
            .resolve_recipient(ParticipantType::Nobody, &giver, crate::models::GENERAL_RECIPIENT)
            .unwrap();
        let q = question(
            ParticipantType::Teams,
            ParticipantType::Nobody,
            VisibilityPolicy::open_to(&[Instructors]),
        );
        let decision = resolve_response(&q, &session, &prof, &giver, &recipient);
        assert_eq!(decision.giver_display(&giver), DisplayMode::Team);
        assert!(decision.recipient_name);
    }

    #[test]
    fn invalid_combinations_fail_loudly() {
        let q = question(
            ParticipantType::Nobody,
            ParticipantType::Students,
            VisibilityPolicy::default(),
        );
        assert!(matches!(
            validate_combination(&q),
            Err(FeedbackError::InvalidQuestion { number: 1, .. })
        ));

        let q = question(
            ParticipantType::Instructors,
            ParticipantType::OwnTeamMembers,
            VisibilityPolicy::default(),
        );
        assert!(validate_combination(&q).is_err());

        let mut q = question(
            ParticipantType::Students,
            ParticipantType::Students,
            VisibilityPolicy::default(),
        );
        q.details = QuestionDetails::Contrib;
        assert!(validate_combination(&q).is_err());
    }
}
