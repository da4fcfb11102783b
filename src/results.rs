use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::anonymizer::{is_anonymous_name, Anonymizer};
use crate::error::{FeedbackError, Result};
use crate::models::{
    Answer, EntityCount, Question, Response, Session, GENERAL_RECIPIENT, NOBODY_NAME,
    UNKNOWN_USER,
};
use crate::roster::{CourseRoster, Participant, ParticipantKind};
use crate::visibility::{
    resolve_response, validate_combination, DisplayMode, Viewer, VisibilityDecision,
};

pub const HIDDEN_EMAIL: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayIdentity {
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub team: String,
    pub email: String,
    pub mode: DisplayMode,
}

impl DisplayIdentity {
    pub fn is_general(&self) -> bool {
        self.id == GENERAL_RECIPIENT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedResponse {
    pub id: Uuid,
    pub giver: DisplayIdentity,
    pub recipient: DisplayIdentity,
    pub self_addressed: bool,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    Response(DisplayedResponse),
    Missing {
        giver: DisplayIdentity,
        recipient: DisplayIdentity,
    },
}

impl ResultRow {
    pub fn giver(&self) -> &DisplayIdentity {
        match self {
            ResultRow::Response(response) => &response.giver,
            ResultRow::Missing { giver, .. } => giver,
        }
    }

    pub fn recipient(&self) -> &DisplayIdentity {
        match self {
            ResultRow::Response(response) => &response.recipient,
            ResultRow::Missing { recipient, .. } => recipient,
        }
    }

    fn sort_key(&self) -> (&str, &str, bool, &str, &str, &str, &str) {
        let giver = self.giver();
        let recipient = self.recipient();
        (
            &giver.team,
            &giver.name,
            matches!(self, ResultRow::Missing { .. }),
            &recipient.team,
            &recipient.name,
            &giver.id,
            &recipient.id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSlot {
    pub identity: DisplayIdentity,
    pub peer_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionResults {
    pub question: Question,
    pub rows: Vec<ResultRow>,
    pub recipients: BTreeMap<String, String>,
    pub participants: Vec<ParticipantSlot>,
}

impl QuestionResults {
    pub fn responses(&self) -> impl Iterator<Item = &DisplayedResponse> {
        self.rows.iter().filter_map(|row| match row {
            ResultRow::Response(response) => Some(response),
            ResultRow::Missing { .. } => None,
        })
    }

    pub fn response_count(&self) -> usize {
        self.responses().count()
    }

    pub fn missing_count(&self) -> usize {
        self.rows.len() - self.response_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameVisibility {
    pub giver: bool,
    pub recipient: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsBundle {
    pub session: Session,
    pub questions: Vec<QuestionResults>,
    pub name_table: BTreeMap<String, String>,
    pub team_table: BTreeMap<String, String>,
    pub visibility_table: BTreeMap<Uuid, NameVisibility>,
}

impl ResultsBundle {
    pub fn empty(session: Session) -> Self {
        Self {
            session,
            questions: Vec::new(),
            name_table: BTreeMap::new(),
            team_table: BTreeMap::new(),
            visibility_table: BTreeMap::new(),
        }
    }

    pub fn response_count(&self) -> usize {
        self.questions.iter().map(QuestionResults::response_count).sum()
    }

    pub fn name_for(&self, id: &str) -> &str {
        self.name_table
            .get(id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_USER)
    }

    pub fn team_name_for(&self, id: &str) -> &str {
        self.team_table.get(id).map(String::as_str).unwrap_or("")
    }

    pub fn name_with_team(&self, id: &str) -> String {
        append_team_name(self.name_for(id), self.team_name_for(id))
    }

    fn register(
        &mut self,
        participant: &Participant,
        mode: DisplayMode,
        anonymizer: &mut Anonymizer,
    ) -> DisplayIdentity {
        let identity = match (participant.kind, mode) {
            (ParticipantKind::Nobody, _) => DisplayIdentity {
                id: GENERAL_RECIPIENT.to_string(),
                name: NOBODY_NAME.to_string(),
                last_name: NOBODY_NAME.to_string(),
                team: String::new(),
                email: HIDDEN_EMAIL.to_string(),
                mode: DisplayMode::Real,
            },
            (_, DisplayMode::Anonymized | DisplayMode::Hidden) => {
                let anonymous = anonymizer.identity(participant.kind, &participant.name);
                DisplayIdentity {
                    id: anonymous.email.clone(),
                    name: anonymous.name.clone(),
                    last_name: anonymous.name.clone(),
                    team: anonymous.team.clone(),
                    email: HIDDEN_EMAIL.to_string(),
                    mode: DisplayMode::Anonymized,
                }
            }
            (_, DisplayMode::Team) => DisplayIdentity {
                id: participant.id.clone(),
                name: participant.name.clone(),
                last_name: participant.name.clone(),
                team: String::new(),
                email: HIDDEN_EMAIL.to_string(),
                mode: DisplayMode::Team,
            },
            (_, DisplayMode::Real) => DisplayIdentity {
                id: participant.id.clone(),
                name: participant.name.clone(),
                last_name: participant.last_name.clone(),
                team: participant.team.clone(),
                email: participant.id.clone(),
                mode: DisplayMode::Real,
            },
        };

        self.name_table
            .insert(identity.id.clone(), identity.name.clone());
        self.team_table
            .insert(identity.id.clone(), identity.team.clone());
        identity
    }
}

/// Appends ` (team)` to a name unless the name is a placeholder or the team
/// is unknown.
pub fn append_team_name(name: &str, team: &str) -> String {
    if team.is_empty() || name == UNKNOWN_USER || name == NOBODY_NAME || is_anonymous_name(name) {
        name.to_string()
    } else {
        format!("{name} ({team})")
    }
}

fn section_matches(giver: &Participant, recipient: &Participant, section: Option<&str>) -> bool {
    match section {
        Some(section) => giver.in_section(section) || recipient.in_section(section),
        None => true,
    }
}

/// Computes everything `viewer_id` may see of a session. A PRIVATE session
/// yields an empty bundle for anybody but its creator.
pub fn aggregate(
    session: &Session,
    questions: &[Question],
    responses: &[Response],
    roster: &CourseRoster,
    viewer_id: &str,
    section: Option<&str>,
) -> Result<ResultsBundle> {
    let viewer = Viewer::from_roster(roster, viewer_id).ok_or_else(|| {
        FeedbackError::NotFound(format!(
            "Trying to view results of {}/{} for a non-existent participant: {viewer_id}",
            session.course_id, session.name
        ))
    })?;

    let mut bundle = ResultsBundle::empty(session.clone());
    if session.is_private() && !session.is_creator(viewer_id) {
        debug!(
            "Private session {}/{} hidden from {}",
            session.course_id, session.name, viewer_id
        );
        return Ok(bundle);
    }

    let privileged = viewer.is_instructor() || session.is_creator(viewer_id);
    let mut anonymizer = Anonymizer::new();

    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.sort_by_key(|q| q.number);

    for question in ordered {
        validate_combination(question)?;

        let mut rows = Vec::new();
        let mut answered = HashSet::new();
        let mut slots = BTreeMap::new();

        for response in responses.iter().filter(|r| r.question_id == question.id) {
            if response.answer.kind() != question.kind() {
                return Err(FeedbackError::AnswerMismatch {
                    expected: question.kind(),
                    found: response.answer.kind(),
                });
            }
            let unknown = |id: &str| FeedbackError::UnknownParticipant {
                number: question.number,
                id: id.to_string(),
            };
            let giver = roster
                .resolve_giver(question.giver_type, &response.giver)
                .ok_or_else(|| unknown(&response.giver))?;
            let recipient = roster
                .resolve_recipient(question.recipient_type, &giver, &response.recipient)
                .ok_or_else(|| unknown(&response.recipient))?;
            answered.insert((giver.id.clone(), recipient.id.clone()));

            if !section_matches(&giver, &recipient, section) {
                continue;
            }
            let decision = resolve_response(question, session, &viewer, &giver, &recipient);
            if !decision.content {
                continue;
            }

            let giver_identity =
                bundle.register(&giver, decision.giver_display(&giver), &mut anonymizer);
            let recipient_identity = bundle.register(
                &recipient,
                decision.recipient_display(&recipient),
                &mut anonymizer,
            );
            bundle.visibility_table.insert(
                response.id,
                NameVisibility {
                    giver: decision.giver_name,
                    recipient: decision.recipient_name,
                },
            );
            slots
                .entry(recipient_identity.id.clone())
                .or_insert_with(|| ParticipantSlot {
                    identity: recipient_identity.clone(),
                    peer_count: peer_count(roster, &recipient),
                });
            rows.push(ResultRow::Response(DisplayedResponse {
                id: response.id,
                giver: giver_identity,
                recipient: recipient_identity,
                self_addressed: giver.id == recipient.id,
                answer: response.answer.clone(),
            }));
        }

        let placeholders = if privileged {
            missing_pairs(question, session, &viewer, roster, &answered, section)
        } else {
            Vec::new()
        };
        for (giver, recipient, decision) in &placeholders {
            let giver_identity =
                bundle.register(giver, decision.giver_display(giver), &mut anonymizer);
            let recipient_identity =
                bundle.register(recipient, decision.recipient_display(recipient), &mut anonymizer);
            slots
                .entry(recipient_identity.id.clone())
                .or_insert_with(|| ParticipantSlot {
                    identity: recipient_identity.clone(),
                    peer_count: peer_count(roster, recipient),
                });
            rows.push(ResultRow::Missing {
                giver: giver_identity,
                recipient: recipient_identity,
            });
        }

        let keep = if section.is_some() || !privileged {
            !rows.is_empty()
        } else {
            true
        };
        if !keep {
            debug!("Question {} has nothing visible to {}", question.number, viewer_id);
            continue;
        }

        rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        bundle.questions.push(QuestionResults {
            question: question.clone(),
            rows,
            recipients: candidate_recipients(question, session, &viewer, roster),
            participants: slots.into_values().collect(),
        });
    }

    debug!(
        "Aggregated {}/{} for {}: {} questions, {} responses",
        session.course_id,
        session.name,
        viewer_id,
        bundle.questions.len(),
        bundle.response_count()
    );
    Ok(bundle)
}

fn peer_count(roster: &CourseRoster, participant: &Participant) -> usize {
    match participant.kind {
        ParticipantKind::Student => roster.team_members(&participant.team).len().saturating_sub(1),
        _ => 0,
    }
}

fn missing_pairs(
    question: &Question,
    session: &Session,
    viewer: &Viewer,
    roster: &CourseRoster,
    answered: &HashSet<(String, String)>,
    section: Option<&str>,
) -> Vec<(Participant, Participant, VisibilityDecision)> {
    if question.entities != EntityCount::Unlimited && !question.recipient_type.has_fixed_recipients()
    {
        return Vec::new();
    }

    let mut missing = Vec::new();
    for giver in roster.possible_givers(question.giver_type, &session.creator_email) {
        for recipient in roster.possible_recipients(question.recipient_type, &giver) {
            if answered.contains(&(giver.id.clone(), recipient.id.clone())) {
                continue;
            }
            if !section_matches(&giver, &recipient, section) {
                continue;
            }
            let decision = resolve_response(question, session, viewer, &giver, &recipient);
            if decision.content && decision.giver_name && decision.recipient_name {
                missing.push((giver.clone(), recipient, decision));
            }
        }
    }
    missing
}

fn candidate_recipients(
    question: &Question,
    session: &Session,
    viewer: &Viewer,
    roster: &CourseRoster,
) -> BTreeMap<String, String> {
    let hidden_instructors: BTreeSet<&str> = if viewer.is_instructor() {
        BTreeSet::new()
    } else {
        roster
            .instructors
            .iter()
            .filter(|i| !i.displayed_to_students)
            .map(|i| i.email.as_str())
            .collect()
    };

    roster
        .possible_givers(question.giver_type, &session.creator_email)
        .iter()
        .flat_map(|giver| roster.possible_recipients(question.recipient_type, giver))
        .filter(|recipient| {
            !(recipient.kind == ParticipantKind::Instructor
                && hidden_instructors.contains(recipient.id.as_str()))
        })
        .map(|recipient| (recipient.id, recipient.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, CREATOR, TA};
    use crate::models::{
        Answer, ParticipantType, QuestionDetails, SessionType, VisibilityPolicy, VisibilityTag,
    };

    fn numscale(session: &Session, policy: VisibilityPolicy) -> Question {
        Question::new(
            session,
            1,
            "Rate this teammate's effort",
            ParticipantType::Students,
            ParticipantType::OwnTeamMembers,
            QuestionDetails::NumScale {
                min: 1.0,
                max: 5.0,
                step: 1.0,
            },
            policy,
        )
    }

    #[test]
    fn private_session_is_empty_for_everyone_but_creator() {
        let roster = fixtures::roster();
        let mut session = fixtures::session("Private notes");
        session.session_type = SessionType::Private;
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::Mcq("A".to_string()),
        )];

        for viewer in ["ana@uni.edu", TA] {
            let bundle = aggregate(&session, &[question.clone()], &responses, &roster, viewer, None)
                .unwrap();
            assert!(bundle.questions.is_empty());
            assert_eq!(bundle.response_count(), 0);
        }

        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        assert_eq!(bundle.questions.len(), 1);
    }

    #[test]
    fn unknown_viewer_is_not_found() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let err = aggregate(&session, &[], &[], &roster, "ghost@uni.edu", None).unwrap_err();
        assert!(matches!(err, FeedbackError::NotFound(_)));
    }

    #[test]
    fn empty_session_gives_empty_bundle() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let bundle = aggregate(&session, &[], &[], &roster, CREATOR, None).unwrap();
        assert!(bundle.questions.is_empty());
        assert!(bundle.name_table.is_empty());
    }

    #[test]
    fn instructor_sees_placeholders_for_missing_students() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![
            fixtures::general_response(&question, "ana@uni.edu", Answer::Mcq("A".to_string())),
            fixtures::general_response(&question, "cai@uni.edu", Answer::Mcq("B".to_string())),
        ];

        let bundle =
            aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let results = &bundle.questions[0];
        assert_eq!(results.response_count(), 2);
        assert_eq!(results.missing_count(), 3);
        assert_eq!(
            results.recipients.get(GENERAL_RECIPIENT).map(String::as_str),
            Some(NOBODY_NAME)
        );
        assert_eq!(bundle.name_for(GENERAL_RECIPIENT), NOBODY_NAME);

        // Team A givers first, answered before missing.
        let givers: Vec<_> = results.rows.iter().map(|r| r.giver().name.as_str()).collect();
        assert_eq!(
            givers,
            vec!["Ana Ruiz", "Ben Okafor", "Dev Sharma", "Eve Martin", "Cai Lin"]
        );
    }

    #[test]
    fn student_sees_only_questions_with_visible_responses() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::Mcq("A".to_string()),
        )];

        let bundle = aggregate(
            &session,
            &[question.clone()],
            &responses,
            &roster,
            "ben@uni.edu",
            None,
        )
        .unwrap();
        assert!(bundle.questions.is_empty());

        let bundle =
            aggregate(&session, &[question], &responses, &roster, "ana@uni.edu", None).unwrap();
        assert_eq!(bundle.questions.len(), 1);
        assert_eq!(bundle.questions[0].missing_count(), 0);
    }

    #[test]
    fn hidden_giver_is_anonymized_consistently() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let policy = VisibilityPolicy::new(
            &[VisibilityTag::Receiver],
            &[],
            &[VisibilityTag::Receiver],
        );
        let first = numscale(&session, policy.clone());
        let mut second = numscale(&session, policy);
        second.number = 2;
        let responses = vec![
            Response::new(&first, "ana@uni.edu", "ben@uni.edu", Answer::NumScale(4.0)),
            Response::new(&second, "ana@uni.edu", "ben@uni.edu", Answer::NumScale(2.0)),
        ];

        let bundle = aggregate(
            &session,
            &[second.clone(), first.clone()],
            &responses,
            &roster,
            "ben@uni.edu",
            None,
        )
        .unwrap();
        assert_eq!(bundle.questions.len(), 2);
        assert_eq!(bundle.questions[0].question.number, 1);

        let giver_one = &bundle.questions[0].rows[0].giver().id;
        let giver_two = &bundle.questions[1].rows[0].giver().id;
        assert_eq!(giver_one, giver_two);
        assert!(giver_one.contains("@@"));
        assert!(is_anonymous_name(bundle.name_for(giver_one)));
        assert_eq!(bundle.name_with_team(giver_one), bundle.name_for(giver_one));
        assert_eq!(bundle.name_with_team("ben@uni.edu"), "Ben Okafor (Team A)");
        assert!(!bundle.visibility_table[&responses[0].id].giver);
        assert!(bundle.visibility_table[&responses[0].id].recipient);
    }

    #[test]
    fn hidden_team_giver_gets_anonymous_team_identity() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "How well did your team plan?",
            ParticipantType::Teams,
            ParticipantType::Nobody,
            QuestionDetails::Mcq {
                choices: vec!["A".to_string(), "B".to_string()],
                other_enabled: false,
            },
            VisibilityPolicy::new(&[VisibilityTag::Instructors], &[], &[VisibilityTag::Instructors]),
        );
        let responses = vec![fixtures::general_response(
            &question,
            "Team A",
            Answer::Mcq("A".to_string()),
        )];

        let bundle = aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let results = &bundle.questions[0];
        assert_eq!(results.rows.len(), 1);
        let giver = results.rows[0].giver();
        assert!(giver.name.starts_with("Anonymous team "));
        assert_eq!(giver.team, format!("{}'s Team", giver.name));
        assert_eq!(giver.mode, DisplayMode::Anonymized);
        assert!(giver.id.contains("@@"));
        assert_eq!(bundle.team_name_for(&giver.id), giver.team);
        assert!(!bundle.name_table.values().any(|name| name == "Team A"));
    }

    #[test]
    fn private_creator_sees_real_names() {
        let roster = fixtures::roster();
        let mut session = fixtures::session("Private notes");
        session.session_type = SessionType::Private;
        let question = numscale(&session, VisibilityPolicy::new(&[], &[], &[]));
        let responses = vec![Response::new(
            &question,
            "ana@uni.edu",
            "ben@uni.edu",
            Answer::NumScale(4.0),
        )];

        let bundle = aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        let row = &bundle.questions[0].rows[0];
        assert_eq!(row.giver().name, "Ana Ruiz");
        assert_eq!(row.recipient().name, "Ben Okafor");
        assert!(bundle.visibility_table[&responses[0].id].giver);
    }

    #[test]
    fn hidden_response_keeps_recipient_candidate() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = numscale(
            &session,
            VisibilityPolicy::open_to(&[VisibilityTag::Instructors]),
        );
        let responses = vec![
            Response::new(&question, "ana@uni.edu", "ben@uni.edu", Answer::NumScale(4.0)),
            Response::new(&question, "dev@uni.edu", "eve@uni.edu", Answer::NumScale(3.0)),
        ];

        let bundle =
            aggregate(&session, &[question], &responses, &roster, "ana@uni.edu", None).unwrap();
        let results = &bundle.questions[0];
        assert_eq!(results.response_count(), 1);
        assert!(!bundle.visibility_table.contains_key(&responses[1].id));
        assert!(results.recipients.contains_key("eve@uni.edu"));
    }

    #[test]
    fn section_filter_narrows_rows() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![
            fixtures::general_response(&question, "ana@uni.edu", Answer::Mcq("A".to_string())),
            fixtures::general_response(&question, "cai@uni.edu", Answer::Mcq("B".to_string())),
        ];

        let bundle = aggregate(
            &session,
            &[question.clone()],
            &responses,
            &roster,
            CREATOR,
            Some("Section 2"),
        )
        .unwrap();
        let results = &bundle.questions[0];
        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.rows[0].giver().id, "cai@uni.edu");

        let bundle = aggregate(
            &session,
            &[question],
            &responses,
            &roster,
            CREATOR,
            Some("Section 9"),
        )
        .unwrap();
        assert!(bundle.questions.is_empty());
    }

    #[test]
    fn section_restricted_instructor_skips_other_sections() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![
            fixtures::general_response(&question, "ana@uni.edu", Answer::Mcq("A".to_string())),
            fixtures::general_response(&question, "cai@uni.edu", Answer::Mcq("B".to_string())),
        ];

        let bundle = aggregate(&session, &[question], &responses, &roster, TA, None).unwrap();
        let results = &bundle.questions[0];
        assert_eq!(results.response_count(), 1);
        assert!(results
            .rows
            .iter()
            .all(|row| row.giver().id != "cai@uni.edu"));
    }

    #[test]
    fn section_restricted_instructor_sees_instructor_feedback_in_section() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "How is this student progressing?",
            ParticipantType::Instructors,
            ParticipantType::Students,
            QuestionDetails::NumScale {
                min: 1.0,
                max: 5.0,
                step: 1.0,
            },
            VisibilityPolicy::open_to(&[VisibilityTag::Instructors]),
        );
        let responses = vec![
            Response::new(&question, CREATOR, "ana@uni.edu", Answer::NumScale(4.0)),
            Response::new(&question, CREATOR, "cai@uni.edu", Answer::NumScale(3.0)),
        ];

        let bundle = aggregate(&session, &[question], &responses, &roster, TA, None).unwrap();
        let results = &bundle.questions[0];
        let seen: Vec<_> = results.responses().map(|r| r.recipient.id.as_str()).collect();
        assert_eq!(seen, vec!["ana@uni.edu"]);
        assert_eq!(results.rows[0].giver().name, "Dana Prof");
    }

    #[test]
    fn unknown_giver_fails_loudly() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ghost@uni.edu",
            Answer::Mcq("A".to_string()),
        )];
        let err = aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap_err();
        assert_eq!(
            err,
            FeedbackError::UnknownParticipant {
                number: 1,
                id: "ghost@uni.edu".to_string()
            }
        );
    }

    #[test]
    fn mismatched_answer_fails() {
        let roster = fixtures::roster();
        let session = fixtures::session("Week 1");
        let question = fixtures::mcq_to_general(&session, 1);
        let responses = vec![fixtures::general_response(
            &question,
            "ana@uni.edu",
            Answer::NumScale(1.0),
        )];
        assert!(matches!(
            aggregate(&session, &[question], &responses, &roster, CREATOR, None),
            Err(FeedbackError::AnswerMismatch { .. })
        ));
    }

    #[test]
    fn hidden_instructors_are_not_candidates_for_students() {
        let mut roster = fixtures::roster();
        roster.instructors[1].displayed_to_students = false;
        let session = fixtures::session("Week 1");
        let question = Question::new(
            &session,
            1,
            "How helpful was this instructor?",
            ParticipantType::Students,
            ParticipantType::Instructors,
            QuestionDetails::NumScale {
                min: 1.0,
                max: 5.0,
                step: 1.0,
            },
            VisibilityPolicy::open_to(&[VisibilityTag::Receiver, VisibilityTag::Giver]),
        );
        let responses = vec![Response::new(
            &question,
            "ana@uni.edu",
            CREATOR,
            Answer::NumScale(5.0),
        )];

        let bundle = aggregate(
            &session,
            &[question.clone()],
            &responses,
            &roster,
            "ana@uni.edu",
            None,
        )
        .unwrap();
        let recipients = &bundle.questions[0].recipients;
        assert!(recipients.contains_key(CREATOR));
        assert!(!recipients.contains_key(TA));

        let bundle = aggregate(&session, &[question], &responses, &roster, CREATOR, None).unwrap();
        assert!(bundle.questions[0].recipients.contains_key(TA));
    }

    #[test]
    fn append_team_name_skips_placeholders() {
        assert_eq!(append_team_name("Ana Ruiz", "Team A"), "Ana Ruiz (Team A)");
        assert_eq!(append_team_name(UNKNOWN_USER, "Team A"), UNKNOWN_USER);
        assert_eq!(append_team_name(NOBODY_NAME, "Team A"), NOBODY_NAME);
        assert_eq!(append_team_name("Ana Ruiz", ""), "Ana Ruiz");
    }
}
