use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{FeedbackError, Result};
use crate::export;
use crate::models::{
    ParticipantType, Question, Response, ResultsRelease, Session, VisibilityTag,
};
use crate::results::{self, ResultsBundle};
use crate::roster::{CourseRoster, Participant};
use crate::store::Datastore;
use crate::visibility::{validate_combination, Viewer, ViewerKind};

pub const SESSION_NAME_MAX_LENGTH: usize = 38;
pub const GRACE_PERIOD_MAX_MINUTES: i64 = 7 * 24 * 60;

const STUDENT_FACING_TAGS: [VisibilityTag; 5] = [
    VisibilityTag::Students,
    VisibilityTag::Receiver,
    VisibilityTag::ReceiverTeamMembers,
    VisibilityTag::OwnTeamMembers,
    VisibilityTag::OwnTeam,
];

pub fn validate_session_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(FeedbackError::InvalidParameters(format!(
            "\"{name}\" is not acceptable as a feedback session name because {reason}"
        )))
    };

    if name.trim().is_empty() {
        return Err(FeedbackError::InvalidParameters(
            "The field 'feedback session name' is empty.".to_string(),
        ));
    }
    if name.chars().any(|c| matches!(c, '<' | '>' | '\\' | '/' | '\'' | '&')) {
        return reject(
            "it cannot contain the following special html characters in brackets: (&lt; &gt; \\ &#x2f; &#39; &amp;)",
        );
    }
    if name.contains('|') || name.contains('%') {
        return reject("it cannot contain any vertical bar (|) or percent sign (%).");
    }
    if !name.chars().next().is_some_and(char::is_alphanumeric) {
        return reject(
            "it starts with a non-alphanumeric character. All feedback session names must start with an alphanumeric character.",
        );
    }
    if name.chars().count() > SESSION_NAME_MAX_LENGTH {
        return reject(&format!(
            "it is too long. The value of a feedback session name should be no longer than {SESSION_NAME_MAX_LENGTH} characters."
        ));
    }
    Ok(())
}

fn validate_schedule(session: &Session) -> Result<()> {
    if session.end < session.start {
        return Err(FeedbackError::InvalidParameters(
            "The end time for this feedback session cannot be earlier than the start time."
                .to_string(),
        ));
    }
    if session.visible_from > session.start {
        return Err(FeedbackError::InvalidParameters(
            "The start time for this feedback session cannot be earlier than the time when the session will be visible."
                .to_string(),
        ));
    }
    if let ResultsRelease::At(at) = session.results_release {
        if at < session.visible_from {
            return Err(FeedbackError::InvalidParameters(
                "The time when the results will be visible for this feedback session cannot be earlier than the time when the session will be visible."
                    .to_string(),
            ));
        }
    }
    if session.grace_period_minutes < 0 {
        return Err(FeedbackError::InvalidParameters(
            "The grace period cannot be negative.".to_string(),
        ));
    }
    if session.grace_period_minutes > GRACE_PERIOD_MAX_MINUTES {
        return Err(FeedbackError::InvalidParameters(format!(
            "The grace period cannot be longer than {GRACE_PERIOD_MAX_MINUTES} minutes."
        )));
    }
    Ok(())
}

/// Fields to change on an existing session; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub instructions: Option<String>,
    pub visible_from: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub results_release: Option<ResultsRelease>,
    pub grace_period_minutes: Option<i64>,
    pub sent_open_email: Option<bool>,
    pub sent_published_email: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStats {
    pub expected_total: usize,
    pub submitted_total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GiverQuestion {
    pub question: Question,
    pub responses: Vec<Response>,
    pub recipients: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GiverQuestionsBundle {
    pub session: Session,
    pub questions: Vec<GiverQuestion>,
}

#[derive(Debug, Default)]
pub struct SessionsLogic {
    store: Datastore,
}

impl SessionsLogic {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Datastore {
        &mut self.store
    }

    pub fn into_store(self) -> Datastore {
        self.store
    }

    fn course(&self, course_id: &str) -> Result<&CourseRoster> {
        self.store.course(course_id).ok_or_else(|| {
            FeedbackError::NotFound(
                "Error getting feedback session(s): Course does not exist.".to_string(),
            )
        })
    }

    fn existing(&self, action: &str, session_name: &str, course_id: &str) -> Result<&Session> {
        self.store
            .session(course_id, session_name)
            .ok_or_else(|| FeedbackError::session_not_found(action, course_id, session_name))
    }

    fn questions_of(&self, session: &Session) -> Vec<&Question> {
        self.store
            .questions_for_session(&session.course_id, &session.name)
    }

    pub fn session(&self, session_name: &str, course_id: &str) -> Option<&Session> {
        self.store.session(course_id, session_name)
    }

    pub fn sessions_for_course(&self, course_id: &str) -> Result<Vec<Session>> {
        self.course(course_id)?;
        Ok(self
            .store
            .sessions_for_course(course_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn sessions_for_viewer_in_course(
        &self,
        course_id: &str,
        viewer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let roster = self.course(course_id)?;
        let viewer = Viewer::from_roster(roster, viewer_id).ok_or_else(|| {
            FeedbackError::NotFound(
                "Error getting feedback session(s): Student does not exist.".to_string(),
            )
        })?;

        let sessions = self
            .store
            .sessions_for_course(course_id)
            .into_iter()
            .filter(|session| {
                if session.is_private() {
                    return session.is_creator(viewer_id);
                }
                match viewer.kind {
                    ViewerKind::Instructor(_) => true,
                    ViewerKind::Student(_) => {
                        session.is_visible(now) && self.viewable_to_students(session)
                    }
                }
            })
            .cloned()
            .collect::<Vec<_>>();
        debug!(
            "{} of course {} sees {} sessions",
            viewer_id,
            course_id,
            sessions.len()
        );
        Ok(sessions)
    }

    pub fn has_question_for_students(&self, session_name: &str, course_id: &str) -> Result<bool> {
        let session = self.existing("check", session_name, course_id)?;
        Ok(self
            .questions_of(session)
            .iter()
            .any(|q| q.is_for_students()))
    }

    pub fn is_viewable_to_students(&self, session_name: &str, course_id: &str) -> Result<bool> {
        let session = self.existing("check", session_name, course_id)?;
        Ok(self.viewable_to_students(session))
    }

    fn viewable_to_students(&self, session: &Session) -> bool {
        if session.is_private() {
            return false;
        }
        let questions = self.questions_of(session);
        questions.iter().any(|q| q.is_for_students())
            || questions.iter().any(|q| {
                STUDENT_FACING_TAGS
                    .iter()
                    .any(|tag| q.visibility.show_responses_to.contains(tag))
                    && !self.store.responses_for_question(q.id).is_empty()
            })
    }

    pub fn create_session(&mut self, session: Session) -> Result<Session> {
        validate_session_name(&session.name)?;
        validate_schedule(&session)?;
        self.store.insert_session(session.clone())?;
        info!(
            "Created feedback session {}/{}",
            session.course_id, session.name
        );
        Ok(session)
    }

    pub fn update_session(
        &mut self,
        session_name: &str,
        course_id: &str,
        update: SessionUpdate,
    ) -> Result<Session> {
        let mut session = self.existing("update", session_name, course_id)?.clone();

        if let Some(instructions) = update.instructions {
            session.instructions = instructions;
        }
        if let Some(visible_from) = update.visible_from {
            session.visible_from = visible_from;
        }
        if let Some(start) = update.start {
            session.start = start;
        }
        if let Some(end) = update.end {
            session.end = end;
        }
        if let Some(release) = update.results_release {
            session.results_release = release;
        }
        if let Some(grace) = update.grace_period_minutes {
            session.grace_period_minutes = grace;
        }
        if let Some(sent) = update.sent_open_email {
            session.sent_open_email = sent;
        }
        if let Some(sent) = update.sent_published_email {
            session.sent_published_email = sent;
        }

        validate_schedule(&session)?;
        self.store.replace_session(session.clone());
        info!("Updated feedback session {}/{}", course_id, session_name);
        Ok(session)
    }

    /// Deletes a session with its questions and responses. Deleting a
    /// missing session does nothing.
    pub fn delete_session_cascade(&mut self, session_name: &str, course_id: &str) {
        if self.store.remove_session(course_id, session_name) {
            info!("Deleted feedback session {}/{}", course_id, session_name);
        } else {
            debug!(
                "Feedback session {}/{} already absent",
                course_id, session_name
            );
        }
    }

    pub fn delete_sessions_for_course_cascade(&mut self, course_id: &str) {
        let names: Vec<String> = self
            .store
            .sessions_for_course(course_id)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        for name in names {
            self.delete_session_cascade(&name, course_id);
        }
    }

    pub fn publish(
        &mut self,
        session_name: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let mut session = self.existing("update", session_name, course_id)?.clone();
        let failure = |reason: &str| {
            Err(FeedbackError::InvalidParameters(format!(
                "Error publishing feedback session: {reason}"
            )))
        };
        if session.is_private() {
            return failure("Session is private and can't be published.");
        }
        if session.is_published(now) {
            return failure("Session has already been published.");
        }

        session.results_release = ResultsRelease::Published(now);
        self.store.replace_session(session.clone());
        info!("Published feedback session {}/{}", course_id, session_name);
        Ok(session)
    }

    pub fn unpublish(
        &mut self,
        session_name: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let mut session = self.existing("update", session_name, course_id)?.clone();
        let failure = |reason: &str| {
            Err(FeedbackError::InvalidParameters(format!(
                "Error unpublishing feedback session: {reason}"
            )))
        };
        if session.is_private() {
            return failure("Session is private and can't be unpublished.");
        }
        if !session.is_published(now) {
            return failure("Session has already been unpublished.");
        }

        session.results_release = ResultsRelease::Manual;
        session.sent_published_email = false;
        self.store.replace_session(session.clone());
        info!("Unpublished feedback session {}/{}", course_id, session_name);
        Ok(session)
    }

    pub fn copy_session(
        &mut self,
        new_name: &str,
        new_course_id: &str,
        source_name: &str,
        source_course_id: &str,
        creator_email: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        validate_session_name(new_name)?;
        let source = self.existing("copy", source_name, source_course_id)?.clone();
        if self.store.session(new_course_id, new_name).is_some() {
            return Err(FeedbackError::AlreadyExists(format!(
                "Trying to create a feedback session that exists: {new_course_id}/{new_name}"
            )));
        }

        let mut copy = source.clone();
        copy.name = new_name.to_string();
        copy.course_id = new_course_id.to_string();
        copy.creator_email = creator_email.to_string();
        copy.created_at = now;
        copy.sent_open_email = false;
        copy.sent_published_email = false;
        copy.responding_instructors.clear();
        copy.responding_students.clear();
        if matches!(copy.results_release, ResultsRelease::Published(_)) {
            copy.results_release = ResultsRelease::Manual;
        }

        let questions: Vec<Question> = self
            .questions_of(&source)
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                session_name: copy.name.clone(),
                course_id: copy.course_id.clone(),
                ..q.clone()
            })
            .collect();

        self.store.insert_session(copy.clone())?;
        let count = questions.len();
        for question in questions {
            self.store.insert_question(question)?;
        }
        info!(
            "Copied feedback session {}/{} to {}/{} with {} questions",
            source_course_id, source_name, new_course_id, new_name, count
        );
        Ok(copy)
    }

    pub fn create_question(&mut self, question: Question) -> Result<Question> {
        self.existing("update", &question.session_name, &question.course_id)?;
        validate_combination(&question)?;
        self.store.insert_question(question.clone())?;
        debug!(
            "Added question {} to {}/{}",
            question.number, question.course_id, question.session_name
        );
        Ok(question)
    }

    pub fn record_response(&mut self, response: Response) -> Result<()> {
        let question = self
            .store
            .question(response.question_id)
            .ok_or_else(|| {
                FeedbackError::NotFound(format!(
                    "Trying to save a response to a non-existent question: {}",
                    response.question_id
                ))
            })?
            .clone();
        if response.answer.kind() != question.kind() {
            return Err(FeedbackError::AnswerMismatch {
                expected: question.kind(),
                found: response.answer.kind(),
            });
        }

        let roster = self.course(&question.course_id)?;
        let giver = roster
            .resolve_giver(question.giver_type, &response.giver)
            .ok_or_else(|| FeedbackError::UnknownParticipant {
                number: question.number,
                id: response.giver.clone(),
            })?;
        roster
            .resolve_recipient(question.recipient_type, &giver, &response.recipient)
            .ok_or_else(|| FeedbackError::UnknownParticipant {
                number: question.number,
                id: response.recipient.clone(),
            })?;

        let (students, instructor) = match question.giver_type {
            ParticipantType::Teams => (
                roster
                    .team_members(&giver.id)
                    .iter()
                    .map(|s| s.email.clone())
                    .collect::<Vec<_>>(),
                None,
            ),
            _ if roster.instructor(&giver.id).is_some() => (Vec::new(), Some(giver.id.clone())),
            _ => (vec![giver.id.clone()], None),
        };

        let session = self
            .store
            .session_mut(&question.course_id, &question.session_name)
            .ok_or_else(|| {
                FeedbackError::session_not_found(
                    "update",
                    &question.course_id,
                    &question.session_name,
                )
            })?;
        session.responding_students.extend(students);
        session.responding_instructors.extend(instructor);
        self.store.upsert_response(response);
        Ok(())
    }

    pub fn aggregated_results(
        &self,
        session_name: &str,
        course_id: &str,
        viewer_id: &str,
        section: Option<&str>,
    ) -> Result<ResultsBundle> {
        self.results_for(session_name, course_id, viewer_id, None, section)
    }

    fn results_for(
        &self,
        session_name: &str,
        course_id: &str,
        viewer_id: &str,
        question_id: Option<Uuid>,
        section: Option<&str>,
    ) -> Result<ResultsBundle> {
        let session = self.existing("view", session_name, course_id)?;
        let roster = self.course(course_id)?;

        let questions: Vec<Question> = self
            .questions_of(session)
            .into_iter()
            .filter(|q| question_id.map_or(true, |id| q.id == id))
            .cloned()
            .collect();
        if let Some(id) = question_id {
            if questions.is_empty() {
                return Err(FeedbackError::NotFound(format!(
                    "Trying to view a non-existent question {id} of feedback session: {course_id}/{session_name}"
                )));
            }
        }
        let responses: Vec<Response> = self
            .store
            .responses_for_session(course_id, session_name)
            .into_iter()
            .cloned()
            .collect();

        results::aggregate(session, &questions, &responses, roster, viewer_id, section)
    }

    pub fn export_results_as_table(
        &self,
        session_name: &str,
        course_id: &str,
        viewer_id: &str,
        question_id: Option<Uuid>,
        section: Option<&str>,
        include_statistics: bool,
    ) -> Result<String> {
        let bundle = self.results_for(session_name, course_id, viewer_id, question_id, section)?;
        let table = export::export(&bundle, include_statistics)?;
        info!(
            "Exported {}/{} for {}: {} questions",
            course_id,
            session_name,
            viewer_id,
            bundle.questions.len()
        );
        Ok(table)
    }

    pub fn sessions_needing_open_notice(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.select_sessions("open", |s| s.needs_open_email(now))
    }

    pub fn sessions_needing_closing_notice(&self, hours: i64, now: DateTime<Utc>) -> Vec<Session> {
        self.select_sessions("closing", |s| s.is_closing_within_hours(hours, now))
    }

    pub fn sessions_needing_published_notice(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.select_sessions("published", |s| s.needs_published_email(now))
    }

    fn select_sessions(&self, notice: &str, wanted: impl Fn(&Session) -> bool) -> Vec<Session> {
        let sessions: Vec<Session> = self
            .store
            .all_sessions()
            .filter(|&s| wanted(s))
            .cloned()
            .collect();
        info!("{} sessions need a {} notice", sessions.len(), notice);
        sessions
    }

    pub fn session_stats(&self, session_name: &str, course_id: &str) -> Result<CompletionStats> {
        let session = self.existing("view", session_name, course_id)?;
        let roster = self.course(course_id)?;
        let questions = self.questions_of(session);

        if session.is_private() {
            let submitted = session.responding_instructors.contains(&session.creator_email)
                || session.responding_students.contains(&session.creator_email);
            return Ok(CompletionStats {
                expected_total: 1,
                submitted_total: usize::from(submitted),
            });
        }

        let mut stats = CompletionStats {
            expected_total: 0,
            submitted_total: 0,
        };
        if questions.iter().any(|q| q.is_for_students()) {
            stats.expected_total += roster.students.len();
            stats.submitted_total += roster
                .students
                .iter()
                .filter(|s| session.responding_students.contains(&s.email))
                .count();
        }
        if questions
            .iter()
            .any(|q| q.giver_type == ParticipantType::Instructors)
        {
            stats.expected_total += roster.instructors.len();
            stats.submitted_total += roster
                .instructors
                .iter()
                .filter(|i| session.responding_instructors.contains(&i.email))
                .count();
        } else if questions
            .iter()
            .any(|q| q.giver_type == ParticipantType::Myself)
        {
            stats.expected_total += 1;
            stats.submitted_total +=
                usize::from(session.responding_instructors.contains(&session.creator_email));
        }
        Ok(stats)
    }

    pub fn is_completed_by_student(
        &self,
        session_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<bool> {
        let session = self.existing("check", session_name, course_id)?;
        Ok(session.responding_students.contains(email))
    }

    pub fn is_completed_by_instructor(
        &self,
        session_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<bool> {
        let session = self.existing("check", session_name, course_id)?;
        Ok(session.responding_instructors.contains(email))
    }

    pub fn is_fully_completed_by_student(
        &self,
        session_name: &str,
        course_id: &str,
        email: &str,
    ) -> Result<bool> {
        let session = self.existing("check", session_name, course_id)?;
        let roster = self.course(course_id)?;
        let student = roster.student(email).ok_or_else(|| {
            FeedbackError::NotFound(
                "Error getting feedback session(s): Student does not exist.".to_string(),
            )
        })?;

        Ok(self.questions_of(session).iter().all(|question| {
            let giver_id = match question.giver_type {
                ParticipantType::Students => student.email.as_str(),
                ParticipantType::Teams => student.team.as_str(),
                _ => return true,
            };
            self.store
                .responses_for_question(question.id)
                .iter()
                .any(|r| r.giver == giver_id)
        }))
    }

    pub fn questions_for_giver(
        &self,
        session_name: &str,
        course_id: &str,
        giver_id: &str,
    ) -> Result<GiverQuestionsBundle> {
        let session = self.existing("get", session_name, course_id)?;
        let roster = self.course(course_id)?;
        let viewer = Viewer::from_roster(roster, giver_id).ok_or_else(|| {
            FeedbackError::NotFound(
                "Error getting feedback session(s): Student does not exist.".to_string(),
            )
        })?;

        let mut bundle = GiverQuestionsBundle {
            session: session.clone(),
            questions: Vec::new(),
        };
        if session.is_private() && !session.is_creator(giver_id) {
            return Ok(bundle);
        }

        for question in self.questions_of(session) {
            let Some(giver) = giver_for(question, roster, &viewer, session) else {
                continue;
            };
            let recipients = roster
                .possible_recipients(question.recipient_type, &giver)
                .into_iter()
                .filter(|r| {
                    viewer.is_instructor()
                        || roster
                            .instructor(&r.id)
                            .map_or(true, |i| i.displayed_to_students)
                })
                .map(|r| (r.id, r.name))
                .collect();
            let responses = self
                .store
                .responses_for_question(question.id)
                .into_iter()
                .filter(|r| r.giver == giver.id)
                .cloned()
                .collect();
            bundle.questions.push(GiverQuestion {
                question: question.clone(),
                responses,
                recipients,
            });
        }
        Ok(bundle)
    }
}

fn giver_for(
    question: &Question,
    roster: &CourseRoster,
    viewer: &Viewer,
    session: &Session,
) -> Option<Participant> {
    match (question.giver_type, &viewer.kind) {
        (ParticipantType::Myself, _) if session.is_creator(&viewer.id) => {
            roster.resolve_giver(ParticipantType::Myself, &viewer.id)
        }
        (ParticipantType::Students, ViewerKind::Student(_)) => {
            roster.resolve_giver(ParticipantType::Students, &viewer.id)
        }
        (ParticipantType::Teams, ViewerKind::Student(student)) => {
            roster.resolve_giver(ParticipantType::Teams, &student.team)
        }
        (ParticipantType::Instructors, ViewerKind::Instructor(_)) => {
            roster.resolve_giver(ParticipantType::Instructors, &viewer.id)
        }
        _ => None,
    }
}
