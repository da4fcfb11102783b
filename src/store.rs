use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::{FeedbackError, Result};
use crate::models::{Question, Response, Session};
use crate::roster::CourseRoster;

type SessionKey = (String, String);

fn key(course_id: &str, session_name: &str) -> SessionKey {
    (course_id.to_string(), session_name.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct Datastore {
    courses: BTreeMap<String, CourseRoster>,
    sessions: BTreeMap<SessionKey, Session>,
    questions: Vec<Question>,
    responses: Vec<Response>,
}

impl Datastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_course(&mut self, roster: CourseRoster) {
        self.courses.insert(roster.course.id.clone(), roster);
    }

    pub fn course(&self, course_id: &str) -> Option<&CourseRoster> {
        self.courses.get(course_id)
    }

    pub fn session(&self, course_id: &str, session_name: &str) -> Option<&Session> {
        self.sessions.get(&key(course_id, session_name))
    }

    pub fn session_mut(&mut self, course_id: &str, session_name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(&key(course_id, session_name))
    }

    pub fn sessions_for_course(&self, course_id: &str) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.course_id == course_id)
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        sessions
    }

    pub fn all_sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn insert_session(&mut self, session: Session) -> Result<()> {
        let session_key = key(&session.course_id, &session.name);
        if self.sessions.contains_key(&session_key) {
            return Err(FeedbackError::AlreadyExists(format!(
                "Trying to create a feedback session that exists: {}/{}",
                session.course_id, session.name
            )));
        }
        self.sessions.insert(session_key, session);
        Ok(())
    }

    pub fn replace_session(&mut self, session: Session) {
        self.sessions
            .insert(key(&session.course_id, &session.name), session);
    }

    pub fn remove_session(&mut self, course_id: &str, session_name: &str) -> bool {
        let existed = self.sessions.remove(&key(course_id, session_name)).is_some();
        let removed: Vec<Uuid> = self
            .questions
            .iter()
            .filter(|q| q.course_id == course_id && q.session_name == session_name)
            .map(|q| q.id)
            .collect();
        self.questions.retain(|q| !removed.contains(&q.id));
        self.responses.retain(|r| !removed.contains(&r.question_id));
        existed
    }

    pub fn questions_for_session(&self, course_id: &str, session_name: &str) -> Vec<&Question> {
        let mut questions: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| q.course_id == course_id && q.session_name == session_name)
            .collect();
        questions.sort_by_key(|q| q.number);
        questions
    }

    pub fn question(&self, id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn insert_question(&mut self, question: Question) -> Result<()> {
        let duplicate = self.questions.iter().any(|q| {
            q.course_id == question.course_id
                && q.session_name == question.session_name
                && q.number == question.number
        });
        if duplicate {
            return Err(FeedbackError::AlreadyExists(format!(
                "Question {} already exists in feedback session {}/{}",
                question.number, question.course_id, question.session_name
            )));
        }
        self.questions.push(question);
        Ok(())
    }

    pub fn responses_for_question(&self, question_id: Uuid) -> Vec<&Response> {
        self.responses
            .iter()
            .filter(|r| r.question_id == question_id)
            .collect()
    }

    pub fn responses_for_session(&self, course_id: &str, session_name: &str) -> Vec<&Response> {
        let ids: Vec<Uuid> = self
            .questions_for_session(course_id, session_name)
            .iter()
            .map(|q| q.id)
            .collect();
        self.responses
            .iter()
            .filter(|r| ids.contains(&r.question_id))
            .collect()
    }

    /// Saves a response, replacing any earlier one for the same question,
    /// giver and recipient.
    pub fn upsert_response(&mut self, response: Response) {
        match self.responses.iter_mut().find(|r| {
            r.question_id == response.question_id
                && r.giver == response.giver
                && r.recipient == response.recipient
        }) {
            Some(existing) => {
                existing.answer = response.answer;
            }
            None => self.responses.push(response),
        }
    }
}
