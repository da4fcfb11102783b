use chrono::{DateTime, Duration, Utc};

use crate::models::{
    Answer, ParticipantType, Question, QuestionDetails, Response, Session, VisibilityPolicy,
    VisibilityTag,
};
use crate::roster::{CourseRoster, ResponseAccess};

pub const COURSE: &str = "CS101";
pub const CREATOR: &str = "prof@uni.edu";
pub const TA: &str = "ta@uni.edu";

pub fn roster() -> CourseRoster {
    let mut roster = CourseRoster::new(COURSE, "Software Engineering");
    roster.add_student("ana@uni.edu", "Ana Ruiz", "Team A", "Section 1");
    roster.add_student("ben@uni.edu", "Ben Okafor", "Team A", "Section 1");
    roster.add_student("dev@uni.edu", "Dev Sharma", "Team A", "Section 1");
    roster.add_student("eve@uni.edu", "Eve Martin", "Team A", "Section 1");
    roster.add_student("cai@uni.edu", "Cai Lin", "Team B", "Section 2");
    roster.add_instructor(CREATOR, "Dana Prof", ResponseAccess::Course);
    roster.add_instructor(
        TA,
        "Eli Assistant",
        ResponseAccess::Sections(["Section 1".to_string()].into_iter().collect()),
    );
    roster
}

pub fn session_at(name: &str, now: DateTime<Utc>) -> Session {
    Session::new(
        name,
        COURSE,
        CREATOR,
        now - Duration::days(1),
        now + Duration::days(1),
    )
}

pub fn session(name: &str) -> Session {
    session_at(name, Utc::now())
}

pub fn mcq_to_general(session: &Session, number: u32) -> Question {
    Question::new(
        session,
        number,
        "Which topic was hardest?",
        ParticipantType::Students,
        ParticipantType::Nobody,
        QuestionDetails::Mcq {
            choices: vec!["A".to_string(), "B".to_string()],
            other_enabled: false,
        },
        VisibilityPolicy::open_to(&[VisibilityTag::Instructors]),
    )
}

pub fn general_response(question: &Question, giver: &str, answer: Answer) -> Response {
    Response::new(question, giver, crate::models::GENERAL_RECIPIENT, answer)
}
