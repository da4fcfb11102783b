use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::{PgPool, Row};

use crate::logic::SessionsLogic;
use crate::models::{
    Answer, ContributionValue, EntityCount, ParticipantType, Question, QuestionDetails, Response,
    ResultsRelease, Session, SessionType, VisibilityPolicy, VisibilityTag, GENERAL_RECIPIENT,
};
use crate::roster::{CourseRoster, Instructor, ResponseAccess, Student};
use crate::store::Datastore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn release_columns(release: &ResultsRelease) -> (&'static str, Option<DateTime<Utc>>) {
    match release {
        ResultsRelease::At(at) => ("at", Some(*at)),
        ResultsRelease::Manual => ("manual", None),
        ResultsRelease::Published(at) => ("published", Some(*at)),
        ResultsRelease::Never => ("never", None),
    }
}

fn release_from_columns(kind: &str, at: Option<DateTime<Utc>>) -> anyhow::Result<ResultsRelease> {
    match (kind, at) {
        ("at", Some(at)) => Ok(ResultsRelease::At(at)),
        ("manual", _) => Ok(ResultsRelease::Manual),
        ("published", Some(at)) => Ok(ResultsRelease::Published(at)),
        ("never", _) => Ok(ResultsRelease::Never),
        (other, _) => Err(anyhow!("unknown results release '{other}'")),
    }
}

pub async fn save_course(pool: &PgPool, roster: &CourseRoster) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedback_results.courses (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(&roster.course.id)
    .bind(&roster.course.name)
    .execute(pool)
    .await?;

    for student in &roster.students {
        sqlx::query(
            r#"
            INSERT INTO feedback_results.students
            (course_id, email, full_name, last_name, team, section)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id, email) DO UPDATE
            SET full_name = EXCLUDED.full_name, last_name = EXCLUDED.last_name,
                team = EXCLUDED.team, section = EXCLUDED.section
            "#,
        )
        .bind(&roster.course.id)
        .bind(&student.email)
        .bind(&student.name)
        .bind(&student.last_name)
        .bind(&student.team)
        .bind(&student.section)
        .execute(pool)
        .await?;
    }

    for instructor in &roster.instructors {
        sqlx::query(
            r#"
            INSERT INTO feedback_results.instructors
            (course_id, email, full_name, access, displayed_to_students)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (course_id, email) DO UPDATE
            SET full_name = EXCLUDED.full_name, access = EXCLUDED.access,
                displayed_to_students = EXCLUDED.displayed_to_students
            "#,
        )
        .bind(&roster.course.id)
        .bind(&instructor.email)
        .bind(&instructor.name)
        .bind(serde_json::to_string(&instructor.access)?)
        .bind(instructor.displayed_to_students)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn save_session(pool: &PgPool, session: &Session) -> anyhow::Result<()> {
    let (release_kind, release_at) = release_columns(&session.results_release);
    sqlx::query(
        r#"
        INSERT INTO feedback_results.sessions
        (course_id, name, creator_email, instructions, created_at, visible_from,
         start_time, end_time, release_kind, release_at, grace_period_minutes,
         session_type, sent_open_email, sent_published_email,
         responding_instructors, responding_students)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (course_id, name) DO UPDATE
        SET instructions = EXCLUDED.instructions,
            visible_from = EXCLUDED.visible_from,
            start_time = EXCLUDED.start_time,
            end_time = EXCLUDED.end_time,
            release_kind = EXCLUDED.release_kind,
            release_at = EXCLUDED.release_at,
            grace_period_minutes = EXCLUDED.grace_period_minutes,
            sent_open_email = EXCLUDED.sent_open_email,
            sent_published_email = EXCLUDED.sent_published_email,
            responding_instructors = EXCLUDED.responding_instructors,
            responding_students = EXCLUDED.responding_students
        "#,
    )
    .bind(&session.course_id)
    .bind(&session.name)
    .bind(&session.creator_email)
    .bind(&session.instructions)
    .bind(session.created_at)
    .bind(session.visible_from)
    .bind(session.start)
    .bind(session.end)
    .bind(release_kind)
    .bind(release_at)
    .bind(session.grace_period_minutes)
    .bind(session.session_type.as_str())
    .bind(session.sent_open_email)
    .bind(session.sent_published_email)
    .bind(session.responding_instructors.iter().cloned().collect::<Vec<_>>())
    .bind(session.responding_students.iter().cloned().collect::<Vec<_>>())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_session(pool: &PgPool, course_id: &str, session_name: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "DELETE FROM feedback_results.sessions WHERE course_id = $1 AND name = $2",
    )
    .bind(course_id)
    .bind(session_name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn save_question(pool: &PgPool, question: &Question) -> anyhow::Result<()> {
    let entity_limit = match question.entities {
        EntityCount::Limited(limit) => Some(i32::try_from(limit)?),
        EntityCount::Unlimited => None,
    };
    sqlx::query(
        r#"
        INSERT INTO feedback_results.questions
        (id, course_id, session_name, number, text, giver_type, recipient_type,
         entity_limit, details, visibility)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE
        SET text = EXCLUDED.text, entity_limit = EXCLUDED.entity_limit,
            details = EXCLUDED.details, visibility = EXCLUDED.visibility
        "#,
    )
    .bind(question.id)
    .bind(&question.course_id)
    .bind(&question.session_name)
    .bind(i32::try_from(question.number)?)
    .bind(&question.text)
    .bind(question.giver_type.as_str())
    .bind(question.recipient_type.as_str())
    .bind(entity_limit)
    .bind(serde_json::to_string(&question.details)?)
    .bind(serde_json::to_string(&question.visibility)?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_response(pool: &PgPool, response: &Response) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedback_results.responses (id, question_id, giver, recipient, answer)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (question_id, giver, recipient) DO UPDATE SET answer = EXCLUDED.answer
        "#,
    )
    .bind(response.id)
    .bind(response.question_id)
    .bind(&response.giver)
    .bind(&response.recipient)
    .bind(serde_json::to_string(&response.answer)?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_store(pool: &PgPool, store: &Datastore) -> anyhow::Result<()> {
    for session in store.all_sessions() {
        save_session(pool, session).await?;
        for question in store.questions_for_session(&session.course_id, &session.name) {
            save_question(pool, question).await?;
            for response in store.responses_for_question(question.id) {
                save_response(pool, response).await?;
            }
        }
    }
    Ok(())
}

async fn load_roster(pool: &PgPool, course_id: &str) -> anyhow::Result<CourseRoster> {
    let course = sqlx::query("SELECT id, name FROM feedback_results.courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("course {course_id} does not exist"))?;
    let id: String = course.get("id");
    let name: String = course.get("name");
    let mut roster = CourseRoster::new(&id, &name);

    let students = sqlx::query(
        "SELECT email, full_name, last_name, team, section \
         FROM feedback_results.students WHERE course_id = $1 ORDER BY email",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    for row in students {
        roster.students.push(Student {
            email: row.get("email"),
            name: row.get("full_name"),
            last_name: row.get("last_name"),
            team: row.get("team"),
            section: row.get("section"),
        });
    }

    let instructors = sqlx::query(
        "SELECT email, full_name, access, displayed_to_students \
         FROM feedback_results.instructors WHERE course_id = $1 ORDER BY email",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    for row in instructors {
        let access: String = row.get("access");
        roster.instructors.push(Instructor {
            email: row.get("email"),
            name: row.get("full_name"),
            access: serde_json::from_str(&access).context("invalid instructor access")?,
            displayed_to_students: row.get("displayed_to_students"),
        });
    }

    Ok(roster)
}

pub async fn load_store(pool: &PgPool, course_id: Option<&str>) -> anyhow::Result<Datastore> {
    let course_ids: Vec<String> = match course_id {
        Some(id) => vec![id.to_string()],
        None => sqlx::query("SELECT id FROM feedback_results.courses ORDER BY id")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| row.get("id"))
            .collect(),
    };

    let mut store = Datastore::new();
    for id in &course_ids {
        store.put_course(load_roster(pool, id).await?);

        let sessions = sqlx::query(
            "SELECT * FROM feedback_results.sessions WHERE course_id = $1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        for row in sessions {
            let session_type: String = row.get("session_type");
            let release_kind: String = row.get("release_kind");
            let responding_instructors: Vec<String> = row.get("responding_instructors");
            let responding_students: Vec<String> = row.get("responding_students");
            store.insert_session(Session {
                name: row.get("name"),
                course_id: row.get("course_id"),
                creator_email: row.get("creator_email"),
                instructions: row.get("instructions"),
                created_at: row.get("created_at"),
                visible_from: row.get("visible_from"),
                start: row.get("start_time"),
                end: row.get("end_time"),
                results_release: release_from_columns(&release_kind, row.get("release_at"))?,
                grace_period_minutes: row.get("grace_period_minutes"),
                session_type: SessionType::parse(&session_type)
                    .with_context(|| format!("unknown session type '{session_type}'"))?,
                sent_open_email: row.get("sent_open_email"),
                sent_published_email: row.get("sent_published_email"),
                responding_instructors: responding_instructors.into_iter().collect(),
                responding_students: responding_students.into_iter().collect(),
            })?;
        }

        let questions = sqlx::query(
            "SELECT * FROM feedback_results.questions WHERE course_id = $1 ORDER BY session_name, number",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        for row in questions {
            let giver_type: String = row.get("giver_type");
            let recipient_type: String = row.get("recipient_type");
            let entity_limit: Option<i32> = row.get("entity_limit");
            let number: i32 = row.get("number");
            let details: String = row.get("details");
            let visibility: String = row.get("visibility");
            store.insert_question(Question {
                id: row.get("id"),
                session_name: row.get("session_name"),
                course_id: row.get("course_id"),
                number: u32::try_from(number)?,
                text: row.get("text"),
                giver_type: ParticipantType::parse(&giver_type)
                    .with_context(|| format!("unknown giver type '{giver_type}'"))?,
                recipient_type: ParticipantType::parse(&recipient_type)
                    .with_context(|| format!("unknown recipient type '{recipient_type}'"))?,
                entities: match entity_limit {
                    Some(limit) => EntityCount::Limited(u32::try_from(limit)?),
                    None => EntityCount::Unlimited,
                },
                details: serde_json::from_str(&details).context("invalid question details")?,
                visibility: serde_json::from_str(&visibility)
                    .context("invalid question visibility")?,
            })?;
        }

        let responses = sqlx::query(
            r#"
            SELECT r.id, r.question_id, r.giver, r.recipient, r.answer
            FROM feedback_results.responses r
            JOIN feedback_results.questions q ON q.id = r.question_id
            WHERE q.course_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        for row in responses {
            let answer: String = row.get("answer");
            store.upsert_response(Response {
                id: row.get("id"),
                question_id: row.get("question_id"),
                giver: row.get("giver"),
                recipient: row.get("recipient"),
                answer: serde_json::from_str(&answer).context("invalid answer")?,
            });
        }
    }

    Ok(store)
}

fn demo_roster() -> CourseRoster {
    let mut roster = CourseRoster::new("CS2103", "Software Engineering");
    roster.add_student("avery.lee@example.edu", "Avery Lee", "Team Falcon", "Tutorial 1");
    roster.add_student("jules.moreno@example.edu", "Jules Moreno", "Team Falcon", "Tutorial 1");
    roster.add_student("kiara.patel@example.edu", "Kiara Patel", "Team Falcon", "Tutorial 1");
    roster.add_student("omar.haddad@example.edu", "Omar Haddad", "Team Heron", "Tutorial 2");
    roster.add_student("lena.fischer@example.edu", "Lena Fischer", "Team Heron", "Tutorial 2");
    roster.add_instructor("mara.quinn@example.edu", "Mara Quinn", ResponseAccess::Course);
    roster.add_instructor(
        "theo.grant@example.edu",
        "Theo Grant",
        ResponseAccess::Sections(["Tutorial 2".to_string()].into_iter().collect()),
    );
    roster
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let roster = demo_roster();
    let course_id = roster.course.id.clone();
    let existing = sqlx::query("SELECT id FROM feedback_results.courses WHERE id = $1")
        .bind(&course_id)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let creator = "mara.quinn@example.edu";
    let mut store = Datastore::new();
    store.put_course(roster);
    let mut logic = SessionsLogic::new(store);

    let start = Utc
        .with_ymd_and_hms(2026, 9, 28, 9, 0, 0)
        .single()
        .context("invalid seed date")?;
    let mut session = Session::new(
        "Sprint 1 peer review",
        &course_id,
        creator,
        start,
        start + Duration::days(14),
    );
    session.instructions = "Rate your teammates honestly; ratings stay anonymous.".to_string();
    let session = logic.create_session(session)?;

    let contribution = logic.create_question(Question::new(
        &session,
        1,
        "Estimate the contribution of each team member, including yourself.",
        ParticipantType::Students,
        ParticipantType::OwnTeamMembersIncludingSelf,
        QuestionDetails::Contrib,
        VisibilityPolicy::new(
            &[VisibilityTag::Instructors, VisibilityTag::Receiver],
            &[VisibilityTag::Instructors],
            &[VisibilityTag::Instructors, VisibilityTag::Receiver],
        ),
    ))?;
    let pace = logic.create_question(Question::new(
        &session,
        2,
        "How was the pace of the sprint?",
        ParticipantType::Students,
        ParticipantType::Nobody,
        QuestionDetails::Mcq {
            choices: vec![
                "Too slow".to_string(),
                "About right".to_string(),
                "Too fast".to_string(),
            ],
            other_enabled: true,
        },
        VisibilityPolicy::new(
            &[VisibilityTag::Instructors, VisibilityTag::Students],
            &[VisibilityTag::Instructors],
            &[VisibilityTag::Instructors, VisibilityTag::Students],
        ),
    ))?;

    let ratings = [
        ("avery.lee@example.edu", "avery.lee@example.edu", 110),
        ("avery.lee@example.edu", "jules.moreno@example.edu", 90),
        ("avery.lee@example.edu", "kiara.patel@example.edu", 100),
        ("jules.moreno@example.edu", "avery.lee@example.edu", 120),
        ("omar.haddad@example.edu", "lena.fischer@example.edu", 100),
    ];
    for (giver, recipient, points) in ratings {
        logic.record_response(Response::new(
            &contribution,
            giver,
            recipient,
            Answer::Contrib(ContributionValue::Points(points)),
        ))?;
    }
    for (giver, choice) in [
        ("avery.lee@example.edu", "About right"),
        ("kiara.patel@example.edu", "Too fast"),
        ("lena.fischer@example.edu", "Way too fast"),
    ] {
        logic.record_response(Response::new(
            &pace,
            giver,
            GENERAL_RECIPIENT,
            Answer::Mcq(choice.to_string()),
        ))?;
    }

    let store = logic.into_store();
    if let Some(roster) = store.course(&course_id) {
        save_course(pool, roster).await?;
    }
    save_store(pool, &store).await?;
    Ok(())
}

/// Imports responses from a CSV file with the columns `course_id`,
/// `session_name`, `question_number`, `giver`, `recipient` and `answer`
/// (the answer as JSON, e.g. `{"type":"MCQ","value":"A"}`).
pub async fn import_responses_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        course_id: String,
        session_name: String,
        question_number: u32,
        giver: String,
        recipient: String,
        answer: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut courses: HashMap<String, SessionsLogic> = HashMap::new();
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if !courses.contains_key(&row.course_id) {
            let store = load_store(pool, Some(&row.course_id)).await?;
            courses.insert(row.course_id.clone(), SessionsLogic::new(store));
        }
        let logic = courses
            .get_mut(&row.course_id)
            .context("course was just loaded")?;

        let question = logic
            .store()
            .questions_for_session(&row.course_id, &row.session_name)
            .into_iter()
            .find(|q| q.number == row.question_number)
            .cloned()
            .with_context(|| {
                format!(
                    "question {} not found in {}/{}",
                    row.question_number, row.course_id, row.session_name
                )
            })?;
        let answer: Answer = serde_json::from_str(&row.answer)
            .with_context(|| format!("invalid answer JSON: {}", row.answer))?;

        logic.record_response(Response::new(&question, &row.giver, &row.recipient, answer))?;
        imported += 1;
    }

    for logic in courses.values() {
        save_store(pool, logic.store()).await?;
    }
    Ok(imported)
}
