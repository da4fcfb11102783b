use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedback_results::db;
use feedback_results::logic::{SessionUpdate, SessionsLogic};
use feedback_results::models::Session;

#[derive(Parser)]
#[command(name = "feedback-results")]
#[command(about = "Feedback session results, visibility and CSV export", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Notice {
    Open,
    Closing,
    Published,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo course with a session and responses
    Seed,
    /// Import responses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List the sessions of a course, optionally as one participant sees them
    Sessions {
        #[arg(long)]
        course: String,
        #[arg(long)]
        viewer: Option<String>,
    },
    /// Show how many expected respondents have submitted
    Stats {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
    /// Export the results a viewer may see as a CSV table
    Export {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        viewer: String,
        /// Restrict the export to one question number
        #[arg(long)]
        question: Option<u32>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        no_stats: bool,
        #[arg(long, default_value = "results.csv")]
        out: PathBuf,
    },
    /// List sessions that need an email notice
    Notices {
        #[arg(value_enum)]
        kind: Notice,
        #[arg(long, env = "CLOSING_WINDOW_HOURS", default_value_t = 24)]
        hours: i64,
        /// Record the open or published notice as sent
        #[arg(long)]
        mark_sent: bool,
    },
    /// Publish the results of a session now
    Publish {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
    /// Withdraw published results
    Unpublish {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
    /// Copy a session and its questions under a new name
    Copy {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        to_course: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        creator: String,
    },
    /// Delete a session with its questions and responses
    Delete {
        #[arg(long)]
        course: String,
        #[arg(long)]
        session: String,
    },
}

fn print_sessions(sessions: &[Session]) {
    for session in sessions {
        println!(
            "- {}/{} ({} to {}, {})",
            session.course_id,
            session.name,
            session.start.format("%Y-%m-%d %H:%M"),
            session.end.format("%Y-%m-%d %H:%M"),
            session.session_type.as_str().to_lowercase()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feedback_results=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let now = Utc::now();
    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_responses_csv(&pool, &csv).await?;
            println!("Imported {imported} responses from {}.", csv.display());
        }
        Commands::Sessions { course, viewer } => {
            let logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            let sessions = match viewer {
                Some(viewer) => logic.sessions_for_viewer_in_course(&course, &viewer, now)?,
                None => logic.sessions_for_course(&course)?,
            };
            if sessions.is_empty() {
                println!("No feedback sessions found.");
                return Ok(());
            }
            print_sessions(&sessions);
        }
        Commands::Stats { course, session } => {
            let logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            let stats = logic.session_stats(&session, &course)?;
            println!(
                "{}/{}: {} of {} expected respondents submitted.",
                course, session, stats.submitted_total, stats.expected_total
            );
        }
        Commands::Export {
            course,
            session,
            viewer,
            question,
            section,
            no_stats,
            out,
        } => {
            let logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            let question_id = match question {
                Some(number) => Some(
                    logic
                        .store()
                        .questions_for_session(&course, &session)
                        .into_iter()
                        .find(|q| q.number == number)
                        .map(|q| q.id)
                        .with_context(|| format!("question {number} not found in {course}/{session}"))?,
                ),
                None => None,
            };
            let table = logic.export_results_as_table(
                &session,
                &course,
                &viewer,
                question_id,
                section.as_deref(),
                !no_stats,
            )?;
            std::fs::write(&out, table)?;
            println!("Results written to {}.", out.display());
        }
        Commands::Notices {
            kind,
            hours,
            mark_sent,
        } => {
            let mut logic = SessionsLogic::new(db::load_store(&pool, None).await?);
            let sessions = match kind {
                Notice::Open => logic.sessions_needing_open_notice(now),
                Notice::Closing => logic.sessions_needing_closing_notice(hours, now),
                Notice::Published => logic.sessions_needing_published_notice(now),
            };
            if sessions.is_empty() {
                println!("No sessions need this notice.");
                return Ok(());
            }
            print_sessions(&sessions);

            if mark_sent {
                for session in &sessions {
                    let update = match kind {
                        Notice::Open => SessionUpdate {
                            sent_open_email: Some(true),
                            ..SessionUpdate::default()
                        },
                        Notice::Published => SessionUpdate {
                            sent_published_email: Some(true),
                            ..SessionUpdate::default()
                        },
                        Notice::Closing => continue,
                    };
                    let updated = logic.update_session(&session.name, &session.course_id, update)?;
                    db::save_session(&pool, &updated).await?;
                }
                info!("Marked {} notices as sent", sessions.len());
            }
        }
        Commands::Publish { course, session } => {
            let mut logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            let published = logic.publish(&session, &course, now)?;
            db::save_session(&pool, &published).await?;
            println!("Published {course}/{session}.");
        }
        Commands::Unpublish { course, session } => {
            let mut logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            let unpublished = logic.unpublish(&session, &course, now)?;
            db::save_session(&pool, &unpublished).await?;
            println!("Unpublished {course}/{session}.");
        }
        Commands::Copy {
            course,
            session,
            to_course,
            name,
            creator,
        } => {
            let target = to_course.unwrap_or_else(|| course.clone());
            let mut logic = SessionsLogic::new(db::load_store(&pool, None).await?);
            let copy = logic.copy_session(&name, &target, &session, &course, &creator, now)?;
            db::save_session(&pool, &copy).await?;
            for question in logic.store().questions_for_session(&target, &name) {
                db::save_question(&pool, question).await?;
            }
            println!("Copied {course}/{session} to {target}/{name}.");
        }
        Commands::Delete { course, session } => {
            let mut logic = SessionsLogic::new(db::load_store(&pool, Some(&course)).await?);
            logic.delete_session_cascade(&session, &course);
            if db::delete_session(&pool, &course, &session).await? {
                println!("Deleted {course}/{session}.");
            } else {
                println!("No session {course}/{session} to delete.");
            }
        }
    }

    Ok(())
}
